//! Block candidates: any element whose lowercased name contains `ob`, `fb`,
//! `fc`, `db` or `block`. This over-matches (`ObjectList`, `Global…`) on
//! purpose; candidates without a name and a type are dropped.

use crate::model::{BlockRecord, EntityCategory, ExtractedEntities};

use super::classifier::Classifier;
use super::resolve::{ATTRIBUTE_FIRST_NAME, FieldChain, Strategy};
use super::xml::Element;

pub struct BlockClassifier;

const NAME_MARKERS: [&str; 5] = ["ob", "fb", "fc", "db", "block"];

pub const BLOCK_TYPE: FieldChain = FieldChain {
    field: "Type",
    strategies: &[
        Strategy::AttributeList("Type"),
        Strategy::AttributeListPath(&["Interface", "Type"]),
        Strategy::TagNameInference,
        Strategy::Attribute("Type"),
        Strategy::Child("Type"),
    ],
};

pub const NUMBER: FieldChain = FieldChain {
    field: "Number",
    strategies: &[
        Strategy::AttributeList("Number"),
        Strategy::Attribute("Number"),
        Strategy::Child("Number"),
    ],
};

pub fn is_candidate(element: &Element) -> bool {
    let lower = element.name.to_lowercase();
    NAME_MARKERS.iter().any(|m| lower.contains(m))
}

impl Classifier for BlockClassifier {
    fn category(&self) -> EntityCategory {
        EntityCategory::Block
    }

    fn path_keywords(&self) -> &'static [&'static str] {
        &["block", "program", "ob", "fb", "fc", "db"]
    }

    fn classify(&self, root: &Element, out: &mut ExtractedEntities) {
        for element in root.descendants().filter(|e| is_candidate(e)) {
            let (Some(name), Some(block_type)) = (
                ATTRIBUTE_FIRST_NAME.resolve_owned(element),
                BLOCK_TYPE.resolve_owned(element),
            ) else {
                continue;
            };

            // an unparseable number leaves the field unset, the block is kept
            let number = NUMBER.resolve(element).and_then(|n| n.parse::<i64>().ok());

            out.blocks.push(BlockRecord {
                name,
                block_type,
                number,
            });
        }
    }
}
