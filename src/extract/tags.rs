//! Tag candidates: elements named `Tag` or containing `PlcTag`.

use crate::model::{EntityCategory, ExtractedEntities, TagRecord};

use super::classifier::Classifier;
use super::resolve::{FieldChain, Strategy, NAME};
use super::xml::Element;

pub struct TagClassifier;

pub const DATA_TYPE: FieldChain = FieldChain {
    field: "DataType",
    strategies: &[
        Strategy::AttributeList("DataTypeName"),
        Strategy::Child("DataType"),
        Strategy::Attribute("DataType"),
    ],
};

pub const ADDRESS: FieldChain = FieldChain {
    field: "Address",
    strategies: &[
        Strategy::AttributeList("LogicalAddress"),
        Strategy::Child("LogicalAddress"),
        Strategy::Child("Address"),
        Strategy::Attribute("LogicalAddress"),
        Strategy::Attribute("Address"),
    ],
};

pub const DESCRIPTION: FieldChain = FieldChain {
    field: "Comment",
    strategies: &[
        Strategy::AttributeList("Comment"),
        Strategy::Child("Comment"),
        Strategy::Attribute("Comment"),
        Strategy::MultiLanguageText("Comment"),
        Strategy::Composition("Comment"),
    ],
};

pub fn is_candidate(element: &Element) -> bool {
    element.name.contains("PlcTag") || element.name == "Tag"
}

impl Classifier for TagClassifier {
    fn category(&self) -> EntityCategory {
        EntityCategory::Tag
    }

    fn path_keywords(&self) -> &'static [&'static str] {
        &["tag", "variable", "global"]
    }

    fn classify(&self, root: &Element, out: &mut ExtractedEntities) {
        for element in root.descendants().filter(|e| is_candidate(e)) {
            let Some(name) = NAME.resolve_owned(element) else {
                continue;
            };

            out.tags.push(TagRecord {
                name,
                data_type: DATA_TYPE.resolve_owned(element),
                address: ADDRESS.resolve_owned(element),
                description: DESCRIPTION.resolve_owned(element),
                hardware_ref: None,
                block_ref: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::xml::parse_document;

    fn classify(xml: &str) -> Vec<TagRecord> {
        let root = parse_document(xml).unwrap();
        let mut out = ExtractedEntities::default();
        TagClassifier.classify(&root, &mut out);
        out.tags
    }

    #[test]
    fn openness_tag_table_export() {
        let tags = classify(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <Document>
              <SW.Tags.PlcTagTable ID="0">
                <AttributeList><Name>Default tag table</Name></AttributeList>
                <ObjectList>
                  <SW.Tags.PlcTag ID="1" CompositionName="Tags">
                    <AttributeList>
                      <DataTypeName>Bool</DataTypeName>
                      <LogicalAddress>%I0.0</LogicalAddress>
                      <Name>Start</Name>
                    </AttributeList>
                  </SW.Tags.PlcTag>
                </ObjectList>
              </SW.Tags.PlcTagTable>
            </Document>"#,
        );

        // the table itself over-matches on "PlcTag", which is expected
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "Default tag table");
        let start = &tags[1];
        assert_eq!(start.name, "Start");
        assert_eq!(start.data_type.as_deref(), Some("Bool"));
        assert_eq!(start.address.as_deref(), Some("%I0.0"));
        assert_eq!(start.description, None);
    }

    #[test]
    fn flat_tag_with_attributes() {
        let tags = classify(
            r#"<Tags><Tag Name="Motor" DataType="Int" Address="%MW10" Comment="speed"/></Tags>"#,
        );
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].data_type.as_deref(), Some("Int"));
        assert_eq!(tags[0].address.as_deref(), Some("%MW10"));
        assert_eq!(tags[0].description.as_deref(), Some("speed"));
    }

    #[test]
    fn child_elements_before_attributes() {
        let tags = classify(
            r#"<Tag Address="%M1.0"><Name>Lamp</Name><LogicalAddress>%Q0.1</LogicalAddress></Tag>"#,
        );
        assert_eq!(tags[0].address.as_deref(), Some("%Q0.1"));
    }

    #[test]
    fn namespaced_export_is_stripped() {
        let tags = classify(
            r#"<Document xmlns="http://www.siemens.com/automation/Openness/SW/Tags/v5">
                 <Tag><Name>Valve</Name><DataType>Bool</DataType></Tag>
               </Document>"#,
        );
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "Valve");
    }

    #[test]
    fn nameless_candidates_are_dropped() {
        let tags = classify(r#"<Tags><Tag DataType="Int"/><Tag Name=""/></Tags>"#);
        assert!(tags.is_empty());
    }

    #[test]
    fn element_named_tags_is_not_a_candidate() {
        // "Tags" neither equals "Tag" nor contains "PlcTag"
        let tags = classify(r#"<Tags Name="outer"/>"#);
        assert!(tags.is_empty());
    }

    #[test]
    fn multilingual_comment_is_used_as_description() {
        let tags = classify(
            r#"<SW.Tags.PlcTag>
                 <AttributeList><Name>Stop</Name></AttributeList>
                 <ObjectList>
                   <MultilingualText CompositionName="Comment">
                     <ObjectList><MultilingualTextItem><AttributeList>
                       <Culture>en-US</Culture><Text>Emergency stop</Text>
                     </AttributeList></MultilingualTextItem></ObjectList>
                   </MultilingualText>
                 </ObjectList>
               </SW.Tags.PlcTag>"#,
        );
        assert_eq!(tags[0].description.as_deref(), Some("Emergency stop"));
    }

    #[test]
    fn multi_language_text_comment() {
        let tags = classify(
            r#"<Tag Name="A"><Comment><MultiLanguageText>hello</MultiLanguageText></Comment></Tag>"#,
        );
        assert_eq!(tags[0].description.as_deref(), Some("hello"));

        let root = parse_document(
            r#"<Tag Name="A"><Comment><MultiLanguageText>hello</MultiLanguageText></Comment></Tag>"#,
        )
        .unwrap();
        let (source, _) = DESCRIPTION.resolve_with_source(&root).unwrap();
        assert_eq!(source, Strategy::MultiLanguageText("Comment"));
    }

    #[test]
    fn plain_comment_wins_over_multi_language_text() {
        let tags = classify(
            r#"<Tags>
                 <Tag Name="A" Comment="plain"><Comment><MultiLanguageText>hello</MultiLanguageText></Comment></Tag>
                 <Tag Name="B">
                   <AttributeList><Comment>listed</Comment></AttributeList>
                   <Comment><MultiLanguageText>hello</MultiLanguageText></Comment>
                 </Tag>
               </Tags>"#,
        );
        assert_eq!(tags[0].description.as_deref(), Some("plain"));
        assert_eq!(tags[1].description.as_deref(), Some("listed"));
    }

    #[test]
    fn multi_language_text_wins_over_composition() {
        let tags = classify(
            r#"<Tag Name="A">
                 <Comment><MultiLanguageText>inline</MultiLanguageText></Comment>
                 <ObjectList>
                   <MultilingualText CompositionName="Comment"><Text>composed</Text></MultilingualText>
                 </ObjectList>
               </Tag>"#,
        );
        assert_eq!(tags[0].description.as_deref(), Some("inline"));
    }

    #[test]
    fn path_gate_keywords() {
        assert!(TagClassifier.matches_path("PLC_1/PLC tags/Default tag table.xml"));
        assert!(TagClassifier.matches_path("GlobalVariables.xml"));
        assert!(!TagClassifier.matches_path("Blocks/Main.xml"));
    }
}
