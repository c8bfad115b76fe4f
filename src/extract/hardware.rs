//! Hardware candidates: elements whose name contains `Device` or `Module`.
//!
//! IP address and rack slot live in vendor-specific places that vary a lot
//! between exports; the chains below catch the common flat shapes and are
//! expected to come up empty most of the time.

use std::net::IpAddr;

use crate::model::{EntityCategory, ExtractedEntities, HardwareRecord};

use super::classifier::Classifier;
use super::resolve::{ATTRIBUTE_FIRST_NAME, FieldChain, Strategy};
use super::xml::Element;

pub struct HardwareClassifier;

pub const DEVICE_TYPE: FieldChain = FieldChain {
    field: "TypeName",
    strategies: &[
        Strategy::AttributeList("TypeName"),
        Strategy::Attribute("Type"),
        Strategy::Child("Type"),
    ],
};

pub const IP_ADDRESS: FieldChain = FieldChain {
    field: "IpAddress",
    strategies: &[
        Strategy::AttributeList("IpAddress"),
        Strategy::Attribute("IpAddress"),
        Strategy::Child("IpAddress"),
    ],
};

pub const RACK_SLOT: FieldChain = FieldChain {
    field: "PositionNumber",
    strategies: &[
        Strategy::AttributeList("PositionNumber"),
        Strategy::Attribute("PositionNumber"),
        Strategy::Attribute("Slot"),
    ],
};

pub fn is_candidate(element: &Element) -> bool {
    element.name.contains("Device") || element.name.contains("Module")
}

impl Classifier for HardwareClassifier {
    fn category(&self) -> EntityCategory {
        EntityCategory::Hardware
    }

    fn path_keywords(&self) -> &'static [&'static str] {
        &["hardware", "device", "station"]
    }

    fn classify(&self, root: &Element, out: &mut ExtractedEntities) {
        for element in root.descendants().filter(|e| is_candidate(e)) {
            let Some(name) = ATTRIBUTE_FIRST_NAME.resolve_owned(element) else {
                continue;
            };

            let ip_address = IP_ADDRESS
                .resolve(element)
                .filter(|ip| ip.parse::<IpAddr>().is_ok())
                .map(str::to_string);

            out.hardware.push(HardwareRecord {
                name,
                device_type: DEVICE_TYPE.resolve_owned(element),
                ip_address,
                rack_slot: RACK_SLOT.resolve_owned(element),
            });
        }
    }
}
