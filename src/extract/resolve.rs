//! Field resolution strategies.
//!
//! The export schema differs between tool versions and export paths, so each
//! field is resolved by an ordered chain of named strategies. The first one
//! yielding a non-empty (trimmed) value wins. Chains are plain data so their
//! precedence can be read and tested directly.

use std::fmt;

use super::xml::Element;

pub const ATTRIBUTE_LIST: &str = "AttributeList";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Text of `<AttributeList><Field>`.
    AttributeList(&'static str),
    /// Text at a nested path below `<AttributeList>`.
    AttributeListPath(&'static [&'static str]),
    /// Text of a direct child element.
    Child(&'static str),
    /// Value of an attribute on the element itself.
    Attribute(&'static str),
    /// `<Field><MultiLanguageText>text</MultiLanguageText></Field>`.
    MultiLanguageText(&'static str),
    /// First `<Text>` below `<ObjectList><MultilingualText CompositionName=…>`.
    Composition(&'static str),
    /// Block type implied by the element name (`SW.Blocks.FB` gives `FB`).
    TagNameInference,
}

impl Strategy {
    pub fn apply<'a>(&self, element: &'a Element) -> Option<&'a str> {
        let raw = match self {
            Strategy::AttributeList(field) => {
                element.child(ATTRIBUTE_LIST)?.child(field).map(|e| e.text.as_str())
            }
            Strategy::AttributeListPath(path) => element
                .child(ATTRIBUTE_LIST)?
                .child_path(path)
                .map(|e| e.text.as_str()),
            Strategy::Child(field) => element.child(field).map(|e| e.text.as_str()),
            Strategy::Attribute(key) => element.attr(key),
            Strategy::MultiLanguageText(field) => element
                .child(field)?
                .child("MultiLanguageText")
                .map(|e| e.text.as_str()),
            Strategy::Composition(composition) => composition_text(element, composition),
            Strategy::TagNameInference => infer_block_type(&element.name),
        };

        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::AttributeList(field) => write!(f, "{ATTRIBUTE_LIST}/{field}"),
            Strategy::AttributeListPath(path) => write!(f, "{ATTRIBUTE_LIST}/{}", path.join("/")),
            Strategy::Child(field) => write!(f, "child {field}"),
            Strategy::Attribute(key) => write!(f, "@{key}"),
            Strategy::MultiLanguageText(field) => write!(f, "{field}/MultiLanguageText"),
            Strategy::Composition(name) => write!(f, "ObjectList/MultilingualText[{name}]"),
            Strategy::TagNameInference => f.write_str("tag-name inference"),
        }
    }
}

/// A named, ordered list of strategies for one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    pub field: &'static str,
    pub strategies: &'static [Strategy],
}

impl FieldChain {
    pub fn resolve<'a>(&self, element: &'a Element) -> Option<&'a str> {
        self.resolve_with_source(element).map(|(_, value)| value)
    }

    /// Like `resolve`, also reporting which strategy produced the value.
    pub fn resolve_with_source<'a>(&self, element: &'a Element) -> Option<(Strategy, &'a str)> {
        self.strategies
            .iter()
            .find_map(|s| s.apply(element).map(|v| (*s, v)))
    }

    pub fn resolve_owned(&self, element: &Element) -> Option<String> {
        self.resolve(element).map(str::to_string)
    }
}

/// Tag names: a child `<Name>` wins over `@Name`.
pub const NAME: FieldChain = FieldChain {
    field: "Name",
    strategies: &[
        Strategy::AttributeList("Name"),
        Strategy::Child("Name"),
        Strategy::Attribute("Name"),
    ],
};

/// Block and hardware names: `@Name` wins over a child `<Name>`.
pub const ATTRIBUTE_FIRST_NAME: FieldChain = FieldChain {
    field: "Name",
    strategies: &[
        Strategy::AttributeList("Name"),
        Strategy::Attribute("Name"),
        Strategy::Child("Name"),
    ],
};

/// Checked in this order; `ob` wins over `fb` if both appear.
const BLOCK_TYPE_MARKERS: [(&str, &str); 4] = [("ob", "OB"), ("fb", "FB"), ("fc", "FC"), ("db", "DB")];

pub fn infer_block_type(element_name: &str) -> Option<&'static str> {
    let lower = element_name.to_lowercase();
    BLOCK_TYPE_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, block_type)| *block_type)
}

fn composition_text<'a>(element: &'a Element, composition: &str) -> Option<&'a str> {
    element
        .child("ObjectList")?
        .children
        .iter()
        .filter(|c| c.name == "MultilingualText" && c.attr("CompositionName") == Some(composition))
        .flat_map(|c| c.descendants())
        .filter(|e| e.name == "Text")
        .map(|e| e.text.trim())
        .find(|t| !t.is_empty())
}
