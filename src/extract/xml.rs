//! Minimal element tree over quick-xml.
//!
//! The heuristics need random access to children and attributes, so each
//! payload is materialised into a small owned tree. Element text follows the
//! usual tree-API convention: only the text before the first child element is
//! kept.
//!
//! Namespaces are not resolved. The first `xmlns="…"` declaration is removed
//! from the raw text before parsing; any default namespace declared after that
//! stays in effect and elements in its scope are named `{uri}Local`.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("XML parse error: {0}")]
pub struct XmlError(pub String);

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        XmlError(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a path of direct children, e.g. `["Interface", "Type"]`.
    pub fn child_path(&self, path: &[&str]) -> Option<&Element> {
        let mut current = self;
        for segment in path {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Pre-order traversal including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Removes the first non-empty `xmlns="…"` declaration, and only that one.
pub fn strip_default_namespace(text: &str) -> Cow<'_, str> {
    const NEEDLE: &str = "xmlns=\"";
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(NEEDLE) {
        let start = search_from + found;
        let value_start = start + NEEDLE.len();
        let Some(value_len) = text[value_start..].find('"') else {
            break;
        };
        if value_len == 0 {
            search_from = value_start + 1;
            continue;
        }
        let end = value_start + value_len + 1;
        let mut stripped = String::with_capacity(text.len() - (end - start));
        stripped.push_str(&text[..start]);
        stripped.push_str(&text[end..]);
        return Cow::Owned(stripped);
    }

    Cow::Borrowed(text)
}

/// Strips the default namespace and parses the document into a tree.
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    let text = text.trim_start_matches('\u{feff}');
    parse(&strip_default_namespace(text))
}

pub fn parse(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    // default namespace in scope for each open element
    let mut scopes: Vec<Option<String>> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let inherited = scopes.last().cloned().flatten();
                let (element, scope) = open_element(&e, inherited)?;
                if stack.is_empty() && root.is_some() {
                    return Err(XmlError("content after the document element".into()));
                }
                stack.push(element);
                scopes.push(scope);
            }
            Event::Empty(e) => {
                let inherited = scopes.last().cloned().flatten();
                let (element, _) = open_element(&e, inherited)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                scopes.pop();
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError("unexpected closing tag".into()))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    if top.children.is_empty() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    if top.children.is_empty() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or_else(|| XmlError("no root element".into()))
}

fn open_element(
    start: &BytesStart<'_>,
    inherited: Option<String>,
) -> Result<(Element, Option<String>), XmlError> {
    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut scope = inherited;
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();

        if key == "xmlns" {
            scope = if value.is_empty() { None } else { Some(value) };
            continue;
        }
        if key.starts_with("xmlns:") {
            continue;
        }
        attributes.push((key, value));
    }

    let name = match &scope {
        Some(uri) if !raw_name.contains(':') => format!("{{{uri}}}{raw_name}"),
        _ => raw_name,
    };

    Ok((
        Element {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        },
        scope,
    ))
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(XmlError("content after the document element".into()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_first_default_namespace() {
        let text = r#"<a xmlns="urn:one"><b xmlns="urn:two"/></a>"#;
        let stripped = strip_default_namespace(text);
        assert_eq!(stripped, r#"<a ><b xmlns="urn:two"/></a>"#);
    }

    #[test]
    fn empty_namespace_value_is_skipped() {
        let text = r#"<a xmlns=""><b xmlns="urn:x"/></a>"#;
        assert_eq!(strip_default_namespace(text), r#"<a xmlns=""><b /></a>"#);
    }

    #[test]
    fn no_namespace_borrows() {
        assert!(matches!(strip_default_namespace("<a/>"), Cow::Borrowed(_)));
    }

    #[test]
    fn builds_tree_with_text_and_attributes() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
            <Document xmlns="urn:siemens">
              <Tag Name="Start"><Comment>go &amp; run</Comment></Tag>
            </Document>"#,
        )
        .unwrap();

        assert_eq!(root.name, "Document");
        let tag = root.child("Tag").unwrap();
        assert_eq!(tag.attr("Name"), Some("Start"));
        assert_eq!(tag.child("Comment").unwrap().text, "go & run");
    }

    #[test]
    fn second_default_namespace_qualifies_names() {
        let root = parse_document(
            r#"<Document xmlns="urn:one"><Inner xmlns="urn:two"><Name>x</Name></Inner></Document>"#,
        )
        .unwrap();
        let inner = &root.children[0];
        assert_eq!(inner.name, "{urn:two}Inner");
        assert_eq!(inner.children[0].name, "{urn:two}Name");
        assert!(inner.child("Name").is_none());
    }

    #[test]
    fn text_after_first_child_is_ignored() {
        let root = parse("<a>head<b/>tail</a>").unwrap();
        assert_eq!(root.text, "head");
    }

    #[test]
    fn descendants_are_preorder() {
        let root = parse("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = root.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn child_path_walks_nested_children() {
        let root = parse("<a><Interface><Type>FB</Type></Interface></a>").unwrap();
        assert_eq!(root.child_path(&["Interface", "Type"]).unwrap().text, "FB");
        assert!(root.child_path(&["Interface", "Missing"]).is_none());
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn bom_is_tolerated() {
        let root = parse_document("\u{feff}<a/>").unwrap();
        assert_eq!(root.name, "a");
    }
}
