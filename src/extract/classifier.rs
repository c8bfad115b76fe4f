use crate::model::{EntityCategory, ExtractedEntities};

use super::xml::Element;

/// One entity category's view of an XML payload.
///
/// `classify` walks the whole tree and pushes every candidate that resolves
/// its required fields. Candidates missing them are dropped silently.
pub trait Classifier: Sync {
    fn category(&self) -> EntityCategory;

    /// Lowercase substrings an archive member path must contain before this
    /// classifier looks at it. Directory mode ignores them.
    fn path_keywords(&self) -> &'static [&'static str];

    fn classify(&self, root: &Element, out: &mut ExtractedEntities);

    fn matches_path(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.path_keywords().iter().any(|k| lower.contains(k))
    }
}
