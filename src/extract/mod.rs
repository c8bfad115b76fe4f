//! Entity extraction.
//!
//! Turns XML payloads into tag, block and hardware records:
//! - Directory mode: every file goes through every classifier, since the
//!   export tool names files after the entity, not the category
//! - Archive mode: a member only reaches the classifiers whose path keywords
//!   it contains, which keeps large archives cheap
//!
//! A payload that fails to parse is logged and counted; the batch goes on.

pub mod blocks;
pub mod classifier;
pub mod hardware;
pub mod resolve;
pub mod tags;
pub mod xml;

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::archive::{self, ArchiveError, ArchiveReader, XmlMember};
use crate::model::ExtractedEntities;
use classifier::Classifier;
use xml::XmlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Directory,
    Archive,
}

#[derive(Debug, Default, Serialize)]
pub struct ExtractResult {
    pub entities: ExtractedEntities,
    pub diagnostics: Vec<String>,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Members dropped before parsing: unreadable or not UTF-8.
    pub files_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

impl ExtractResult {
    fn merge_file(&mut self, path: &str, outcome: Result<ExtractedEntities, XmlError>) {
        self.files_processed += 1;
        match outcome {
            Ok(entities) => self.entities.merge(entities),
            Err(e) => {
                self.files_failed += 1;
                self.diagnostics.push(format!("{path}: {e}"));
            }
        }
    }
}

pub fn classifiers() -> [&'static dyn Classifier; 3] {
    [
        &tags::TagClassifier,
        &blocks::BlockClassifier,
        &hardware::HardwareClassifier,
    ]
}

/// True if at least one classifier would look at this archive member.
pub fn archive_path_selected(path: &str) -> bool {
    classifiers().iter().any(|c| c.matches_path(path))
}

/// Parses one payload and runs the classifiers selected by `mode`.
pub fn classify_document(path: &str, text: &str, mode: Mode) -> Result<ExtractedEntities, XmlError> {
    let mut out = ExtractedEntities::default();

    let selected: Vec<&dyn Classifier> = classifiers()
        .into_iter()
        .filter(|c| mode == Mode::Directory || c.matches_path(path))
        .collect();
    if selected.is_empty() {
        return Ok(out);
    }

    let root = xml::parse_document(text)?;
    for classifier in selected {
        trace!(path, category = classifier.category().as_str(), "classifying");
        classifier.classify(&root, &mut out);
    }
    Ok(out)
}

/// Holds the bounded worker pool used for per-file classification.
/// Build once and share by reference.
pub struct Extractor {
    pool: ThreadPool,
}

impl Extractor {
    pub fn new(workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("extract-{i}"))
            .build()?;
        Ok(Extractor { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Classifies already-loaded members. Output order follows input order.
    pub fn extract_members(&self, members: &[XmlMember], mode: Mode) -> ExtractResult {
        let start = Instant::now();

        let outcomes: Vec<_> = self.pool.install(|| {
            members
                .par_iter()
                .map(|m| (m.path.as_str(), classify_document(&m.path, &m.text, mode)))
                .collect()
        });

        let mut result = ExtractResult::default();
        for (path, outcome) in outcomes {
            match &outcome {
                Ok(entities) => debug!(
                    path,
                    tags = entities.tags.len(),
                    blocks = entities.blocks.len(),
                    hardware = entities.hardware.len(),
                    "classified"
                ),
                Err(e) => warn!(path, error = %e, "skipping malformed xml"),
            }
            result.merge_file(path, outcome);
        }

        result.duration_ms = Some(start.elapsed().as_millis());
        info!(
            files = result.files_processed,
            failed = result.files_failed,
            tags = result.entities.tags.len(),
            blocks = result.entities.blocks.len(),
            hardware = result.entities.hardware.len(),
            "extraction complete"
        );
        result
    }

    pub fn extract_directory(&self, dir: &Path) -> Result<ExtractResult, ArchiveError> {
        let batch = archive::read_directory(dir)?;
        info!(dir = %dir.display(), files = batch.members.len(), "extracting export directory");

        let mut result = self.extract_members(&batch.members, Mode::Directory);
        result.files_skipped = batch.skipped;
        result.diagnostics.extend(batch.diagnostics);
        Ok(result)
    }

    pub fn extract_archive(&self, reader: &mut ArchiveReader) -> Result<ExtractResult, ArchiveError> {
        let batch = reader.xml_members_matching(archive_path_selected)?;
        info!(
            entries = reader.len(),
            selected = batch.members.len(),
            "extracting archive"
        );

        let mut result = self.extract_members(&batch.members, Mode::Archive);
        result.files_skipped = batch.skipped;
        if result.files_skipped > 0 {
            warn!(skipped = result.files_skipped, "archive members skipped");
        }
        result.diagnostics.extend(batch.diagnostics);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(path: &str, text: &str) -> XmlMember {
        XmlMember {
            path: path.to_string(),
            text: text.to_string(),
        }
    }

    const TAG_XML: &str = r#"<Document><Tag Name="A" DataType="Bool"/></Document>"#;
    const BLOCK_XML: &str = r#"<Document><SW.Blocks.OB><AttributeList><Name>Main</Name><Number>1</Number></AttributeList></SW.Blocks.OB></Document>"#;

    #[test]
    fn archive_mode_gates_by_path() {
        // a tag payload under a non-tag path is never looked at
        let found = classify_document("misc/stuff.xml", TAG_XML, Mode::Archive).unwrap();
        assert!(found.is_empty());

        let found = classify_document("PLC tags/table.xml", TAG_XML, Mode::Archive).unwrap();
        assert_eq!(found.tags.len(), 1);
    }

    #[test]
    fn directory_mode_ignores_path() {
        let found = classify_document("Main.xml", BLOCK_XML, Mode::Directory).unwrap();
        assert_eq!(found.blocks.len(), 1);
        assert_eq!(found.blocks[0].block_type, "OB");
    }

    #[test]
    fn unselected_member_is_not_parsed() {
        // malformed, but no classifier wants it, so no error either
        assert!(classify_document("readme.xml", "<broken", Mode::Archive).is_ok());
    }

    #[test]
    fn one_bad_file_does_not_stop_the_batch() {
        let extractor = Extractor::new(2).unwrap();
        let mut members: Vec<XmlMember> = (0..9)
            .map(|i| member(&format!("tags/{i}.xml"), &format!(r#"<Tag Name="T{i}"/>"#)))
            .collect();
        members.insert(4, member("tags/broken.xml", "<Tag Name=\"x\">"));

        let result = extractor.extract_members(&members, Mode::Archive);
        assert_eq!(result.files_processed, 10);
        assert_eq!(result.files_failed, 1);
        assert_eq!(result.entities.tags.len(), 9);
        assert!(result.diagnostics[0].starts_with("tags/broken.xml"));
    }

    #[test]
    fn output_order_is_stable() {
        let extractor = Extractor::new(4).unwrap();
        let members: Vec<XmlMember> = (0..50)
            .map(|i| member(&format!("{i}.xml"), &format!(r#"<Tag Name="T{i}"/>"#)))
            .collect();

        let first = extractor.extract_members(&members, Mode::Directory);
        let second = extractor.extract_members(&members, Mode::Directory);
        assert_eq!(first.entities, second.entities);
        assert_eq!(first.entities.tags[0].name, "T0");
        assert_eq!(first.entities.tags[49].name, "T49");
    }

    #[test]
    fn empty_input_gives_empty_result() {
        let extractor = Extractor::new(1).unwrap();
        let result = extractor.extract_members(&[], Mode::Archive);
        assert!(result.entities.is_empty());
        assert_eq!(result.files_processed, 0);
    }

    #[test]
    fn one_classifier_per_category() {
        let categories: Vec<_> = classifiers().iter().map(|c| c.category()).collect();
        assert_eq!(
            categories,
            [
                crate::model::EntityCategory::Tag,
                crate::model::EntityCategory::Block,
                crate::model::EntityCategory::Hardware
            ]
        );
    }

    #[test]
    fn undecodable_archive_member_is_counted_as_skipped() {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;
        use zip::ZipWriter;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("tags/a.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(&[0xff, 0xfe, 0x3c, 0x00]).unwrap();
        writer.start_file("tags/b.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(TAG_XML.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = ArchiveReader::from_reader(
            Cursor::new(bytes),
            crate::archive::ArchiveLimits::default(),
        )
        .unwrap();
        let result = Extractor::new(1).unwrap().extract_archive(&mut reader).unwrap();
        assert_eq!(result.files_processed, 1);
        assert_eq!(result.files_failed, 0);
        assert_eq!(result.files_skipped, 1);
        assert_eq!(result.entities.tags.len(), 1);
        assert!(result.diagnostics[0].starts_with("tags/a.xml"));
    }

    #[test]
    fn pool_has_at_least_one_worker() {
        assert_eq!(Extractor::new(0).unwrap().workers(), 1);
    }
}
