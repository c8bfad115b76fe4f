//! Upload flow.
//!
//! One ingest turns an archive on disk into a stored snapshot:
//! 1. reject missing project/operator names and, when an export tool is
//!    configured, files it does not handle
//! 2. fingerprint the raw bytes; an already-stored fingerprint stops here
//! 3. extract, either through the export tool (directory mode) or straight
//!    from the zip container (archive mode)
//! 4. write header and records in one transaction
//!
//! Nothing is persisted unless step 4 succeeds.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{ArchiveError, ArchiveLimits, ArchiveReader};
use crate::export::{self, ExportError, ExportTool};
use crate::extract::{ExtractResult, Extractor};
use crate::fingerprint::{self, Fingerprint};
use crate::model::EntityCounts;
use crate::store::{NewSnapshot, ProjectId, SnapshotId, Store, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("unsupported file type: {} (allowed: {})", .path.display(), .allowed.join(", "))]
    UnsupportedExtension { path: PathBuf, allowed: Vec<String> },
    #[error("failed to fingerprint {}: {source}", .path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("external tool failure: {0}")]
    ExternalTool(#[from] ExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True when the upload itself was at fault. Everything else is a fault
    /// on our side (disk, database, export tool).
    pub fn is_rejected_input(&self) -> bool {
        match self {
            IngestError::MissingField(_) | IngestError::UnsupportedExtension { .. } => true,
            IngestError::Archive(e) => e.is_rejected_input(),
            IngestError::Store(e) => e.is_rejected_input(),
            IngestError::Fingerprint { .. } | IngestError::ExternalTool(_) => false,
        }
    }

    /// The already-stored snapshot, when this was a duplicate upload.
    pub fn existing_snapshot(&self) -> Option<SnapshotId> {
        match self {
            IngestError::Store(StoreError::DuplicateSnapshot { existing }) => Some(*existing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub archive_path: &'a Path,
    pub project: &'a str,
    pub operator: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub snapshot_id: SnapshotId,
    pub project_id: ProjectId,
    pub fingerprint: Fingerprint,
    pub counts: EntityCounts,
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub diagnostics: Vec<String>,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<usize>,
}

/// Case-insensitive extension check against a list given without dots.
pub fn extension_allowed(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

fn resident_memory() -> Option<usize> {
    memory_stats::memory_stats().map(|stats| stats.physical_mem)
}

struct ExportStage<'a> {
    tool: &'a dyn ExportTool,
    extensions: Vec<String>,
}

pub struct Ingestor<'a> {
    store: &'a mut Store,
    extractor: &'a Extractor,
    limits: ArchiveLimits,
    export: Option<ExportStage<'a>>,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a mut Store, extractor: &'a Extractor, limits: ArchiveLimits) -> Self {
        Ingestor {
            store,
            extractor,
            limits,
            export: None,
        }
    }

    /// Routes uploads through `tool`. Only files whose extension is in
    /// `extensions` are accepted from then on.
    pub fn with_export_tool(mut self, tool: &'a dyn ExportTool, extensions: Vec<String>) -> Self {
        self.export = Some(ExportStage { tool, extensions });
        self
    }

    pub fn ingest(&mut self, request: &IngestRequest<'_>) -> Result<IngestOutcome, IngestError> {
        let start = Instant::now();
        let mut peak_memory = resident_memory();

        let project = request.project.trim();
        let operator = request.operator.trim();
        if project.is_empty() {
            return Err(IngestError::MissingField("project name"));
        }
        if operator.is_empty() {
            return Err(IngestError::MissingField("operator name"));
        }

        let path = request.archive_path;
        if let Some(stage) = &self.export {
            if !extension_allowed(path, &stage.extensions) {
                return Err(IngestError::UnsupportedExtension {
                    path: path.to_path_buf(),
                    allowed: stage.extensions.clone(),
                });
            }
        }

        let fingerprint = fingerprint::of_path(path).map_err(|source| IngestError::Fingerprint {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), fingerprint = fingerprint.short(), "ingesting archive");

        // cheap early exit; create_snapshot re-checks under its transaction
        if let Some(existing) = self.store.find_by_fingerprint(&fingerprint)? {
            info!(existing, "archive already stored");
            return Err(StoreError::DuplicateSnapshot { existing }.into());
        }

        let extracted = self.extract(path)?;
        peak_memory = peak_memory.max(resident_memory());

        let source_file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let snapshot_id = self.store.create_snapshot(
            &NewSnapshot {
                project,
                operator,
                source_file_name: &source_file_name,
                fingerprint: &fingerprint,
            },
            &extracted.entities,
        )?;
        let project_id = self
            .store
            .get_snapshot(snapshot_id)?
            .map(|s| s.project_id)
            .ok_or(StoreError::SnapshotNotFound(snapshot_id))?;

        let counts = extracted.entities.counts();
        let duration_ms = start.elapsed().as_millis();
        info!(
            snapshot = snapshot_id,
            project,
            tags = counts.tags,
            blocks = counts.blocks,
            hardware = counts.hardware,
            duration_ms = duration_ms as u64,
            "snapshot created"
        );

        Ok(IngestOutcome {
            snapshot_id,
            project_id,
            fingerprint,
            counts,
            files_processed: extracted.files_processed,
            files_failed: extracted.files_failed,
            files_skipped: extracted.files_skipped,
            diagnostics: extracted.diagnostics,
            duration_ms,
            peak_memory_bytes: peak_memory,
        })
    }

    fn extract(&self, path: &Path) -> Result<ExtractResult, IngestError> {
        match &self.export {
            Some(stage) => {
                let output = export::export_to_tempdir(stage.tool, path)?;
                let result = self.extractor.extract_directory(output.path())?;
                if result.files_processed == 0 {
                    warn!(tool = stage.tool.name(), "export produced no xml files");
                }
                Ok(result)
            }
            None => {
                let mut reader = ArchiveReader::open(path, self.limits)?;
                Ok(self.extractor.extract_archive(&mut reader)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const TAGS: &str = r#"<Document>
        <SW.Tags.PlcTag><AttributeList><Name>Motor_Run</Name><DataTypeName>Bool</DataTypeName><LogicalAddress>%Q0.0</LogicalAddress></AttributeList></SW.Tags.PlcTag>
        <SW.Tags.PlcTag><AttributeList><Name>Speed</Name><DataTypeName>Int</DataTypeName></AttributeList></SW.Tags.PlcTag>
    </Document>"#;

    fn write_zip(dir: &TempDir, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        for (member, contents) in files {
            writer.start_file(*member, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn request<'a>(path: &'a Path, project: &'a str) -> IngestRequest<'a> {
        IngestRequest {
            archive_path: path,
            project,
            operator: "jdoe",
        }
    }

    #[test]
    fn archive_upload_creates_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(&dir, "line1.zap15", &[("PLC tags/Default.xml", TAGS)]);
        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(2).unwrap();

        let outcome = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .ingest(&request(&path, "Line 1"))
            .unwrap();

        assert_eq!(outcome.counts.tags, 2);
        assert_eq!(outcome.fingerprint, fingerprint::of_path(&path).unwrap());

        let snapshot = store.get_snapshot(outcome.snapshot_id).unwrap().unwrap();
        assert_eq!(snapshot.source_file_name, "line1.zap15");
        assert_eq!(snapshot.operator, "jdoe");
        assert_eq!(store.get_entities(outcome.snapshot_id).unwrap().tags.len(), 2);
    }

    #[test]
    fn second_identical_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(&dir, "a.zap15", &[("tags/t.xml", TAGS)]);
        let copy = dir.path().join("b.zap15");
        std::fs::copy(&path, &copy).unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();
        let mut ingestor = Ingestor::new(&mut store, &extractor, ArchiveLimits::default());

        let first = ingestor.ingest(&request(&path, "P")).unwrap();
        // other project, same bytes
        let err = ingestor.ingest(&request(&copy, "Q")).unwrap_err();
        assert_eq!(err.existing_snapshot(), Some(first.snapshot_id));
        assert!(err.is_rejected_input());
    }

    #[test]
    fn invalid_container_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zap15");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();
        let err = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .ingest(&request(&path, "P"))
            .unwrap_err();

        assert!(matches!(err, IngestError::Archive(ArchiveError::InvalidContainer(_))));
        assert!(err.is_rejected_input());
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn blank_operator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(&dir, "a.zap15", &[]);
        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();

        let err = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .ingest(&IngestRequest {
                archive_path: &path,
                project: "P",
                operator: "   ",
            })
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingField("operator name")));
    }

    #[test]
    fn zero_xml_archive_is_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(&dir, "a.zap15", &[("readme.txt", "hello")]);
        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();

        let outcome = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .ingest(&request(&path, "P"))
            .unwrap();
        assert_eq!(outcome.counts, EntityCounts::default());
    }

    struct WritesTags;

    impl ExportTool for WritesTags {
        fn name(&self) -> &str {
            "writes-tags"
        }

        fn export(&self, _archive: &Path, output_dir: &Path) -> Result<(), ExportError> {
            // file names carry no category; directory mode must still find them
            std::fs::write(output_dir.join("Default tag table.xml"), TAGS)?;
            Ok(())
        }
    }

    struct Broken;

    impl ExportTool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn export(&self, _archive: &Path, _output_dir: &Path) -> Result<(), ExportError> {
            Err(ExportError::Failed { code: Some(2) })
        }
    }

    fn zap_extensions() -> Vec<String> {
        vec!["zap15".into(), "zap20".into()]
    }

    #[test]
    fn export_tool_output_is_extracted_in_directory_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.zap20");
        std::fs::write(&path, b"proprietary bytes").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();
        let tool = WritesTags;
        let outcome = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .with_export_tool(&tool, zap_extensions())
            .ingest(&request(&path, "P"))
            .unwrap();
        assert_eq!(outcome.counts.tags, 2);
    }

    #[test]
    fn export_tool_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(&dir, "plant.zip", &[]);
        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();
        let tool = WritesTags;

        let err = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .with_export_tool(&tool, zap_extensions())
            .ingest(&request(&path, "P"))
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension { .. }));
        assert!(err.is_rejected_input());
    }

    #[test]
    fn tool_failure_is_a_fault_not_an_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.ZAP15");
        std::fs::write(&path, b"bytes").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let extractor = Extractor::new(1).unwrap();
        let tool = Broken;
        let err = Ingestor::new(&mut store, &extractor, ArchiveLimits::default())
            .with_export_tool(&tool, zap_extensions())
            .ingest(&request(&path, "P"))
            .unwrap_err();

        assert!(matches!(err, IngestError::ExternalTool(_)));
        assert!(!err.is_rejected_input());
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn extension_check_ignores_case() {
        let allowed = zap_extensions();
        assert!(extension_allowed(Path::new("x.Zap20"), &allowed));
        assert!(!extension_allowed(Path::new("x.zap"), &allowed));
        assert!(!extension_allowed(Path::new("zap15"), &allowed));
    }
}
