//! Archive reader.
//!
//! Turns an uploaded project archive (zip container) or an export directory
//! into `(path, xml text)` pairs. Only members whose name ends in `.xml` are
//! returned. Unreadable or non-UTF-8 members become diagnostics; only a
//! container that cannot be opened at all, or one that blows through the
//! configured limits, is an error.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_member_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_member_bytes: 100 * 1024 * 1024,
            max_total_bytes: 500 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a valid archive: {0}")]
    InvalidContainer(String),
    #[error("archive has too many entries: {entries} (limit: {limit})")]
    TooManyEntries { entries: usize, limit: usize },
    #[error("member '{path}' exceeds {limit} bytes uncompressed")]
    MemberTooLarge { path: String, limit: u64 },
    #[error("archive exceeds {limit} bytes uncompressed in total")]
    TotalTooLarge { limit: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    /// True when the upload itself is at fault rather than the host.
    pub fn is_rejected_input(&self) -> bool {
        !matches!(self, ArchiveError::Io(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMember {
    pub path: String,
    pub text: String,
}

/// Members read from one container plus anything that was skipped.
#[derive(Debug, Default)]
pub struct MemberBatch {
    pub members: Vec<XmlMember>,
    pub diagnostics: Vec<String>,
    /// Members that could not be read or decoded.
    pub skipped: usize,
}

pub fn is_xml_name(name: &str) -> bool {
    name.ends_with(".xml")
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub struct ArchiveReader {
    archive: ZipArchive<Box<dyn ReadSeek>>,
    limits: ArchiveLimits,
}

impl ArchiveReader {
    pub fn open(path: &Path, limits: ArchiveLimits) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Self::from_reader(file, limits)
    }

    pub fn from_reader<R: Read + Seek + 'static>(
        reader: R,
        limits: ArchiveLimits,
    ) -> Result<Self, ArchiveError> {
        let reader: Box<dyn ReadSeek> = Box::new(reader);
        // truncated files surface as io errors from the central directory
        // scan, which still means the container is unusable
        let archive =
            ZipArchive::new(reader).map_err(|e| ArchiveError::InvalidContainer(e.to_string()))?;

        if archive.len() > limits.max_entries {
            return Err(ArchiveError::TooManyEntries {
                entries: archive.len(),
                limit: limits.max_entries,
            });
        }

        Ok(ArchiveReader { archive, limits })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    pub fn xml_members(&mut self) -> Result<MemberBatch, ArchiveError> {
        self.xml_members_matching(|_| true)
    }

    /// Reads every `.xml` member whose path passes `keep`. Members that fail
    /// the predicate are never decompressed.
    pub fn xml_members_matching<F>(&mut self, keep: F) -> Result<MemberBatch, ArchiveError>
    where
        F: Fn(&str) -> bool,
    {
        let mut batch = MemberBatch::default();
        let mut total: u64 = 0;

        for index in 0..self.archive.len() {
            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable archive entry");
                    batch.diagnostics.push(format!("entry #{index}: {e}"));
                    batch.skipped += 1;
                    continue;
                }
            };

            if file.is_dir() {
                continue;
            }

            let path = file.name().to_string();
            if !is_xml_name(&path) || !keep(&path) {
                continue;
            }

            let limit = self.limits.max_member_bytes;
            if file.size() > limit {
                return Err(ArchiveError::MemberTooLarge { path, limit });
            }

            // the header size can lie, so cap the actual read as well
            let mut bytes = Vec::new();
            if let Err(e) = (&mut file).take(limit + 1).read_to_end(&mut bytes) {
                warn!(path = %path, error = %e, "failed to decompress member");
                batch.diagnostics.push(format!("{path}: {e}"));
                batch.skipped += 1;
                continue;
            }
            if bytes.len() as u64 > limit {
                return Err(ArchiveError::MemberTooLarge { path, limit });
            }

            total = total.saturating_add(bytes.len() as u64);
            if total > self.limits.max_total_bytes {
                return Err(ArchiveError::TotalTooLarge {
                    limit: self.limits.max_total_bytes,
                });
            }

            match String::from_utf8(bytes) {
                Ok(text) => {
                    debug!(path = %path, "read xml member");
                    batch.members.push(XmlMember { path, text });
                }
                Err(e) => {
                    warn!(path = %path, "member is not valid UTF-8");
                    batch.diagnostics.push(format!("{path}: not valid UTF-8 ({e})"));
                    batch.skipped += 1;
                }
            }
        }

        Ok(batch)
    }
}

/// Reads every `.xml` file under `dir`, recursively, in sorted path order.
/// Paths in the result are relative to `dir`.
pub fn read_directory(dir: &Path) -> Result<MemberBatch, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }

    let mut batch = MemberBatch::default();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                batch.diagnostics.push(format!("walk error: {e}"));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if !is_xml_name(&rel) {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(text) => batch.members.push(XmlMember { path: rel, text }),
            Err(e) => {
                warn!(path = %rel, error = %e, "failed to read export file");
                batch.diagnostics.push(format!("{rel}: {e}"));
                batch.skipped += 1;
            }
        }
    }

    Ok(batch)
}
