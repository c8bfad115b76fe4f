//! SQLite snapshot storage.
//!
//! Persists each upload as an immutable snapshot:
//! - projects: id, name (unique), created_at
//! - snapshots: id, project_id, fingerprint (unique across all projects),
//!   created_at, operator, source_file_name
//! - tags / blocks / hardware: one row per extracted record, keyed by snapshot
//!
//! A snapshot and all of its records are written in one transaction. There is
//! no update or delete path.

pub mod diff;
pub mod snapshot;

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::fingerprint::Fingerprint;

pub use snapshot::Store;

pub type ProjectId = i64;
pub type SnapshotId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub snapshot_count: usize,
}

/// Snapshot header, without the entity records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub project_id: ProjectId,
    pub fingerprint: Fingerprint,
    pub created_at: i64,
    pub operator: String,
    pub source_file_name: String,
}

/// Everything `create_snapshot` needs besides the records.
#[derive(Debug, Clone, Copy)]
pub struct NewSnapshot<'a> {
    pub project: &'a str,
    pub operator: &'a str,
    pub source_file_name: &'a str,
    pub fingerprint: &'a Fingerprint,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a snapshot of this archive already exists (ID: {existing})")]
    DuplicateSnapshot { existing: SnapshotId },
    #[error("snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),
    #[error("project '{0}' not found")]
    ProjectNotFound(String),
    #[error("project name must not be empty")]
    EmptyProjectName,
    #[error("could not determine data directory")]
    DataDir,
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Caller-side conditions, as opposed to storage faults.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateSnapshot { .. }
                | StoreError::SnapshotNotFound(_)
                | StoreError::ProjectNotFound(_)
                | StoreError::EmptyProjectName
        )
    }
}
