pub mod json;
pub mod table;

use serde::Serialize;

use crate::model::ExtractedEntities;
use crate::store::{Project, Snapshot};

/// `show` output: a header plus every stored record.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDetail {
    pub snapshot: Snapshot,
    pub entities: ExtractedEntities,
}

/// `snapshots` output.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotList {
    pub project: Project,
    pub snapshots: Vec<Snapshot>,
}

pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Optional field for text output; absent and empty read differently.
pub fn display_value(value: Option<&str>) -> String {
    match value {
        None => "(none)".to_string(),
        Some("") => "\"\"".to_string(),
        Some(v) => v.to_string(),
    }
}
