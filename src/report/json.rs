//! JSON output for scripting and piping.

use serde::Serialize;

use crate::store::diff::SnapshotComparison;

pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Sorted copy of the comparison, so output is stable between runs.
pub fn render_comparison(comparison: &SnapshotComparison) -> Result<String, serde_json::Error> {
    let mut sorted = comparison.clone();
    sorted.report.sort_by_name();
    render(&sorted)
}
