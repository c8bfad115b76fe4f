//! Plain-text rendering.
//!
//! Every list is sorted by name so two renders of the same data are
//! byte-identical:
//! - comparisons use `[+]` added, `[-]` removed, `[~]` modified
//! - listings are fixed-width columns

use std::fmt::Write;

use super::{display_value, format_bytes, format_timestamp, SnapshotDetail, SnapshotList};
use crate::ingest::IngestOutcome;
use crate::store::diff::{CollapseCounts, SnapshotComparison};
use crate::store::{Project, ProjectSummary, Snapshot};

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

fn snapshot_line(snapshot: &Snapshot) -> String {
    format!(
        "#{} ({}) by {}, {}",
        snapshot.id,
        format_timestamp(snapshot.created_at),
        snapshot.operator,
        snapshot.source_file_name
    )
}

fn collapse_note(out: &mut String, side: &str, counts: &CollapseCounts) {
    if counts.total() == 0 {
        return;
    }
    let _ = writeln!(
        out,
        "note: {side} snapshot has duplicate names ({} tags, {} blocks, {} hardware), last one wins",
        counts.tags, counts.blocks, counts.hardware
    );
}

pub fn render_comparison(comparison: &SnapshotComparison) -> String {
    let mut report = comparison.report.clone();
    report.sort_by_name();

    let mut out = String::new();
    let _ = writeln!(out, "Comparing snapshots:");
    let _ = writeln!(out, "  From: {}", snapshot_line(&comparison.from));
    let _ = writeln!(out, "  To:   {}", snapshot_line(&comparison.to));
    out.push('\n');

    collapse_note(&mut out, "older", &report.collapsed_from);
    collapse_note(&mut out, "newer", &report.collapsed_to);

    if report.is_empty() {
        out.push_str("No changes detected.\n");
        return out;
    }

    let tags = &report.tags;
    if !(tags.added.is_empty() && tags.removed.is_empty() && tags.modified.is_empty()) {
        out.push_str("Tags:\n");
        for tag in &tags.added {
            let _ = writeln!(out, "  [+] {}", tag.name);
        }
        for tag in &tags.removed {
            let _ = writeln!(out, "  [-] {}", tag.name);
        }
        for modification in &tags.modified {
            let _ = writeln!(out, "  [~] {}", modification.name);
            for change in &modification.changes {
                let _ = writeln!(
                    out,
                    "        {}: {} -> {}",
                    change.field.label(),
                    display_value(change.old.as_deref()),
                    display_value(change.new.as_deref())
                );
            }
        }
        out.push('\n');
    }

    if !(report.blocks.added.is_empty() && report.blocks.removed.is_empty()) {
        out.push_str("Blocks:\n");
        for block in &report.blocks.added {
            let _ = writeln!(out, "  [+] {} ({})", block.name, block.block_type);
        }
        for block in &report.blocks.removed {
            let _ = writeln!(out, "  [-] {} ({})", block.name, block.block_type);
        }
        out.push('\n');
    }

    if !(report.hardware.added.is_empty() && report.hardware.removed.is_empty()) {
        out.push_str("Hardware:\n");
        for device in &report.hardware.added {
            let _ = writeln!(out, "  [+] {}", device.name);
        }
        for device in &report.hardware.removed {
            let _ = writeln!(out, "  [-] {}", device.name);
        }
        out.push('\n');
    }

    let count = report.change_count();
    let _ = writeln!(out, "{count} change{}.", if count == 1 { "" } else { "s" });
    out
}

pub fn render_projects(projects: &[ProjectSummary]) -> String {
    if projects.is_empty() {
        return String::from(
            "No projects yet. Run 'tiatrack ingest' or 'tiatrack projects add' to create one.\n",
        );
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<6} {:<30} {:<20} {:>9}", "ID", "Project", "Created", "Snapshots");
    out.push_str(&"-".repeat(68));
    out.push('\n');
    for summary in projects {
        let _ = writeln!(
            out,
            "{:<6} {:<30} {:<20} {:>9}",
            summary.project.id,
            truncate(&summary.project.name, 30),
            format_timestamp(summary.project.created_at),
            summary.snapshot_count
        );
    }
    out
}

pub fn render_project(project: &Project) -> String {
    format!(
        "project '{}' (ID: {}), created {}\n",
        project.name,
        project.id,
        format_timestamp(project.created_at)
    )
}

pub fn render_snapshots(list: &SnapshotList) -> String {
    if list.snapshots.is_empty() {
        return format!("No snapshots for project '{}'.\n", list.project.name);
    }

    let mut out = String::new();
    let _ = writeln!(out, "Snapshots of '{}':", list.project.name);
    let _ = writeln!(
        out,
        "{:<6} {:<20} {:<16} {:<14} {}",
        "ID", "Date", "Operator", "Fingerprint", "File"
    );
    out.push_str(&"-".repeat(80));
    out.push('\n');
    for snapshot in &list.snapshots {
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<16} {:<14} {}",
            snapshot.id,
            format_timestamp(snapshot.created_at),
            truncate(&snapshot.operator, 16),
            snapshot.fingerprint.short(),
            snapshot.source_file_name
        );
    }
    out
}

pub fn render_snapshot(detail: &SnapshotDetail) -> String {
    let snapshot = &detail.snapshot;
    let mut out = String::new();
    let _ = writeln!(out, "Snapshot {}", snapshot_line(snapshot));
    let _ = writeln!(out, "fingerprint: {}", snapshot.fingerprint);

    let mut tags: Vec<_> = detail.entities.tags.iter().collect();
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    let _ = writeln!(out, "\nTags ({})", tags.len());
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for tag in tags {
        let _ = writeln!(
            out,
            "  {:30} {:12} {:12} {}",
            truncate(&tag.name, 30),
            display_value(tag.data_type.as_deref()),
            display_value(tag.address.as_deref()),
            tag.description.as_deref().unwrap_or("")
        );
    }

    let mut blocks: Vec<_> = detail.entities.blocks.iter().collect();
    blocks.sort_by(|a, b| a.name.cmp(&b.name));
    let _ = writeln!(out, "\nBlocks ({})", blocks.len());
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for block in blocks {
        let number = block.number.map(|n| n.to_string()).unwrap_or_default();
        let _ = writeln!(out, "  {:30} {:4} {}", truncate(&block.name, 30), block.block_type, number);
    }

    let mut hardware: Vec<_> = detail.entities.hardware.iter().collect();
    hardware.sort_by(|a, b| a.name.cmp(&b.name));
    let _ = writeln!(out, "\nHardware ({})", hardware.len());
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for device in hardware {
        let _ = writeln!(
            out,
            "  {:30} {:24} {}",
            truncate(&device.name, 30),
            device.device_type.as_deref().unwrap_or(""),
            device.ip_address.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn render_ingest(outcome: &IngestOutcome, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "snapshot {} created: {} tags, {} blocks, {} hardware",
        outcome.snapshot_id, outcome.counts.tags, outcome.counts.blocks, outcome.counts.hardware
    );
    let _ = writeln!(out, "fingerprint: {}", outcome.fingerprint);
    if outcome.files_failed > 0 {
        let _ = writeln!(
            out,
            "{} of {} files could not be parsed",
            outcome.files_failed, outcome.files_processed
        );
    }
    if outcome.files_skipped > 0 {
        let _ = writeln!(
            out,
            "{} files skipped (unreadable or not UTF-8)",
            outcome.files_skipped
        );
    }
    let _ = writeln!(out, "completed in {:.2}s", outcome.duration_ms as f64 / 1000.0);

    if verbose {
        if let Some(peak) = outcome.peak_memory_bytes {
            let _ = writeln!(out, "peak memory: {}", format_bytes(peak as u64));
        }
        for diagnostic in &outcome.diagnostics {
            let _ = writeln!(out, "[diagnostic] {diagnostic}");
        }
    }
    out
}
