//! Snapshot comparison engine.
//!
//! Compares two snapshots category by category:
//! - Records are matched by name; within one snapshot a later duplicate name
//!   replaces an earlier one (the number replaced is reported as collapsed)
//! - Tags: added, removed, and modified with every differing field listed
//! - Blocks and hardware: added and removed only
//!
//! Output lists have no inherent order; call `sort_by_name` when it matters.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::{Snapshot, SnapshotId, Store, StoreError};
use crate::model::{BlockRecord, ExtractedEntities, HardwareRecord, TagRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagField {
    Type,
    Address,
    Description,
    #[serde(rename = "Hardware Reference")]
    HardwareReference,
    #[serde(rename = "Block Reference")]
    BlockReference,
}

impl TagField {
    pub const ALL: [TagField; 5] = [
        TagField::Type,
        TagField::Address,
        TagField::Description,
        TagField::HardwareReference,
        TagField::BlockReference,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TagField::Type => "Type",
            TagField::Address => "Address",
            TagField::Description => "Description",
            TagField::HardwareReference => "Hardware Reference",
            TagField::BlockReference => "Block Reference",
        }
    }

    fn value<'a>(&self, tag: &'a TagRecord) -> Option<&'a str> {
        match self {
            TagField::Type => tag.data_type.as_deref(),
            TagField::Address => tag.address.as_deref(),
            TagField::Description => tag.description.as_deref(),
            TagField::HardwareReference => tag.hardware_ref.as_deref(),
            TagField::BlockReference => tag.block_ref.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: TagField,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagModification {
    pub name: String,
    pub old: TagRecord,
    pub new: TagRecord,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagChanges {
    pub added: Vec<TagRecord>,
    pub removed: Vec<TagRecord>,
    pub modified: Vec<TagModification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceChanges<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for PresenceChanges<T> {
    fn default() -> Self {
        PresenceChanges {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Records dropped by last-write-wins name collapsing, per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollapseCounts {
    pub tags: usize,
    pub blocks: usize,
    pub hardware: usize,
}

impl CollapseCounts {
    pub fn total(&self) -> usize {
        self.tags + self.blocks + self.hardware
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    pub tags: TagChanges,
    pub blocks: PresenceChanges<BlockRecord>,
    pub hardware: PresenceChanges<HardwareRecord>,
    pub collapsed_from: CollapseCounts,
    pub collapsed_to: CollapseCounts,
}

impl ComparisonReport {
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    pub fn change_count(&self) -> usize {
        self.tags.added.len()
            + self.tags.removed.len()
            + self.tags.modified.len()
            + self.blocks.added.len()
            + self.blocks.removed.len()
            + self.hardware.added.len()
            + self.hardware.removed.len()
    }

    pub fn sort_by_name(&mut self) {
        self.tags.added.sort_by(|a, b| a.name.cmp(&b.name));
        self.tags.removed.sort_by(|a, b| a.name.cmp(&b.name));
        self.tags.modified.sort_by(|a, b| a.name.cmp(&b.name));
        self.blocks.added.sort_by(|a, b| a.name.cmp(&b.name));
        self.blocks.removed.sort_by(|a, b| a.name.cmp(&b.name));
        self.hardware.added.sort_by(|a, b| a.name.cmp(&b.name));
        self.hardware.removed.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// A report together with the two snapshot headers it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotComparison {
    pub from: Snapshot,
    pub to: Snapshot,
    pub report: ComparisonReport,
}

/// Builds a name-keyed map; later duplicates overwrite earlier ones.
/// Returns the map and how many records were overwritten.
fn index_by_name<'a, T>(records: &'a [T], name: fn(&T) -> &str) -> (HashMap<&'a str, &'a T>, usize) {
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        map.insert(name(record), record);
    }
    let collapsed = records.len() - map.len();
    (map, collapsed)
}

fn presence<T: Clone>(
    from: &HashMap<&str, &T>,
    to: &HashMap<&str, &T>,
) -> PresenceChanges<T> {
    PresenceChanges {
        added: to
            .iter()
            .filter(|(key, _)| !from.contains_key(*key))
            .map(|(_, r)| (*r).clone())
            .collect(),
        removed: from
            .iter()
            .filter(|(key, _)| !to.contains_key(*key))
            .map(|(_, r)| (*r).clone())
            .collect(),
    }
}

/// Every field that differs between two versions of a tag. Absent and empty
/// string are different values.
pub fn tag_differences(old: &TagRecord, new: &TagRecord) -> Vec<FieldChange> {
    TagField::ALL
        .iter()
        .filter(|field| field.value(old) != field.value(new))
        .map(|field| FieldChange {
            field: *field,
            old: field.value(old).map(str::to_string),
            new: field.value(new).map(str::to_string),
        })
        .collect()
}

/// Compares two entity bags; `from` is conventionally the older snapshot.
pub fn compare_entities(from: &ExtractedEntities, to: &ExtractedEntities) -> ComparisonReport {
    let (from_tags, from_tags_collapsed) = index_by_name(&from.tags, |t| t.name.as_str());
    let (to_tags, to_tags_collapsed) = index_by_name(&to.tags, |t| t.name.as_str());
    let (from_blocks, from_blocks_collapsed) = index_by_name(&from.blocks, |b| b.name.as_str());
    let (to_blocks, to_blocks_collapsed) = index_by_name(&to.blocks, |b| b.name.as_str());
    let (from_hw, from_hw_collapsed) = index_by_name(&from.hardware, |h| h.name.as_str());
    let (to_hw, to_hw_collapsed) = index_by_name(&to.hardware, |h| h.name.as_str());

    let tag_presence = presence(&from_tags, &to_tags);

    let mut modified = Vec::new();
    for (name, new_tag) in &to_tags {
        let Some(old_tag) = from_tags.get(name) else {
            continue;
        };
        let changes = tag_differences(old_tag, new_tag);
        if !changes.is_empty() {
            modified.push(TagModification {
                name: name.to_string(),
                old: (*old_tag).clone(),
                new: (*new_tag).clone(),
                changes,
            });
        }
    }

    let report = ComparisonReport {
        tags: TagChanges {
            added: tag_presence.added,
            removed: tag_presence.removed,
            modified,
        },
        blocks: presence(&from_blocks, &to_blocks),
        hardware: presence(&from_hw, &to_hw),
        collapsed_from: CollapseCounts {
            tags: from_tags_collapsed,
            blocks: from_blocks_collapsed,
            hardware: from_hw_collapsed,
        },
        collapsed_to: CollapseCounts {
            tags: to_tags_collapsed,
            blocks: to_blocks_collapsed,
            hardware: to_hw_collapsed,
        },
    };

    if report.collapsed_from.total() + report.collapsed_to.total() > 0 {
        debug!(
            from = report.collapsed_from.total(),
            to = report.collapsed_to.total(),
            "duplicate names collapsed"
        );
    }

    report
}

/// Loads both snapshots from the store and compares them.
pub fn compare(store: &Store, from_id: SnapshotId, to_id: SnapshotId) -> Result<SnapshotComparison, StoreError> {
    let from = store
        .get_snapshot(from_id)?
        .ok_or(StoreError::SnapshotNotFound(from_id))?;
    let to = store
        .get_snapshot(to_id)?
        .ok_or(StoreError::SnapshotNotFound(to_id))?;

    let from_entities = store.get_entities(from_id)?;
    let to_entities = store.get_entities(to_id)?;

    Ok(SnapshotComparison {
        from,
        to,
        report: compare_entities(&from_entities, &to_entities),
    })
}
