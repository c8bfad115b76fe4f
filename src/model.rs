use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Tag,
    Block,
    Hardware,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Tag => "Tag",
            EntityCategory::Block => "Block",
            EntityCategory::Hardware => "Hardware",
        }
    }
}

/// A PLC tag. `name` is the key within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    pub data_type: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub hardware_ref: Option<String>,
    pub block_ref: Option<String>,
}

/// A program block (OB, FB, FC, DB).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub name: String,
    pub block_type: String,
    pub number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareRecord {
    pub name: String,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub rack_slot: Option<String>,
}

/// Everything extracted from one upload. Names are not guaranteed unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub tags: Vec<TagRecord>,
    pub blocks: Vec<BlockRecord>,
    pub hardware: Vec<HardwareRecord>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.blocks.is_empty() && self.hardware.is_empty()
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            tags: self.tags.len(),
            blocks: self.blocks.len(),
            hardware: self.hardware.len(),
        }
    }

    pub fn merge(&mut self, other: ExtractedEntities) {
        self.tags.extend(other.tags);
        self.blocks.extend(other.blocks);
        self.hardware.extend(other.hardware);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub tags: usize,
    pub blocks: usize,
    pub hardware: usize,
}
