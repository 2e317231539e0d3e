use super::{decode_items, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{
    deserialize_string_or_null, parse_timestamp_millis, sanitize_id, Fingerprint,
};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
struct RawBlock {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    title: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    subtitle: String,
    #[serde(default, rename = "type", deserialize_with = "deserialize_string_or_null")]
    block_type: String,
    #[serde(default)]
    start: serde_json::Value,
    #[serde(default)]
    end: serde_json::Value,
}

/// A time block of the agenda (meals, breaks, "free" slots)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub block_type: String,
    pub start_millis: i64,
    pub end_millis: i64,
}

/// Blocks carry no id of their own; it is derived from the time range
pub fn generate_block_id(start_millis: i64, end_millis: i64) -> String {
    sanitize_id(&format!("{}-{}", start_millis, end_millis))
}

impl ImportRecord for Block {
    const TABLE: Table = Table::Blocks;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("type", &self.block_type)
            .number("start", self.start_millis)
            .number("end", self.end_millis)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Block(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct BlocksHandler {
    blocks: RecordMap<Block>,
}

impl BlocksHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for b in decode_items::<RawBlock>(EntityKind::Blocks, raw) {
            let start_millis = parse_timestamp_millis(&b.start);
            let end_millis = parse_timestamp_millis(&b.end);
            if start_millis == 0 && end_millis == 0 {
                warn!("[Parser] block {:?} has no time range, skipped", b.title);
                continue;
            }
            upsert_record(
                &mut self.blocks,
                Block {
                    id: generate_block_id(start_millis, end_millis),
                    title: b.title,
                    subtitle: b.subtitle,
                    block_type: b.block_type,
                    start_millis,
                    end_millis,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Block> {
        &self.blocks
    }
}
