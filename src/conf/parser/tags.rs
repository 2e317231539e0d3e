use super::{decode_items, parse_color, resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct RawTag {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    tag: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    name: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    category: String,
    #[serde(default)]
    order_in_category: i32,
    #[serde(default, rename = "abstract", deserialize_with = "deserialize_string_or_null")]
    abstract_text: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    color: String,
    #[serde(default, rename = "photoUrl", deserialize_with = "deserialize_string_or_null")]
    photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub category: String,
    pub name: String,
    pub order_in_category: i32,
    pub abstract_text: String,
    pub color: i64,
    pub photo_url: String,
}

impl ImportRecord for Tag {
    const TABLE: Table = Table::Tags;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("tag", &self.id)
            .field("category", &self.category)
            .field("name", &self.name)
            .number("order", self.order_in_category)
            .field("abstract", &self.abstract_text)
            .number("color", self.color)
            .field("photoUrl", &self.photo_url)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Tag(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct TagsHandler {
    tags: RecordMap<Tag>,
}

impl TagsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for t in decode_items::<RawTag>(EntityKind::Tags, raw) {
            let fallback = format!("{} {}", t.category, t.name);
            let Some(id) = resolve_id(EntityKind::Tags, &t.tag, &[&fallback]) else {
                continue;
            };
            upsert_record(
                &mut self.tags,
                Tag {
                    id,
                    category: t.category,
                    name: t.name,
                    order_in_category: t.order_in_category,
                    abstract_text: t.abstract_text,
                    color: parse_color(&t.color),
                    photo_url: t.photo_url,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Tag> {
        &self.tags
    }
}
