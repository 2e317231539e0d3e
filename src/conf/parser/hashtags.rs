use super::{decode_items, parse_color, resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct RawHashtag {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    name: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    description: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    color: String,
    #[serde(default)]
    ordering: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hashtag {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: i64,
    pub ordering: i32,
}

impl ImportRecord for Hashtag {
    const TABLE: Table = Table::Hashtags;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("name", &self.name)
            .field("description", &self.description)
            .number("color", self.color)
            .number("ordering", self.ordering)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Hashtag(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct HashtagsHandler {
    hashtags: RecordMap<Hashtag>,
}

impl HashtagsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for h in decode_items::<RawHashtag>(EntityKind::Hashtags, raw) {
            // hashtags are identified by their name, '#' optional
            let name = h.name.trim().trim_start_matches('#').to_string();
            let Some(id) = resolve_id(EntityKind::Hashtags, &name.to_lowercase(), &[]) else {
                continue;
            };
            upsert_record(
                &mut self.hashtags,
                Hashtag {
                    id,
                    name,
                    description: h.description,
                    color: parse_color(&h.color),
                    ordering: h.ordering,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Hashtag> {
        &self.hashtags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtag_ids_are_case_insensitive_names() {
        let mut h = HashtagsHandler::new();
        h.process(&serde_json::json!([
            {"name": "#io14", "ordering": 1},
            {"name": "IO14", "description": "dup"},
            {"description": "no name"}
        ]));
        assert_eq!(h.records().len(), 1);
        assert_eq!(h.records()["io14"].description, "dup");
    }
}
