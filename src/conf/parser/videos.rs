use super::{decode_items, resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    id: String,
    #[serde(default)]
    year: i32,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    title: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    desc: String,
    /// YouTube video id
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    vid: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    speakers: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    thumbnail_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    topic: String,
}

/// Entry of the past-conference video library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub year: i32,
    pub title: String,
    pub description: String,
    pub youtube_id: String,
    pub speakers: String,
    pub thumbnail_url: String,
    pub topic: String,
}

impl ImportRecord for Video {
    const TABLE: Table = Table::Videos;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("id", &self.id)
            .number("year", self.year)
            .field("title", &self.title)
            .field("desc", &self.description)
            .field("vid", &self.youtube_id)
            .field("speakers", &self.speakers)
            .field("thumbnailUrl", &self.thumbnail_url)
            .field("topic", &self.topic)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Video(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct VideosHandler {
    videos: RecordMap<Video>,
}

impl VideosHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for v in decode_items::<RawVideo>(EntityKind::Videos, raw) {
            let Some(id) = resolve_id(EntityKind::Videos, &v.id, &[&v.vid, &v.title]) else {
                continue;
            };
            upsert_record(
                &mut self.videos,
                Video {
                    id,
                    year: v.year,
                    title: v.title,
                    description: v.desc,
                    youtube_id: v.vid,
                    speakers: v.speakers,
                    thumbnail_url: v.thumbnail_url,
                    topic: v.topic,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Video> {
        &self.videos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_falls_back_to_youtube_id() {
        let mut h = VideosHandler::new();
        h.process(&serde_json::json!([
            {"id": "v1", "year": 2013, "title": "Keynote", "vid": "abc"},
            {"title": "Untitled", "vid": "XyZ_9"}
        ]));
        assert_eq!(h.records()["v1"].youtube_id, "abc");
        assert!(h.records().contains_key("xyz-9"));
    }
}
