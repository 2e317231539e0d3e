use super::{decode_items, resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpeaker {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    id: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    name: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    bio: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    company: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    thumbnail_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    plusone_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    twitter_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub name: String,
    pub bio: String,
    pub company: String,
    pub thumbnail_url: String,
    pub plusone_url: String,
    pub twitter_url: String,
}

impl ImportRecord for Speaker {
    const TABLE: Table = Table::Speakers;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bio", &self.bio)
            .field("company", &self.company)
            .field("thumbnailUrl", &self.thumbnail_url)
            .field("plusoneUrl", &self.plusone_url)
            .field("twitterUrl", &self.twitter_url)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Speaker(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct SpeakersHandler {
    speakers: RecordMap<Speaker>,
}

impl SpeakersHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for s in decode_items::<RawSpeaker>(EntityKind::Speakers, raw) {
            let Some(id) = resolve_id(EntityKind::Speakers, &s.id, &[&s.name]) else {
                continue;
            };
            upsert_record(
                &mut self.speakers,
                Speaker {
                    id,
                    name: s.name,
                    bio: s.bio,
                    company: s.company,
                    thumbnail_url: s.thumbnail_url,
                    plusone_url: s.plusone_url,
                    twitter_url: s.twitter_url,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Speaker> {
        &self.speakers
    }
}
