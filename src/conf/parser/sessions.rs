//! Session parser
//!
//! Sessions are the only entity that depends on other entities of the same
//! pass: the speaker-name summary needs the speaker map and the grouping order
//! needs the tag map. Both maps are handed over complete and read-only through
//! [`SessionContext`].

use super::{
    decode_items, parse_color, resolve_id, upsert_record, ImportRecord, ParserConfig, RecordMap,
    Speaker, Tag,
};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{
    deserialize_string_or_null, deserialize_vec_or_null, parse_timestamp_millis, Fingerprint,
};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Grouping order reserved for keynotes, sorts ahead of every category order
pub const KEYNOTE_GROUPING_ORDER: i32 = i32::MIN;
/// Grouping order of a session carrying no tag of the grouping category
pub const UNGROUPED_ORDER: i32 = i32::MAX;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    id: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    title: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    description: String,
    #[serde(default)]
    start_timestamp: serde_json::Value,
    #[serde(default)]
    end_timestamp: serde_json::Value,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    main_tag: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    hashtag: String,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    speakers: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    room: String,
    #[serde(default)]
    is_livestream: bool,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    youtube_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    captions_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    photo_url: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    color: String,
    #[serde(default)]
    related_content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub start_millis: i64,
    pub end_millis: i64,
    pub room_id: String,
    /// Tag ids in declaration order, duplicates removed
    pub tags: Vec<String>,
    pub main_tag: String,
    pub hashtag: String,
    /// Speaker ids in declaration order, duplicates removed
    pub speakers: Vec<String>,
    pub is_livestream: bool,
    pub youtube_url: String,
    pub captions_url: String,
    pub photo_url: String,
    pub color: i64,
    pub related_content: String,
    /// Derived: names of the known speakers, display only
    pub speaker_names: String,
    /// Derived: bucket used to sort sessions by type
    pub grouping_order: i32,
}

impl ImportRecord for Session {
    const TABLE: Table = Table::Sessions;

    fn id(&self) -> &str {
        &self.id
    }

    // speaker_names and grouping_order are derived and stay out of the fingerprint
    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("id", &self.id)
            .field("description", &self.description)
            .field("title", &self.title)
            .field("url", &self.url)
            .number("startTimestamp", self.start_millis)
            .number("endTimestamp", self.end_millis)
            .field("youtubeUrl", &self.youtube_url)
            .field("room", &self.room_id)
            .number("isLivestream", self.is_livestream)
            .field("photoUrl", &self.photo_url)
            .number("color", self.color)
            .field("captionsUrl", &self.captions_url)
            .field("hashtag", &self.hashtag)
            .field("mainTag", &self.main_tag)
            .field("relatedContent", &self.related_content)
            .list("tag", &self.tags)
            .list("speaker", &self.speakers)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Session(self.clone())
    }
}

/// Completed dependency maps of the current pass
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub tags: &'a RecordMap<Tag>,
    pub speakers: &'a RecordMap<Speaker>,
    pub config: &'a ParserConfig,
}

pub struct SessionsHandler<'a> {
    ctx: SessionContext<'a>,
    sessions: RecordMap<Session>,
}

impl<'a> SessionsHandler<'a> {
    pub fn new(ctx: SessionContext<'a>) -> Self {
        Self {
            ctx,
            sessions: RecordMap::new(),
        }
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for s in decode_items::<RawSession>(EntityKind::Sessions, raw) {
            let Some(id) = resolve_id(EntityKind::Sessions, &s.id, &[&s.url, &s.title]) else {
                continue;
            };
            let tags = dedup(s.tags);
            let speakers = dedup(s.speakers);
            let related_content = match s.related_content {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };

            let session = Session {
                speaker_names: self.speaker_names(&id, &speakers),
                grouping_order: self.grouping_order(&tags),
                id,
                title: s.title,
                description: s.description,
                url: s.url,
                start_millis: parse_timestamp_millis(&s.start_timestamp),
                end_millis: parse_timestamp_millis(&s.end_timestamp),
                room_id: s.room,
                tags,
                main_tag: s.main_tag,
                hashtag: s.hashtag,
                speakers,
                is_livestream: s.is_livestream,
                youtube_url: s.youtube_url,
                captions_url: s.captions_url,
                photo_url: s.photo_url,
                color: parse_color(&s.color),
                related_content,
            };
            upsert_record(&mut self.sessions, session);
        }
    }

    pub fn records(&self) -> &RecordMap<Session> {
        &self.sessions
    }

    pub fn into_records(self) -> RecordMap<Session> {
        self.sessions
    }

    fn speaker_names(&self, session_id: &str, speaker_ids: &[String]) -> String {
        speaker_ids
            .iter()
            .filter_map(|sid| match self.ctx.speakers.get(sid) {
                Some(speaker) => Some(speaker.name.as_str()),
                None => {
                    debug!(
                        "[Parser] session {} references unknown speaker {}",
                        session_id, sid
                    );
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Lowest order among the session's grouping-category tags; keynotes win outright
    fn grouping_order(&self, tag_ids: &[String]) -> i32 {
        let mut order = UNGROUPED_ORDER;
        for tag_id in tag_ids {
            if *tag_id == self.ctx.config.keynote_tag {
                return KEYNOTE_GROUPING_ORDER;
            }
            if let Some(tag) = self.ctx.tags.get(tag_id) {
                if tag.category == self.ctx.config.grouping_category
                    && tag.order_in_category < order
                {
                    order = tag.order_in_category;
                }
            }
        }
        order
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
