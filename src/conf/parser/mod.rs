//! Entity parsers
//!
//! One handler per entity type. A handler accumulates raw JSON records keyed by
//! external id (later records win within a pass) and turns them into
//! normalized records that carry an import fingerprint.

pub mod blocks;
pub mod hashtags;
pub mod map;
pub mod rooms;
pub mod search;
pub mod sessions;
pub mod speakers;
pub mod tags;
pub mod videos;

use crate::conf::batch::mutation::EntityRow;
use crate::conf::types::{EntityKind, Table};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use blocks::{Block, BlocksHandler};
pub use hashtags::{Hashtag, HashtagsHandler};
pub use map::{MapHandler, MapMarker, MapTile};
pub use rooms::{Room, RoomsHandler};
pub use search::{SearchSuggestion, SearchSuggestionsHandler};
pub use sessions::{Session, SessionContext, SessionsHandler};
pub use speakers::{Speaker, SpeakersHandler};
pub use tags::{Tag, TagsHandler};
pub use videos::{Video, VideosHandler};

/// Records of one table keyed by id; ordered so batches are reproducible
pub type RecordMap<R> = BTreeMap<String, R>;

/// Tag category whose tags bucket sessions by type
pub const DEFAULT_GROUPING_CATEGORY: &str = "TYPE";
/// Tag that marks keynote sessions
pub const DEFAULT_KEYNOTE_TAG: &str = "FLAG_KEYNOTE";

/// Parser settings passed explicitly to the handlers that need them
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Category used to compute a session's grouping order
    pub grouping_category: String,
    /// Tag id forcing the reserved keynote grouping order
    pub keynote_tag: String,
}

impl ParserConfig {
    pub fn new() -> Self {
        Self {
            grouping_category: DEFAULT_GROUPING_CATEGORY.to_string(),
            keynote_tag: DEFAULT_KEYNOTE_TAG.to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A normalized record that can be diffed and written
pub trait ImportRecord {
    const TABLE: Table;

    fn id(&self) -> &str;

    /// Deterministic fingerprint over every change-relevant field
    fn import_hash(&self) -> String;

    fn to_row(&self) -> EntityRow;
}

/// Deserialize every element of a JSON array independently.
///
/// A malformed element is logged and skipped; it never fails the whole list.
pub(crate) fn decode_items<T: DeserializeOwned>(kind: EntityKind, raw: &serde_json::Value) -> Vec<T> {
    let items = match raw {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => return Vec::new(),
        other => {
            warn!(
                "[Parser] {} expected an array, got {}; ignoring",
                kind,
                json_type_name(other)
            );
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(v) => out.push(v),
            Err(e) => warn!("[Parser] skipping malformed {} record #{}: {}", kind, idx, e),
        }
    }
    debug!("[Parser] {} decoded {} of {} records", kind, out.len(), items.len());
    out
}

/// Resolve a record id, falling back to a sanitized alternative field.
///
/// Returns `None` (after logging) when neither yields a usable id.
pub(crate) fn resolve_id(kind: EntityKind, id: &str, fallbacks: &[&str]) -> Option<String> {
    let id = id.trim();
    if !id.is_empty() {
        return Some(id.to_string());
    }
    for candidate in fallbacks {
        let sanitized = crate::conf::serialization::sanitize_id(candidate);
        if !sanitized.is_empty() {
            warn!(
                "[Parser] {} record without id, using fallback id {:?}",
                kind, sanitized
            );
            return Some(sanitized);
        }
    }
    warn!("[Parser] {} record without id or fallback field, skipped", kind);
    None
}

/// Insert a record, logging when it replaces an earlier one with the same id
pub(crate) fn upsert_record<R: ImportRecord>(map: &mut RecordMap<R>, record: R) {
    let id = record.id().to_string();
    if map.insert(id.clone(), record).is_some() {
        debug!("[Parser] {} {} redefined, later record wins", R::TABLE, id);
    }
}

/// Parse a `#RRGGBB` / `#AARRGGBB` color into an integer; 0 when absent or invalid
pub(crate) fn parse_color(value: &str) -> i64 {
    let hex = value.trim().trim_start_matches('#');
    if hex.is_empty() {
        return 0;
    }
    match u32::from_str_radix(hex, 16) {
        Ok(v) if hex.len() == 6 => (0xff00_0000 | v) as i32 as i64,
        Ok(v) if hex.len() == 8 => v as i32 as i64,
        _ => {
            warn!("[Parser] invalid color {:?}", value);
            0
        }
    }
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_id_prefers_real_id_then_fallbacks() {
        assert_eq!(
            resolve_id(EntityKind::Sessions, " s1 ", &["ignored"]).as_deref(),
            Some("s1")
        );
        assert_eq!(
            resolve_id(EntityKind::Sessions, "", &["", "Intro to Rust"]).as_deref(),
            Some("intro-to-rust")
        );
        assert_eq!(resolve_id(EntityKind::Sessions, "", &["", "!!"]), None);
    }

    #[test]
    fn colors_parse_with_implicit_alpha() {
        assert_eq!(parse_color("#ffffff"), -1);
        assert_eq!(parse_color("#00000000"), 0);
        assert_eq!(parse_color(""), 0);
        assert_eq!(parse_color("#zz"), 0);
    }

    #[test]
    fn decode_items_skips_bad_elements() {
        #[derive(serde::Deserialize)]
        struct Item {
            #[allow(dead_code)]
            id: String,
        }
        let raw = serde_json::json!([{"id": "a"}, {"id": 3}, {"id": "b"}]);
        let items: Vec<Item> = decode_items(EntityKind::Rooms, &raw);
        assert_eq!(items.len(), 2);
        let none: Vec<Item> = decode_items(EntityKind::Rooms, &serde_json::json!({"id": "a"}));
        assert!(none.is_empty());
    }
}
