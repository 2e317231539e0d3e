use serde::{Deserialize, Serialize};
use std::fmt;

/// Manifest format literal accepted by default
pub const MANIFEST_FORMAT: &str = "iosched-json-v1";

/// Top-level keys of a conference data file
pub mod data_key {
    pub const ROOMS: &str = "rooms";
    pub const BLOCKS: &str = "blocks";
    pub const TAGS: &str = "tags";
    pub const SPEAKERS: &str = "speakers";
    pub const SESSIONS: &str = "sessions";
    pub const SEARCH_SUGGESTIONS: &str = "search_suggestions";
    pub const MAP: &str = "map";
    pub const HASHTAGS: &str = "hashtags";
    pub const VIDEOS: &str = "video_library";
}

/// Server-side manifest listing the data files of the current conference data set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub format: String,
    #[serde(default, deserialize_with = "crate::conf::serialization::deserialize_vec_or_null")]
    pub data_files: Vec<String>,
}

/// Entity types found in data files, in import dependency order.
///
/// Sessions reference rooms, tags and speakers, so those come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Rooms,
    Blocks,
    Tags,
    Speakers,
    Sessions,
    SearchSuggestions,
    Map,
    Hashtags,
    Videos,
}

impl EntityKind {
    pub const IMPORT_ORDER: [EntityKind; 9] = [
        EntityKind::Rooms,
        EntityKind::Blocks,
        EntityKind::Tags,
        EntityKind::Speakers,
        EntityKind::Sessions,
        EntityKind::SearchSuggestions,
        EntityKind::Map,
        EntityKind::Hashtags,
        EntityKind::Videos,
    ];

    /// Resolve a data-file key; `None` for keys this client does not know yet
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            data_key::ROOMS => Some(EntityKind::Rooms),
            data_key::BLOCKS => Some(EntityKind::Blocks),
            data_key::TAGS => Some(EntityKind::Tags),
            data_key::SPEAKERS => Some(EntityKind::Speakers),
            data_key::SESSIONS => Some(EntityKind::Sessions),
            data_key::SEARCH_SUGGESTIONS => Some(EntityKind::SearchSuggestions),
            data_key::MAP => Some(EntityKind::Map),
            data_key::HASHTAGS => Some(EntityKind::Hashtags),
            data_key::VIDEOS => Some(EntityKind::Videos),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Rooms => data_key::ROOMS,
            EntityKind::Blocks => data_key::BLOCKS,
            EntityKind::Tags => data_key::TAGS,
            EntityKind::Speakers => data_key::SPEAKERS,
            EntityKind::Sessions => data_key::SESSIONS,
            EntityKind::SearchSuggestions => data_key::SEARCH_SUGGESTIONS,
            EntityKind::Map => data_key::MAP,
            EntityKind::Hashtags => data_key::HASHTAGS,
            EntityKind::Videos => data_key::VIDEOS,
        }
    }

    /// Top-level path observers subscribe to
    pub fn path(self) -> &'static str {
        match self {
            EntityKind::Rooms => "rooms",
            EntityKind::Blocks => "blocks",
            EntityKind::Tags => "tags",
            EntityKind::Speakers => "speakers",
            EntityKind::Sessions => "sessions",
            EntityKind::SearchSuggestions => "search_suggest_query",
            EntityKind::Map => "map",
            EntityKind::Hashtags => "hashtags",
            EntityKind::Videos => "videos",
        }
    }

    pub fn tables(self) -> &'static [Table] {
        match self {
            EntityKind::Rooms => &[Table::Rooms],
            EntityKind::Blocks => &[Table::Blocks],
            EntityKind::Tags => &[Table::Tags],
            EntityKind::Speakers => &[Table::Speakers],
            EntityKind::Sessions => &[Table::Sessions],
            EntityKind::SearchSuggestions => &[Table::SearchSuggestions],
            EntityKind::Map => &[Table::MapMarkers, Table::MapTiles],
            EntityKind::Hashtags => &[Table::Hashtags],
            EntityKind::Videos => &[Table::Videos],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Entity tables. Every one has `id TEXT PRIMARY KEY` and an `import_hash` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Rooms,
    Blocks,
    Tags,
    Speakers,
    Sessions,
    SearchSuggestions,
    MapMarkers,
    MapTiles,
    Hashtags,
    Videos,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Rooms => "rooms",
            Table::Blocks => "blocks",
            Table::Tags => "tags",
            Table::Speakers => "speakers",
            Table::Sessions => "sessions",
            Table::SearchSuggestions => "search_suggestions",
            Table::MapMarkers => "map_markers",
            Table::MapTiles => "map_tiles",
            Table::Hashtags => "hashtags",
            Table::Videos => "videos",
        }
    }

    pub fn kind(self) -> EntityKind {
        match self {
            Table::Rooms => EntityKind::Rooms,
            Table::Blocks => EntityKind::Blocks,
            Table::Tags => EntityKind::Tags,
            Table::Speakers => EntityKind::Speakers,
            Table::Sessions => EntityKind::Sessions,
            Table::SearchSuggestions => EntityKind::SearchSuggestions,
            Table::MapMarkers | Table::MapTiles => EntityKind::Map,
            Table::Hashtags => EntityKind::Hashtags,
            Table::Videos => EntityKind::Videos,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session relationship tables; rebuilt with their owning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkTable {
    SessionSpeakers,
    SessionTags,
}

impl LinkTable {
    pub const ALL: [LinkTable; 2] = [LinkTable::SessionSpeakers, LinkTable::SessionTags];

    pub fn name(self) -> &'static str {
        match self {
            LinkTable::SessionSpeakers => "session_speakers",
            LinkTable::SessionTags => "session_tags",
        }
    }

    /// Column holding the referenced entity id
    pub fn target_column(self) -> &'static str {
        match self {
            LinkTable::SessionSpeakers => "speaker_id",
            LinkTable::SessionTags => "tag_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_key() {
        for kind in EntityKind::IMPORT_ORDER {
            assert_eq!(EntityKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(EntityKind::from_key("partners"), None);
    }

    #[test]
    fn import_order_puts_references_before_sessions() {
        let pos = |k| EntityKind::IMPORT_ORDER.iter().position(|x| *x == k).unwrap();
        assert!(pos(EntityKind::Rooms) < pos(EntityKind::Sessions));
        assert!(pos(EntityKind::Tags) < pos(EntityKind::Sessions));
        assert!(pos(EntityKind::Speakers) < pos(EntityKind::Sessions));
    }
}
