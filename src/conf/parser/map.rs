//! Venue map: markers and floor tiles, both keyed by floor in the raw data
//!
//! ```json
//! {"markers": {"0": [{"id": "keynote", "type": "session", "lat": 37.78, "lng": -122.40, "title": "Keynote"}]},
//!  "tiles":   {"0": {"filename": "floor0.svg", "url": "https://..."}}}
//! ```

use super::{resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
struct RawMarker {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    id: String,
    #[serde(default, rename = "type", deserialize_with = "deserialize_string_or_null")]
    marker_type: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lng: f64,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    label: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTile {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    filename: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMap {
    #[serde(default)]
    markers: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    tiles: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: String,
    pub marker_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
    pub floor: String,
}

impl ImportRecord for MapMarker {
    const TABLE: Table = Table::MapMarkers;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("type", &self.marker_type)
            .number("lat", self.latitude)
            .number("lng", self.longitude)
            .field("label", &self.label)
            .field("floor", &self.floor)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::MapMarker(self.clone())
    }
}

/// One overlay tile per floor; the floor doubles as the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTile {
    pub id: String,
    pub floor: String,
    pub file_name: String,
    pub url: String,
}

impl ImportRecord for MapTile {
    const TABLE: Table = Table::MapTiles;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("floor", &self.floor)
            .field("filename", &self.file_name)
            .field("url", &self.url)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::MapTile(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct MapHandler {
    markers: RecordMap<MapMarker>,
    tiles: RecordMap<MapTile>,
}

impl MapHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        if raw.is_null() {
            return;
        }
        let map: RawMap = match serde_json::from_value(raw.clone()) {
            Ok(map) => map,
            Err(e) => {
                warn!("[Parser] map section malformed, ignoring: {}", e);
                return;
            }
        };

        for (floor, markers) in map.markers {
            let Some(items) = markers.as_array() else {
                warn!("[Parser] map markers of floor {} are not an array", floor);
                continue;
            };
            for item in items {
                let m: RawMarker = match serde_json::from_value(item.clone()) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("[Parser] skipping malformed map marker on floor {}: {}", floor, e);
                        continue;
                    }
                };
                let label = if m.label.is_empty() { m.title } else { m.label };
                let Some(id) = resolve_id(EntityKind::Map, &m.id, &[&label]) else {
                    continue;
                };
                upsert_record(
                    &mut self.markers,
                    MapMarker {
                        id,
                        marker_type: m.marker_type,
                        latitude: m.lat,
                        longitude: m.lng,
                        label,
                        floor: floor.clone(),
                    },
                );
            }
        }

        for (floor, tile) in map.tiles {
            let t: RawTile = match serde_json::from_value(tile) {
                Ok(t) => t,
                Err(e) => {
                    warn!("[Parser] skipping malformed map tile of floor {}: {}", floor, e);
                    continue;
                }
            };
            upsert_record(
                &mut self.tiles,
                MapTile {
                    id: floor.clone(),
                    floor,
                    file_name: t.filename,
                    url: t.url,
                },
            );
        }
    }

    pub fn markers(&self) -> &RecordMap<MapMarker> {
        &self.markers
    }

    pub fn tiles(&self) -> &RecordMap<MapTile> {
        &self.tiles
    }
}
