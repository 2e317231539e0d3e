use super::{decode_items, resolve_id, upsert_record, ImportRecord, RecordMap};
use crate::conf::batch::mutation::EntityRow;
use crate::conf::serialization::{deserialize_string_or_null, Fingerprint};
use crate::conf::types::{EntityKind, Table};
use serde::{Deserialize, Serialize};

/// Raw room as it appears in a data file
#[derive(Debug, Clone, Deserialize)]
struct RawRoom {
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    id: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    name: String,
    #[serde(default)]
    floor: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub floor: String,
}

impl ImportRecord for Room {
    const TABLE: Table = Table::Rooms;

    fn id(&self) -> &str {
        &self.id
    }

    fn import_hash(&self) -> String {
        Fingerprint::new()
            .field("id", &self.id)
            .field("name", &self.name)
            .field("floor", &self.floor)
            .finish()
    }

    fn to_row(&self) -> EntityRow {
        EntityRow::Room(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct RoomsHandler {
    rooms: RecordMap<Room>,
}

impl RoomsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &serde_json::Value) {
        for r in decode_items::<RawRoom>(EntityKind::Rooms, raw) {
            let Some(id) = resolve_id(EntityKind::Rooms, &r.id, &[&r.name]) else {
                continue;
            };
            // floors show up both as "1" and 1
            let floor = match r.floor {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => String::new(),
            };
            upsert_record(
                &mut self.rooms,
                Room {
                    id,
                    name: r.name,
                    floor,
                },
            );
        }
    }

    pub fn records(&self) -> &RecordMap<Room> {
        &self.rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_room_with_same_id_wins() {
        let mut h = RoomsHandler::new();
        h.process(&serde_json::json!([
            {"id": "room1", "name": "Room 1", "floor": 1},
            {"id": "room1", "name": "Room One", "floor": "2"},
            {"name": "Hall B"}
        ]));
        let rooms = h.records();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms["room1"].name, "Room One");
        assert_eq!(rooms["room1"].floor, "2");
        assert_eq!(rooms["hall-b"].name, "Hall B");
    }
}
