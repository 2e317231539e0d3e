//! Mutations produced by the batch builder and consumed by the store

use crate::conf::parser::{
    Block, Hashtag, ImportRecord, MapMarker, MapTile, Room, SearchSuggestion, Session, Speaker,
    Tag, Video,
};
use crate::conf::types::{EntityKind, LinkTable, Table};

/// A full entity row, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRow {
    Room(Room),
    Block(Block),
    Tag(Tag),
    Speaker(Speaker),
    Session(Session),
    SearchSuggestion(SearchSuggestion),
    MapMarker(MapMarker),
    MapTile(MapTile),
    Hashtag(Hashtag),
    Video(Video),
}

impl EntityRow {
    pub fn table(&self) -> Table {
        match self {
            EntityRow::Room(_) => Table::Rooms,
            EntityRow::Block(_) => Table::Blocks,
            EntityRow::Tag(_) => Table::Tags,
            EntityRow::Speaker(_) => Table::Speakers,
            EntityRow::Session(_) => Table::Sessions,
            EntityRow::SearchSuggestion(_) => Table::SearchSuggestions,
            EntityRow::MapMarker(_) => Table::MapMarkers,
            EntityRow::MapTile(_) => Table::MapTiles,
            EntityRow::Hashtag(_) => Table::Hashtags,
            EntityRow::Video(_) => Table::Videos,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRow::Room(r) => r.id(),
            EntityRow::Block(r) => r.id(),
            EntityRow::Tag(r) => r.id(),
            EntityRow::Speaker(r) => r.id(),
            EntityRow::Session(r) => r.id(),
            EntityRow::SearchSuggestion(r) => r.id(),
            EntityRow::MapMarker(r) => r.id(),
            EntityRow::MapTile(r) => r.id(),
            EntityRow::Hashtag(r) => r.id(),
            EntityRow::Video(r) => r.id(),
        }
    }

    pub fn import_hash(&self) -> String {
        match self {
            EntityRow::Room(r) => r.import_hash(),
            EntityRow::Block(r) => r.import_hash(),
            EntityRow::Tag(r) => r.import_hash(),
            EntityRow::Speaker(r) => r.import_hash(),
            EntityRow::Session(r) => r.import_hash(),
            EntityRow::SearchSuggestion(r) => r.import_hash(),
            EntityRow::MapMarker(r) => r.import_hash(),
            EntityRow::MapTile(r) => r.import_hash(),
            EntityRow::Hashtag(r) => r.import_hash(),
            EntityRow::Video(r) => r.import_hash(),
        }
    }
}

/// One write against the store
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    DeleteAll { table: Table },
    DeleteById { table: Table, id: String },
    Insert(EntityRow),
    /// Update in place; the row must already exist
    Update(EntityRow),
    DeleteAllLinks { link: LinkTable },
    DeleteLinks { link: LinkTable, session_id: String },
    InsertLink {
        link: LinkTable,
        session_id: String,
        target_id: String,
    },
}

impl Mutation {
    /// Top-level entity path this mutation belongs to
    pub fn kind(&self) -> EntityKind {
        match self {
            Mutation::DeleteAll { table } | Mutation::DeleteById { table, .. } => table.kind(),
            Mutation::Insert(row) | Mutation::Update(row) => row.table().kind(),
            Mutation::DeleteAllLinks { .. }
            | Mutation::DeleteLinks { .. }
            | Mutation::InsertLink { .. } => EntityKind::Sessions,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(
            self,
            Mutation::DeleteAllLinks { .. }
                | Mutation::DeleteLinks { .. }
                | Mutation::InsertLink { .. }
        )
    }
}

/// Ordered list of mutations applied as one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn extend(&mut self, mutations: impl IntoIterator<Item = Mutation>) {
        self.mutations.extend(mutations);
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }

    /// Entity paths touched by the batch, each once, in dependency order
    pub fn kinds_touched(&self) -> Vec<EntityKind> {
        EntityKind::IMPORT_ORDER
            .into_iter()
            .filter(|kind| self.mutations.iter().any(|m| m.kind() == *kind))
            .collect()
    }

    /// Number of non-link mutations, the figure reported as "entity writes"
    pub fn entity_mutation_count(&self) -> usize {
        self.mutations.iter().filter(|m| !m.is_link()).count()
    }

    pub fn link_mutation_count(&self) -> usize {
        self.mutations.iter().filter(|m| m.is_link()).count()
    }
}

impl<'a> IntoIterator for &'a MutationBatch {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> EntityRow {
        EntityRow::Room(Room {
            id: id.into(),
            name: id.into(),
            floor: String::new(),
        })
    }

    #[test]
    fn kinds_touched_follow_dependency_order() {
        let mut batch = MutationBatch::new();
        batch.push(Mutation::DeleteLinks {
            link: LinkTable::SessionTags,
            session_id: "s1".into(),
        });
        batch.push(Mutation::Insert(room("r1")));
        batch.push(Mutation::DeleteById {
            table: Table::MapTiles,
            id: "0".into(),
        });
        batch.push(Mutation::Insert(room("r2")));

        assert_eq!(
            batch.kinds_touched(),
            vec![EntityKind::Rooms, EntityKind::Sessions, EntityKind::Map]
        );
        assert_eq!(batch.entity_mutation_count(), 3);
        assert_eq!(batch.link_mutation_count(), 1);
    }
}
