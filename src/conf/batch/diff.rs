//! Fingerprint diff
//!
//! Classifies the incoming records of one table against the persisted
//! fingerprint index and turns the classification into mutations. A missing
//! or empty index means full mode: wipe the table and insert everything,
//! unless there is nothing to insert either.

use super::mutation::{Mutation, MutationBatch};
use crate::conf::parser::{ImportRecord, RecordMap, Session};
use crate::conf::types::{LinkTable, Table};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Persisted `id -> import fingerprint` of one table
pub type FingerprintIndex = HashMap<String, String>;

/// Classification of one table's incoming records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    pub table: Table,
    pub full: bool,
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
    pub deleted: Vec<String>,
}

impl TableDiff {
    /// Ids whose rows are (re)written by this diff
    pub fn written_ids(&self) -> impl Iterator<Item = &String> {
        self.inserted.iter().chain(self.updated.iter())
    }
}

/// Classify records against the previous index
pub fn diff_records<R: ImportRecord>(
    records: &RecordMap<R>,
    previous: Option<&FingerprintIndex>,
) -> TableDiff {
    let table = R::TABLE;
    let previous = match previous {
        Some(index) if !index.is_empty() => index,
        // nothing stored and nothing incoming: steady state, not a reload
        Some(_) if records.is_empty() => {
            return TableDiff {
                table,
                full: false,
                inserted: Vec::new(),
                updated: Vec::new(),
                unchanged: 0,
                deleted: Vec::new(),
            };
        }
        _ => {
            return TableDiff {
                table,
                full: true,
                inserted: records.keys().cloned().collect(),
                updated: Vec::new(),
                unchanged: 0,
                deleted: Vec::new(),
            };
        }
    };

    let mut diff = TableDiff {
        table,
        full: false,
        inserted: Vec::new(),
        updated: Vec::new(),
        unchanged: 0,
        deleted: Vec::new(),
    };
    for (id, record) in records {
        match previous.get(id) {
            None => diff.inserted.push(id.clone()),
            Some(hash) if *hash != record.import_hash() => diff.updated.push(id.clone()),
            Some(_) => diff.unchanged += 1,
        }
    }
    diff.deleted = previous
        .keys()
        .filter(|id| !records.contains_key(*id))
        .cloned()
        .collect();
    diff.deleted.sort();
    diff
}

/// Mutations for one table, together with the classification they came from
pub fn build_mutations<R: ImportRecord>(
    records: &RecordMap<R>,
    previous: Option<&FingerprintIndex>,
) -> (Vec<Mutation>, TableDiff) {
    let diff = diff_records(records, previous);
    let mut out = Vec::with_capacity(diff.inserted.len() + diff.updated.len() + diff.deleted.len() + 1);

    if diff.full {
        out.push(Mutation::DeleteAll { table: diff.table });
    }
    for (id, record) in records {
        if diff.inserted.binary_search(id).is_ok() {
            out.push(Mutation::Insert(record.to_row()));
        } else if diff.updated.binary_search(id).is_ok() {
            out.push(Mutation::Update(record.to_row()));
        }
    }
    for id in &diff.deleted {
        out.push(Mutation::DeleteById {
            table: diff.table,
            id: id.clone(),
        });
    }
    (out, diff)
}

/// Relationship rows of the sessions table.
///
/// Links have no fingerprint of their own, so every written session gets its
/// links dropped and reinserted, and every deleted session loses its links.
pub fn session_link_mutations(sessions: &RecordMap<Session>, diff: &TableDiff) -> Vec<Mutation> {
    let mut out = Vec::new();
    if diff.full {
        for link in LinkTable::ALL {
            out.push(Mutation::DeleteAllLinks { link });
        }
    }

    for id in diff.written_ids() {
        let Some(session) = sessions.get(id) else {
            continue;
        };
        if !diff.full {
            for link in LinkTable::ALL {
                out.push(Mutation::DeleteLinks {
                    link,
                    session_id: id.clone(),
                });
            }
        }
        for speaker in &session.speakers {
            out.push(Mutation::InsertLink {
                link: LinkTable::SessionSpeakers,
                session_id: id.clone(),
                target_id: speaker.clone(),
            });
        }
        for tag in &session.tags {
            out.push(Mutation::InsertLink {
                link: LinkTable::SessionTags,
                session_id: id.clone(),
                target_id: tag.clone(),
            });
        }
    }

    for id in &diff.deleted {
        for link in LinkTable::ALL {
            out.push(Mutation::DeleteLinks {
                link,
                session_id: id.clone(),
            });
        }
    }
    out
}

/// Speaker and tag ids written or deleted earlier in the same batch
#[derive(Debug, Default)]
pub struct ChangedReferences {
    pub speakers: HashSet<String>,
    pub tags: HashSet<String>,
}

impl ChangedReferences {
    pub fn absorb(set: &mut HashSet<String>, diff: &TableDiff) {
        set.extend(diff.written_ids().cloned());
        set.extend(diff.deleted.iter().cloned());
    }

    fn touches(&self, session: &Session) -> bool {
        session.speakers.iter().any(|id| self.speakers.contains(id))
            || session.tags.iter().any(|id| self.tags.contains(id))
    }
}

/// Rewrites of fingerprint-unchanged sessions that reference a changed
/// speaker or tag, so the speaker-name summary and grouping order follow.
pub fn derived_refresh_mutations(
    sessions: &RecordMap<Session>,
    diff: &TableDiff,
    changed: &ChangedReferences,
) -> Vec<Mutation> {
    if diff.full || (changed.speakers.is_empty() && changed.tags.is_empty()) {
        return Vec::new();
    }
    let out: Vec<Mutation> = sessions
        .iter()
        .filter(|(id, _)| {
            diff.inserted.binary_search(id).is_err() && diff.updated.binary_search(id).is_err()
        })
        .filter(|(_, session)| changed.touches(session))
        .map(|(_, session)| Mutation::Update(session.to_row()))
        .collect();
    if !out.is_empty() {
        debug!("[Importer] refreshing derived columns of {} unchanged sessions", out.len());
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub full: bool,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl From<&TableDiff> for TableStats {
    fn from(diff: &TableDiff) -> Self {
        Self {
            full: diff.full,
            inserted: diff.inserted.len(),
            updated: diff.updated.len(),
            unchanged: diff.unchanged,
            deleted: diff.deleted.len(),
        }
    }
}

/// Per-table counters of one import pass, kept for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    tables: BTreeMap<Table, TableStats>,
}

impl ImportStats {
    pub fn record(&mut self, diff: &TableDiff) {
        self.tables.insert(diff.table, TableStats::from(diff));
    }

    pub fn get(&self, table: Table) -> Option<&TableStats> {
        self.tables.get(&table)
    }

    pub fn total_changed(&self) -> usize {
        self.tables
            .values()
            .map(|s| s.inserted + s.updated + s.deleted)
            .sum()
    }

    pub fn log_summary(&self) {
        for (table, s) in &self.tables {
            info!(
                "[Importer] {}: {} inserted, {} updated, {} unchanged, {} deleted{}",
                table,
                s.inserted,
                s.updated,
                s.unchanged,
                s.deleted,
                if s.full { " (full reload)" } else { "" }
            );
        }
    }
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .tables
            .iter()
            .map(|(t, s)| format!("{}+{}~{}-{}", t, s.inserted, s.updated, s.deleted))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Append one table's mutations to the batch and record its stats
pub(crate) fn append_table<R: ImportRecord>(
    batch: &mut MutationBatch,
    stats: &mut ImportStats,
    records: &RecordMap<R>,
    previous: Option<&FingerprintIndex>,
) -> TableDiff {
    let (mutations, diff) = build_mutations(records, previous);
    batch.extend(mutations);
    stats.record(&diff);
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::batch::mutation::EntityRow;
    use crate::conf::parser::Room;
    use pretty_assertions::assert_eq;

    fn rooms(ids: &[(&str, &str)]) -> RecordMap<Room> {
        ids.iter()
            .map(|(id, name)| {
                (
                    id.to_string(),
                    Room {
                        id: id.to_string(),
                        name: name.to_string(),
                        floor: String::new(),
                    },
                )
            })
            .collect()
    }

    fn index_of(records: &RecordMap<Room>) -> FingerprintIndex {
        records
            .iter()
            .map(|(id, r)| (id.clone(), r.import_hash()))
            .collect()
    }

    #[test]
    fn missing_or_empty_index_means_full_mode() {
        let incoming = rooms(&[("a", "A"), ("b", "B")]);
        for previous in [None, Some(FingerprintIndex::new())] {
            let (mutations, diff) = build_mutations(&incoming, previous.as_ref());
            assert!(diff.full);
            assert_eq!(mutations.len(), 3);
            assert_eq!(mutations[0], Mutation::DeleteAll { table: Table::Rooms });
            assert!(matches!(&mutations[1], Mutation::Insert(EntityRow::Room(r)) if r.id == "a"));
        }
    }

    #[test]
    fn empty_table_with_no_records_stays_quiet() {
        let (mutations, diff) =
            build_mutations(&RecordMap::<Room>::new(), Some(&FingerprintIndex::new()));
        assert!(!diff.full);
        assert!(mutations.is_empty());

        // an explicit full reload still wipes the table
        let (mutations, diff) = build_mutations(&RecordMap::<Room>::new(), None);
        assert!(diff.full);
        assert_eq!(mutations, vec![Mutation::DeleteAll { table: Table::Rooms }]);
    }

    #[test]
    fn incremental_diff_is_complete() {
        let before = rooms(&[("keep", "K"), ("change", "C"), ("drop", "D")]);
        let index = index_of(&before);
        let after = rooms(&[("keep", "K"), ("change", "C2"), ("new", "N")]);

        let (mutations, diff) = build_mutations(&after, Some(&index));
        assert!(!diff.full);
        assert_eq!(diff.inserted, vec!["new".to_string()]);
        assert_eq!(diff.updated, vec!["change".to_string()]);
        assert_eq!(diff.deleted, vec!["drop".to_string()]);
        assert_eq!(diff.unchanged, 1);

        let inserts = mutations.iter().filter(|m| matches!(m, Mutation::Insert(_))).count();
        let updates = mutations.iter().filter(|m| matches!(m, Mutation::Update(_))).count();
        let deletes = mutations
            .iter()
            .filter(|m| matches!(m, Mutation::DeleteById { id, .. } if id == "drop"))
            .count();
        assert_eq!((inserts, updates, deletes, mutations.len()), (1, 1, 1, 3));
    }

    #[test]
    fn empty_incoming_set_deletes_everything_indexed() {
        let index = index_of(&rooms(&[("a", "A"), ("b", "B")]));
        let (mutations, diff) = build_mutations(&RecordMap::<Room>::new(), Some(&index));
        assert!(!diff.full);
        assert_eq!(
            mutations,
            vec![
                Mutation::DeleteById { table: Table::Rooms, id: "a".into() },
                Mutation::DeleteById { table: Table::Rooms, id: "b".into() },
            ]
        );
    }

    #[test]
    fn unchanged_sessions_get_no_link_rewrites() {
        let mut sessions = RecordMap::new();
        let session = Session {
            id: "s1".into(),
            title: "T".into(),
            description: String::new(),
            url: String::new(),
            start_millis: 0,
            end_millis: 0,
            room_id: String::new(),
            tags: vec!["TOPIC_X".into()],
            main_tag: String::new(),
            hashtag: String::new(),
            speakers: vec!["sp1".into()],
            is_livestream: false,
            youtube_url: String::new(),
            captions_url: String::new(),
            photo_url: String::new(),
            color: 0,
            related_content: String::new(),
            speaker_names: String::new(),
            grouping_order: i32::MAX,
        };
        let index: FingerprintIndex = [("s1".to_string(), session.import_hash())].into();
        sessions.insert("s1".to_string(), session);

        let diff = diff_records(&sessions, Some(&index));
        assert!(session_link_mutations(&sessions, &diff).is_empty());

        let full = diff_records(&sessions, None);
        let links = session_link_mutations(&sessions, &full);
        assert_eq!(links.len(), 4);
        assert_eq!(links[0], Mutation::DeleteAllLinks { link: LinkTable::SessionSpeakers });
    }
}
