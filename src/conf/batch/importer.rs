//! Conference data importer
//!
//! Collects the JSON bodies of one sync pass, runs the entity handlers in
//! dependency order and turns their output into one ordered mutation batch.

use super::diff::{
    append_table, derived_refresh_mutations, session_link_mutations, ChangedReferences,
    FingerprintIndex, ImportStats,
};
use super::mutation::MutationBatch;
use crate::conf::error::{SyncError, SyncResult};
use crate::conf::parser::{
    BlocksHandler, HashtagsHandler, MapHandler, ParserConfig, RoomsHandler,
    SearchSuggestionsHandler, SessionContext, SessionsHandler, SpeakersHandler, TagsHandler,
    VideosHandler,
};
use crate::conf::types::{EntityKind, Table};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// How previously persisted fingerprints are taken into account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Diff against the persisted index, table by table
    Incremental,
    /// Ignore the index and wipe-and-reload every table present (bootstrap)
    Full,
}

/// Read side of the persisted fingerprint index
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn previous_fingerprints(&self, table: Table) -> SyncResult<FingerprintIndex>;
}

pub struct ConferenceDataImporter {
    config: ParserConfig,
    /// Raw sections per entity kind, in the order the bodies were added
    sections: BTreeMap<EntityKind, Vec<serde_json::Value>>,
    files: usize,
}

impl ConferenceDataImporter {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            sections: BTreeMap::new(),
            files: 0,
        }
    }

    /// Add one data file. Unknown top-level keys are skipped with a warning.
    pub fn add_body(&mut self, name: &str, body: &str) -> SyncResult<()> {
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(body).map_err(|e| SyncError::parse(format!("data file {}", name), e))?;

        for (key, value) in object {
            match EntityKind::from_key(&key) {
                Some(kind) => self.sections.entry(kind).or_default().push(value),
                None => warn!("[Importer] unknown key {:?} in {}, skipped", key, name),
            }
        }
        self.files += 1;
        debug!("[Importer] added data file {}", name);
        Ok(())
    }

    /// Kinds present in at least one added file
    pub fn kinds_present(&self) -> Vec<EntityKind> {
        self.sections.keys().copied().collect()
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Parse everything added so far and build the mutation batch.
    ///
    /// A kind that appears in no file produces no mutations at all. In
    /// incremental mode, a failed index read degrades that table to full mode.
    pub async fn build_batch(
        &self,
        source: &dyn FingerprintSource,
        mode: ImportMode,
    ) -> SyncResult<(MutationBatch, ImportStats)> {
        let mut batch = MutationBatch::new();
        let mut stats = ImportStats::default();

        let mut changed = ChangedReferences::default();
        let mut tags = TagsHandler::new();
        let mut speakers = SpeakersHandler::new();
        self.feed(EntityKind::Tags, |v| tags.process(v));
        self.feed(EntityKind::Speakers, |v| speakers.process(v));

        for kind in EntityKind::IMPORT_ORDER {
            if !self.sections.contains_key(&kind) {
                continue;
            }
            match kind {
                EntityKind::Rooms => {
                    let mut h = RoomsHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::Rooms, mode).await;
                    append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                }
                EntityKind::Blocks => {
                    let mut h = BlocksHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::Blocks, mode).await;
                    append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                }
                EntityKind::Tags => {
                    let prev = previous(source, Table::Tags, mode).await;
                    let diff = append_table(&mut batch, &mut stats, tags.records(), prev.as_ref());
                    ChangedReferences::absorb(&mut changed.tags, &diff);
                }
                EntityKind::Speakers => {
                    let prev = previous(source, Table::Speakers, mode).await;
                    let diff =
                        append_table(&mut batch, &mut stats, speakers.records(), prev.as_ref());
                    ChangedReferences::absorb(&mut changed.speakers, &diff);
                }
                EntityKind::Sessions => {
                    let mut h = SessionsHandler::new(SessionContext {
                        tags: tags.records(),
                        speakers: speakers.records(),
                        config: &self.config,
                    });
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::Sessions, mode).await;
                    let diff = append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                    batch.extend(derived_refresh_mutations(h.records(), &diff, &changed));
                    batch.extend(session_link_mutations(h.records(), &diff));
                }
                EntityKind::SearchSuggestions => {
                    let mut h = SearchSuggestionsHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::SearchSuggestions, mode).await;
                    append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                }
                EntityKind::Map => {
                    let mut h = MapHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::MapMarkers, mode).await;
                    append_table(&mut batch, &mut stats, h.markers(), prev.as_ref());
                    let prev = previous(source, Table::MapTiles, mode).await;
                    append_table(&mut batch, &mut stats, h.tiles(), prev.as_ref());
                }
                EntityKind::Hashtags => {
                    let mut h = HashtagsHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::Hashtags, mode).await;
                    append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                }
                EntityKind::Videos => {
                    let mut h = VideosHandler::new();
                    self.feed(kind, |v| h.process(v));
                    let prev = previous(source, Table::Videos, mode).await;
                    append_table(&mut batch, &mut stats, h.records(), prev.as_ref());
                }
            }
        }

        info!(
            "[Importer] built batch from {} file(s): {} entity mutations, {} link mutations",
            self.files,
            batch.entity_mutation_count(),
            batch.link_mutation_count()
        );
        stats.log_summary();
        Ok((batch, stats))
    }

    fn feed(&self, kind: EntityKind, mut process: impl FnMut(&serde_json::Value)) {
        if let Some(sections) = self.sections.get(&kind) {
            for section in sections {
                process(section);
            }
        }
    }
}

async fn previous(
    source: &dyn FingerprintSource,
    table: Table,
    mode: ImportMode,
) -> Option<FingerprintIndex> {
    if mode == ImportMode::Full {
        return None;
    }
    match source.previous_fingerprints(table).await {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(
                "[Importer] reading fingerprints of {} failed, falling back to full reload: {}",
                table, e
            );
            None
        }
    }
}
