//! Change notification callbacks

use crate::conf::store::queries::rebuild_search_index;
use crate::conf::types::EntityKind;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};

/// Observer of committed store changes.
///
/// `path` is the top-level entity path (`sessions`, `speakers`, `map`, ...).
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_data_changed(&self, path: &str);

    /// All paths of one committed sync batch, in dependency order
    async fn on_batch_committed(&self, paths: &[&str]) {
        for path in paths {
            self.on_data_changed(path).await;
        }
    }
}

/// No-op listener
pub struct EmptyChangeListener;

#[async_trait]
impl ChangeListener for EmptyChangeListener {
    async fn on_data_changed(&self, _path: &str) {}
}

/// Rebuilds the session search index whenever sessions or speakers change.
///
/// A sync batch touching both rebuilds once.
pub struct SearchIndexUpdater {
    db: Pool<Sqlite>,
    rebuilds: AtomicUsize,
}

impl SearchIndexUpdater {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            rebuilds: AtomicUsize::new(0),
        }
    }

    /// Number of rebuilds run so far
    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::Relaxed)
    }

    fn affects_index(path: &str) -> bool {
        path == EntityKind::Sessions.path() || path == EntityKind::Speakers.path()
    }

    async fn rebuild(&self, cause: &str) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        match rebuild_search_index(&self.db).await {
            Ok(n) => debug!("[SearchIndex] rebuilt after {} change, {} sessions", cause, n),
            Err(e) => error!("[SearchIndex] rebuild after {} change failed: {:#}", cause, e),
        }
    }
}

#[async_trait]
impl ChangeListener for SearchIndexUpdater {
    async fn on_data_changed(&self, path: &str) {
        if Self::affects_index(path) {
            self.rebuild(path).await;
        }
    }

    async fn on_batch_committed(&self, paths: &[&str]) {
        let relevant: Vec<&str> = paths.iter().copied().filter(|p| Self::affects_index(p)).collect();
        if !relevant.is_empty() {
            self.rebuild(&relevant.join("+")).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::batch::{ConferenceDataImporter, ImportMode};
    use crate::conf::db::memory_pool;
    use crate::conf::parser::ParserConfig;
    use crate::conf::store::dao::{ApplyOrigin, ScheduleStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn speakers_and_sessions_in_one_batch_rebuild_once() {
        let pool = memory_pool().await;
        let updater = Arc::new(SearchIndexUpdater::new(pool.clone()));
        let store = ScheduleStore::new(pool.clone()).with_listener(updater.clone());

        let mut imp = ConferenceDataImporter::new(ParserConfig::new());
        let body = serde_json::json!({
            "rooms": [{"id": "r1"}],
            "speakers": [{"id": "sp1", "name": "Ada"}],
            "sessions": [{"id": "s1", "title": "Engines", "speakers": ["sp1"]}]
        });
        imp.add_body("conf.json", &body.to_string()).unwrap();
        let (batch, _) = imp.build_batch(&store, ImportMode::Incremental).await.unwrap();
        store.apply(&batch, ApplyOrigin::Sync).await.unwrap();
        assert_eq!(updater.rebuilds(), 1);

        let indexed: String = sqlx::query_scalar("SELECT body FROM search_index WHERE session_id = 's1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(indexed.contains("ada"));

        updater.on_batch_committed(&["rooms", "map"]).await;
        assert_eq!(updater.rebuilds(), 1);
    }
}
