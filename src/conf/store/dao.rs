//! Transactional applier
//!
//! The only writer of entity tables and their fingerprints. A batch is applied
//! inside one sqlx transaction; listeners hear about it only after commit.

use crate::conf::batch::{EntityRow, FingerprintIndex, FingerprintSource, Mutation, MutationBatch};
use crate::conf::error::{StorageContext, SyncError, SyncResult};
use crate::conf::store::listener::ChangeListener;
use crate::conf::types::{LinkTable, Table};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of mutations written by one apply
pub type AppliedCount = usize;

/// Who asked for the write; decides the notification granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOrigin {
    /// Bulk sync batch: one notification per entity path after commit
    Sync,
    /// Direct caller write: one notification per mutation
    Caller,
}

/// Column value of an entity row
enum SqlValue<'a> {
    Text(&'a str),
    Owned(String),
    Int(i64),
    Real(f64),
}

pub struct ScheduleStore {
    db: Pool<Sqlite>,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl ScheduleStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    /// Apply a batch atomically. Any failing mutation rolls back the whole batch.
    pub async fn apply(&self, batch: &MutationBatch, origin: ApplyOrigin) -> SyncResult<AppliedCount> {
        if batch.is_empty() {
            debug!("[StoreDAO] empty batch, nothing to apply");
            return Ok(0);
        }

        let mut tx = self.db.begin().await.storage_context("begin batch transaction")?;
        for (idx, mutation) in batch.iter().enumerate() {
            // dropping `tx` on the error path rolls the transaction back
            if let Err(e) = execute(&mut tx, mutation).await {
                warn!(
                    "[StoreDAO/DB] mutation #{} of {} failed, rolling back: {:?}",
                    idx,
                    batch.len(),
                    mutation
                );
                return Err(e);
            }
        }
        tx.commit().await.storage_context("commit batch transaction")?;
        info!("[StoreDAO/DB] committed {} mutations ({:?})", batch.len(), origin);

        match origin {
            ApplyOrigin::Sync => {
                let paths: Vec<&str> = batch.kinds_touched().into_iter().map(|k| k.path()).collect();
                for listener in &self.listeners {
                    listener.on_batch_committed(&paths).await;
                }
            }
            ApplyOrigin::Caller => {
                for mutation in batch {
                    self.notify(mutation.kind().path()).await;
                }
            }
        }
        Ok(batch.len())
    }

    /// Persisted `id -> import_hash` of one table
    pub async fn previous_fingerprints(&self, table: Table) -> SyncResult<FingerprintIndex> {
        let sql = format!("SELECT id, import_hash FROM {}", table.name());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .storage_context(&format!("read fingerprints of {}", table))?;

        let index: FingerprintIndex = rows
            .into_iter()
            .map(|r| (r.get::<String, _>("id"), r.get::<String, _>("import_hash")))
            .collect();
        debug!("[StoreDAO] {} fingerprints indexed for {}", index.len(), table);
        Ok(index)
    }

    pub(crate) async fn notify(&self, path: &str) {
        for listener in &self.listeners {
            listener.on_data_changed(path).await;
        }
    }
}

#[async_trait]
impl FingerprintSource for ScheduleStore {
    async fn previous_fingerprints(&self, table: Table) -> SyncResult<FingerprintIndex> {
        ScheduleStore::previous_fingerprints(self, table).await
    }
}

async fn execute(conn: &mut SqliteConnection, mutation: &Mutation) -> SyncResult<()> {
    match mutation {
        Mutation::DeleteAll { table } => {
            sqlx::query(&format!("DELETE FROM {}", table.name()))
                .execute(&mut *conn)
                .await
                .storage_context(&format!("delete all {}", table))?;
        }
        Mutation::DeleteById { table, id } => {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table.name()))
                .bind(id)
                .execute(&mut *conn)
                .await
                .storage_context(&format!("delete {} {}", table, id))?;
        }
        Mutation::Insert(row) => {
            let columns = row_columns(row);
            let names: Vec<&str> = columns.iter().map(|(n, _)| *n).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                row.table().name(),
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            );
            let mut query = sqlx::query(&sql);
            for (_, value) in columns {
                query = bind_value(query, value);
            }
            query
                .execute(&mut *conn)
                .await
                .storage_context(&format!("insert {} {}", row.table(), row.id()))?;
        }
        Mutation::Update(row) => {
            let columns = row_columns(row);
            let assignments: Vec<String> = columns
                .iter()
                .filter(|(n, _)| *n != "id")
                .map(|(n, _)| format!("{} = ?", n))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                row.table().name(),
                assignments.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for (name, value) in columns {
                if name != "id" {
                    query = bind_value(query, value);
                }
            }
            let result = query
                .bind(row.id())
                .execute(&mut *conn)
                .await
                .storage_context(&format!("update {} {}", row.table(), row.id()))?;
            if result.rows_affected() == 0 {
                return Err(SyncError::storage(
                    format!("update {} {}: row missing", row.table(), row.id()),
                    sqlx::Error::RowNotFound,
                ));
            }
        }
        Mutation::DeleteAllLinks { link } => {
            sqlx::query(&format!("DELETE FROM {}", link.name()))
                .execute(&mut *conn)
                .await
                .storage_context(&format!("delete all {}", link.name()))?;
        }
        Mutation::DeleteLinks { link, session_id } => {
            sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?", link.name()))
                .bind(session_id)
                .execute(&mut *conn)
                .await
                .storage_context(&format!("delete {} of {}", link.name(), session_id))?;
        }
        Mutation::InsertLink {
            link,
            session_id,
            target_id,
        } => {
            insert_link(conn, *link, session_id, target_id).await?;
        }
    }
    Ok(())
}

async fn insert_link(
    conn: &mut SqliteConnection,
    link: LinkTable,
    session_id: &str,
    target_id: &str,
) -> SyncResult<()> {
    let sql = format!(
        "INSERT INTO {} (session_id, {}) VALUES (?, ?)",
        link.name(),
        link.target_column()
    );
    sqlx::query(&sql)
        .bind(session_id)
        .bind(target_id)
        .execute(&mut *conn)
        .await
        .storage_context(&format!("link {} -> {}", session_id, target_id))?;
    Ok(())
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: SqlValue<'q>,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Owned(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Real(v) => query.bind(v),
    }
}

/// Column/value pairs of a row, `import_hash` included
fn row_columns(row: &EntityRow) -> Vec<(&'static str, SqlValue<'_>)> {
    use SqlValue::*;
    let mut cols = match row {
        EntityRow::Room(r) => vec![("id", Text(&r.id)), ("name", Text(&r.name)), ("floor", Text(&r.floor))],
        EntityRow::Block(b) => vec![
            ("id", Text(&b.id)),
            ("title", Text(&b.title)),
            ("subtitle", Text(&b.subtitle)),
            ("block_type", Text(&b.block_type)),
            ("start_millis", Int(b.start_millis)),
            ("end_millis", Int(b.end_millis)),
        ],
        EntityRow::Tag(t) => vec![
            ("id", Text(&t.id)),
            ("category", Text(&t.category)),
            ("name", Text(&t.name)),
            ("order_in_category", Int(t.order_in_category as i64)),
            ("abstract", Text(&t.abstract_text)),
            ("color", Int(t.color)),
            ("photo_url", Text(&t.photo_url)),
        ],
        EntityRow::Speaker(s) => vec![
            ("id", Text(&s.id)),
            ("name", Text(&s.name)),
            ("bio", Text(&s.bio)),
            ("company", Text(&s.company)),
            ("thumbnail_url", Text(&s.thumbnail_url)),
            ("plusone_url", Text(&s.plusone_url)),
            ("twitter_url", Text(&s.twitter_url)),
        ],
        EntityRow::Session(s) => vec![
            ("id", Text(&s.id)),
            ("title", Text(&s.title)),
            ("description", Text(&s.description)),
            ("url", Text(&s.url)),
            ("start_millis", Int(s.start_millis)),
            ("end_millis", Int(s.end_millis)),
            ("room_id", Text(&s.room_id)),
            ("tags", Owned(s.tags.join(","))),
            ("main_tag", Text(&s.main_tag)),
            ("hashtag", Text(&s.hashtag)),
            ("is_livestream", Int(s.is_livestream as i64)),
            ("youtube_url", Text(&s.youtube_url)),
            ("captions_url", Text(&s.captions_url)),
            ("photo_url", Text(&s.photo_url)),
            ("color", Int(s.color)),
            ("related_content", Text(&s.related_content)),
            ("speaker_names", Text(&s.speaker_names)),
            ("grouping_order", Int(s.grouping_order as i64)),
        ],
        EntityRow::SearchSuggestion(s) => vec![("id", Text(&s.id)), ("text", Text(&s.text))],
        EntityRow::MapMarker(m) => vec![
            ("id", Text(&m.id)),
            ("marker_type", Text(&m.marker_type)),
            ("latitude", Real(m.latitude)),
            ("longitude", Real(m.longitude)),
            ("label", Text(&m.label)),
            ("floor", Text(&m.floor)),
        ],
        EntityRow::MapTile(t) => vec![
            ("id", Text(&t.id)),
            ("floor", Text(&t.floor)),
            ("file_name", Text(&t.file_name)),
            ("url", Text(&t.url)),
        ],
        EntityRow::Hashtag(h) => vec![
            ("id", Text(&h.id)),
            ("name", Text(&h.name)),
            ("description", Text(&h.description)),
            ("color", Int(h.color)),
            ("ordering", Int(h.ordering as i64)),
        ],
        EntityRow::Video(v) => vec![
            ("id", Text(&v.id)),
            ("year", Int(v.year as i64)),
            ("title", Text(&v.title)),
            ("description", Text(&v.description)),
            ("youtube_id", Text(&v.youtube_id)),
            ("speakers", Text(&v.speakers)),
            ("thumbnail_url", Text(&v.thumbnail_url)),
            ("topic", Text(&v.topic)),
        ],
    };
    cols.push(("import_hash", Owned(row.import_hash())));
    cols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::batch::{ConferenceDataImporter, ImportMode};
    use crate::conf::db::memory_pool;
    use crate::conf::parser::{ParserConfig, Room};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChangeListener for RecordingListener {
        async fn on_data_changed(&self, path: &str) {
            self.paths.lock().unwrap().push(path.to_string());
        }
    }

    fn room(id: &str) -> EntityRow {
        EntityRow::Room(Room {
            id: id.into(),
            name: format!("Room {}", id),
            floor: "1".into(),
        })
    }

    async fn count(pool: &Pool<Sqlite>, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
            .get("n")
    }

    async fn import(store: &ScheduleStore, body: serde_json::Value, mode: ImportMode) -> usize {
        let mut imp = ConferenceDataImporter::new(ParserConfig::new());
        imp.add_body("test.json", &body.to_string()).unwrap();
        let (batch, _) = imp.build_batch(store, mode).await.unwrap();
        store.apply(&batch, ApplyOrigin::Sync).await.unwrap()
    }

    #[tokio::test]
    async fn failing_mutation_rolls_back_the_whole_batch() {
        let pool = memory_pool().await;
        let store = ScheduleStore::new(pool.clone());
        let listener = Arc::new(RecordingListener::default());
        let store = store.with_listener(listener.clone());

        let mut seed = MutationBatch::new();
        seed.push(Mutation::Insert(room("existing")));
        store.apply(&seed, ApplyOrigin::Sync).await.unwrap();
        listener.paths.lock().unwrap().clear();

        let mut batch = MutationBatch::new();
        batch.push(Mutation::Insert(room("r1")));
        batch.push(Mutation::Insert(room("r2")));
        // duplicate primary key
        batch.push(Mutation::Insert(room("existing")));
        batch.push(Mutation::Insert(room("r3")));

        let err = store.apply(&batch, ApplyOrigin::Sync).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage { .. }));
        assert_eq!(count(&pool, "rooms").await, 1);
        assert!(listener.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_origin_notifies_once_per_path() {
        let pool = memory_pool().await;
        let listener = Arc::new(RecordingListener::default());
        let store = ScheduleStore::new(pool.clone()).with_listener(listener.clone());

        import(
            &store,
            serde_json::json!({
                "rooms": [{"id": "r1"}, {"id": "r2"}],
                "speakers": [{"id": "sp1", "name": "Ada"}],
                "sessions": [{"id": "s1", "speakers": ["sp1"]}, {"id": "s2"}]
            }),
            ImportMode::Incremental,
        )
        .await;

        assert_eq!(
            *listener.paths.lock().unwrap(),
            vec!["rooms".to_string(), "speakers".into(), "sessions".into()]
        );
        assert_eq!(count(&pool, "session_speakers").await, 1);
    }

    #[tokio::test]
    async fn caller_origin_notifies_per_mutation() {
        let pool = memory_pool().await;
        let listener = Arc::new(RecordingListener::default());
        let store = ScheduleStore::new(pool).with_listener(listener.clone());

        let mut batch = MutationBatch::new();
        batch.push(Mutation::Insert(room("r1")));
        batch.push(Mutation::Insert(room("r2")));
        store.apply(&batch, ApplyOrigin::Caller).await.unwrap();
        assert_eq!(listener.paths.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reapplying_same_data_is_a_no_op() {
        let pool = memory_pool().await;
        let store = ScheduleStore::new(pool.clone());
        let body = serde_json::json!({
            "rooms": [{"id": "r1", "name": "Hall"}],
            "tags": [{"tag": "TOPIC_X", "category": "TOPIC", "name": "X"}],
            "sessions": [{"id": "s1", "room": "r1", "tags": ["TOPIC_X"]}]
        });

        assert!(import(&store, body.clone(), ImportMode::Incremental).await > 0);
        let before = store.previous_fingerprints(Table::Sessions).await.unwrap();
        assert_eq!(import(&store, body, ImportMode::Incremental).await, 0);
        assert_eq!(store.previous_fingerprints(Table::Sessions).await.unwrap(), before);
        assert_eq!(count(&pool, "session_tags").await, 1);
    }

    #[tokio::test]
    async fn empty_kinds_do_not_renotify_on_repeat() {
        let pool = memory_pool().await;
        let listener = Arc::new(RecordingListener::default());
        let store = ScheduleStore::new(pool.clone()).with_listener(listener.clone());
        let body = serde_json::json!({
            "rooms": [{"id": "r1"}],
            "speakers": [],
            "video_library": []
        });

        import(&store, body.clone(), ImportMode::Incremental).await;
        assert_eq!(*listener.paths.lock().unwrap(), vec!["rooms".to_string()]);
        listener.paths.lock().unwrap().clear();

        assert_eq!(import(&store, body, ImportMode::Incremental).await, 0);
        assert!(listener.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = ScheduleStore::new(memory_pool().await);
        let mut batch = MutationBatch::new();
        batch.push(Mutation::Update(room("ghost")));
        let err = store.apply(&batch, ApplyOrigin::Sync).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage { .. }));
    }
}
