//! Sync bookkeeping stored in `sync_metadata`; written only by the orchestrator

use crate::conf::error::{StorageContext, SyncResult};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

pub mod key {
    /// RFC1123 timestamp of the data set last applied
    pub const LAST_DATA_TIMESTAMP: &str = "last_data_timestamp";
    pub const BOOTSTRAP_DONE: &str = "bootstrap_done";
    pub const LAST_ATTEMPT_MILLIS: &str = "last_attempt_millis";
    pub const LAST_SUCCESS_MILLIS: &str = "last_success_millis";
    pub const SYNC_INTERVAL_MILLIS: &str = "sync_interval_millis";
    pub const CONSECUTIVE_FAILURES: &str = "consecutive_failures";
}

pub struct SyncMetadataDao {
    db: Pool<Sqlite>,
}

impl SyncMetadataDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .storage_context(&format!("read metadata {}", key))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await
        .storage_context(&format!("write metadata {}", key))?;
        debug!("[SyncMetadata] {} = {}", key, value);
        Ok(())
    }

    pub async fn get_i64(&self, key: &str) -> SyncResult<Option<i64>> {
        Ok(self.get(key).await?.and_then(|v| v.parse().ok()))
    }

    pub async fn set_i64(&self, key: &str, value: i64) -> SyncResult<()> {
        self.set(key, &value.to_string()).await
    }

    pub async fn last_data_timestamp(&self) -> SyncResult<Option<String>> {
        Ok(self
            .get(key::LAST_DATA_TIMESTAMP)
            .await?
            .filter(|v| !v.trim().is_empty()))
    }

    pub async fn set_last_data_timestamp(&self, timestamp: &str) -> SyncResult<()> {
        self.set(key::LAST_DATA_TIMESTAMP, timestamp).await
    }

    pub async fn is_bootstrap_done(&self) -> SyncResult<bool> {
        Ok(self.get(key::BOOTSTRAP_DONE).await?.as_deref() == Some("1"))
    }

    pub async fn mark_bootstrap_done(&self) -> SyncResult<()> {
        self.set(key::BOOTSTRAP_DONE, "1").await
    }

    pub async fn consecutive_failures(&self) -> SyncResult<u32> {
        Ok(self
            .get_i64(key::CONSECUTIVE_FAILURES)
            .await?
            .map(|v| v.max(0) as u32)
            .unwrap_or(0))
    }
}
