//! Content-addressed data file cache

use crate::conf::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Cache of data file bodies keyed by [`cache_key_for_url`](crate::conf::serialization::cache_key_for_url)
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;
    async fn put(&self, key: &str, body: &str) -> SyncResult<()>;
    async fn keys(&self) -> SyncResult<Vec<String>>;
    async fn delete(&self, key: &str) -> SyncResult<()>;
}

/// One file per entry under a directory
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

fn cache_err(path: PathBuf, source: std::io::Error) -> SyncError {
    SyncError::Cache { path, source }
}

#[async_trait]
impl CacheStore for DiskCache {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(cache_err(path, e)),
        }
    }

    async fn put(&self, key: &str, body: &str) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| cache_err(self.dir.clone(), e))?;
        let path = self.path(key);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| cache_err(path.clone(), e))?;
        debug!("[Fetcher/Cache] stored {:?}", path);
        Ok(())
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(cache_err(self.dir.clone(), e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| cache_err(self.dir.clone(), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(cache_err(path, e)),
        }
    }
}

/// In-memory cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // ignore poisoning
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, body: &str) -> SyncResult<()> {
        self.lock().insert(key.to_string(), body.to_string());
        Ok(())
    }

    async fn keys(&self) -> SyncResult<Vec<String>> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_cache_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("data"));

        assert!(cache.keys().await.unwrap().is_empty());
        assert_eq!(cache.get("missing.json").await.unwrap(), None);

        cache.put("a.json", "{}").await.unwrap();
        cache.put("b.json", "[]").await.unwrap();
        std::fs::write(dir.path().join("data").join("notes.txt"), "x").unwrap();

        assert_eq!(cache.get("a.json").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.keys().await.unwrap(), vec!["a.json", "b.json"]);

        cache.delete("a.json").await.unwrap();
        cache.delete("a.json").await.unwrap();
        assert_eq!(cache.keys().await.unwrap(), vec!["b.json"]);
    }
}
