//! Content fetcher
//!
//! Manifest-driven, conditional download of the conference data files through
//! the content-addressed cache. Unreferenced cache entries are purged at the
//! end of every successful cycle.

use crate::conf::error::{SyncError, SyncResult};
use crate::conf::fetcher::api::{ContentTransport, HttpTransport};
use crate::conf::fetcher::cache::{CacheStore, DiskCache};
use crate::conf::fetcher::models::{DataFileBody, FetchedData, FetcherConfig, TransportResponse};
use crate::conf::serialization::{cache_key_for_url, decode_body, normalize_http_date};
use crate::conf::types::Manifest;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ContentFetcher {
    config: FetcherConfig,
    transport: Arc<dyn ContentTransport>,
    cache: Arc<dyn CacheStore>,
}

impl ContentFetcher {
    /// HTTP transport and on-disk cache from the config
    pub fn new(config: FetcherConfig) -> SyncResult<Self> {
        let transport = HttpTransport::new(&config.user_agent, config.request_timeout_secs)?;
        let cache = DiskCache::new(config.cache_dir.clone());
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(cache)))
    }

    pub fn with_parts(
        config: FetcherConfig,
        transport: Arc<dyn ContentTransport>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
        }
    }

    /// Fetch the manifest and its data files if the server has anything newer
    /// than `reference_timestamp`.
    ///
    /// `Ok(None)` means the server answered 304 Not Modified.
    pub async fn fetch_if_newer(
        &self,
        reference_timestamp: Option<&str>,
    ) -> SyncResult<Option<FetchedData>> {
        let manifest_url = self.manifest_url().await;
        let since = reference_timestamp.and_then(|ts| {
            let normalized = normalize_http_date(ts);
            if normalized.is_none() {
                warn!(
                    "[Fetcher] malformed reference timestamp {:?}, fetching unconditionally",
                    ts
                );
            }
            normalized
        });

        info!("[Fetcher] checking manifest {} (since {:?})", manifest_url, since);
        let response = self.transport.get(&manifest_url, since.as_deref()).await?;
        match response.status {
            304 => {
                info!("[Fetcher] manifest not modified");
                return Ok(None);
            }
            200 => {}
            status => {
                return Err(SyncError::transport(
                    manifest_url,
                    format!("unexpected HTTP status {}", status),
                ))
            }
        }

        let server_timestamp = response.last_modified.as_deref().and_then(|lm| {
            let normalized = normalize_http_date(lm);
            if normalized.is_none() {
                warn!("[Fetcher] ignoring malformed Last-Modified {:?}", lm);
            }
            normalized
        });
        let manifest = self.parse_manifest(&manifest_url, &response)?;
        info!(
            "[Fetcher] manifest lists {} data file(s), server timestamp {:?}",
            manifest.data_files.len(),
            server_timestamp
        );

        let mut used = HashSet::new();
        let mut bodies = Vec::with_capacity(manifest.data_files.len());
        for file in &manifest.data_files {
            let url = resolve_url(&manifest_url, file);
            bodies.push(self.fetch_file(&url, &mut used).await?);
        }
        self.purge_unused(&used).await;

        Ok(Some(FetchedData {
            bodies,
            server_timestamp,
        }))
    }

    /// Configured manifest URL, unless the override file says otherwise
    async fn manifest_url(&self) -> String {
        if let Some(path) = &self.config.manifest_override_file {
            match tokio::fs::read_to_string(path).await {
                Ok(content) if !content.trim().is_empty() => {
                    let url = content.trim().to_string();
                    warn!("[Fetcher] manifest URL overridden by {:?}: {}", path, url);
                    return url;
                }
                Ok(_) => {}
                Err(e) => debug!("[Fetcher] no manifest override at {:?}: {}", path, e),
            }
        }
        self.config.manifest_url.clone()
    }

    fn parse_manifest(&self, url: &str, response: &TransportResponse) -> SyncResult<Manifest> {
        let text = decode_body(&response.body)
            .map_err(|e| SyncError::transport(url, format!("undecodable manifest body: {}", e)))?;
        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| SyncError::parse("manifest", e))?;
        if manifest.format != self.config.expected_format {
            return Err(SyncError::ManifestFormat {
                expected: self.config.expected_format.clone(),
                got: manifest.format,
            });
        }
        Ok(manifest)
    }

    async fn fetch_file(&self, url: &str, used: &mut HashSet<String>) -> SyncResult<DataFileBody> {
        let key = cache_key_for_url(url);
        used.insert(key.clone());

        match self.cache.get(&key).await {
            Ok(Some(body)) => {
                debug!("[Fetcher/Cache] hit {} for {}", key, url);
                return Ok(DataFileBody {
                    url: url.to_string(),
                    body,
                    from_cache: true,
                });
            }
            Ok(None) => debug!("[Fetcher/Cache] miss {} for {}", key, url),
            Err(e) => warn!("[Fetcher/Cache] read of {} failed, treating as miss: {}", key, e),
        }

        let response = self.transport.get(url, None).await?;
        if response.status != 200 {
            return Err(SyncError::transport(
                url,
                format!("unexpected HTTP status {}", response.status),
            ));
        }
        let body = decode_body(&response.body)
            .map_err(|e| SyncError::transport(url, format!("undecodable body: {}", e)))?;
        if body.trim().is_empty() {
            return Err(SyncError::EmptyResponse {
                url: url.to_string(),
            });
        }

        if let Err(e) = self.cache.put(&key, &body).await {
            warn!("[Fetcher/Cache] could not store {}: {}", key, e);
        }
        Ok(DataFileBody {
            url: url.to_string(),
            body,
            from_cache: false,
        })
    }

    async fn purge_unused(&self, used: &HashSet<String>) {
        let keys = match self.cache.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("[Fetcher/Cache] could not list cache entries: {}", e);
                return;
            }
        };
        for key in keys.into_iter().filter(|k| !used.contains(k)) {
            match self.cache.delete(&key).await {
                Ok(()) => debug!("[Fetcher/Cache] purged unreferenced {}", key),
                Err(e) => warn!("[Fetcher/Cache] could not purge {}: {}", key, e),
            }
        }
    }
}

/// Resolve a data file reference against the manifest URL
fn resolve_url(manifest_url: &str, file: &str) -> String {
    let file = file.trim();
    if Url::parse(file).is_ok() {
        return file.to_string();
    }
    match Url::parse(manifest_url).and_then(|base| base.join(file)) {
        Ok(url) => url.to_string(),
        Err(_) => file.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conf::fetcher::cache::MemoryCache;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) const MANIFEST: &str = "https://conf.example/manifest.json";

    /// Scripted transport counting requests per URL
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub responses: Mutex<HashMap<String, TransportResponse>>,
        pub calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeTransport {
        pub(crate) fn serve(&self, url: &str, response: TransportResponse) {
            self.responses.lock().unwrap().insert(url.to_string(), response);
        }

        pub(crate) fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
        }

        pub(crate) fn manifest(&self, files: &[&str], last_modified: Option<&str>) {
            let body = serde_json::json!({"format": "iosched-json-v1", "data_files": files});
            self.serve(
                MANIFEST,
                TransportResponse {
                    status: 200,
                    body: body.to_string().into_bytes(),
                    last_modified: last_modified.map(str::to_string),
                },
            );
        }
    }

    #[async_trait]
    impl ContentTransport for FakeTransport {
        async fn get(&self, url: &str, since: Option<&str>) -> SyncResult<TransportResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), since.map(str::to_string)));
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| SyncError::transport(url, "connection refused"))
        }
    }

    fn fetcher(transport: Arc<FakeTransport>, cache: Arc<dyn CacheStore>) -> ContentFetcher {
        ContentFetcher::with_parts(FetcherConfig::new(MANIFEST, "unused"), transport, cache)
    }

    #[tokio::test]
    async fn cached_files_are_not_downloaded_again() {
        let transport = Arc::new(FakeTransport::default());
        transport.manifest(&["data/a.json"], Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        transport.serve("https://conf.example/data/a.json", TransportResponse::ok(r#"{"rooms":[]}"#));
        let f = fetcher(transport.clone(), Arc::new(MemoryCache::new()));

        let first = f.fetch_if_newer(None).await.unwrap().unwrap();
        assert_eq!(first.server_timestamp.as_deref(), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert!(!first.bodies[0].from_cache);

        let second = f.fetch_if_newer(None).await.unwrap().unwrap();
        assert!(second.bodies[0].from_cache);
        assert_eq!(transport.calls_to("https://conf.example/data/a.json"), 1);
        assert_eq!(transport.calls_to(MANIFEST), 2);
    }

    /// Cache whose reads always fail; writes go to the inner store
    #[derive(Default)]
    struct UnreadableCache {
        inner: MemoryCache,
    }

    #[async_trait]
    impl CacheStore for UnreadableCache {
        async fn get(&self, key: &str) -> SyncResult<Option<String>> {
            Err(SyncError::Cache {
                path: std::path::PathBuf::from(key),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }
        async fn put(&self, key: &str, body: &str) -> SyncResult<()> {
            self.inner.put(key, body).await
        }
        async fn keys(&self) -> SyncResult<Vec<String>> {
            self.inner.keys().await
        }
        async fn delete(&self, key: &str) -> SyncResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn cache_read_error_falls_back_to_download() {
        let data = "https://conf.example/data/a.json";
        let transport = Arc::new(FakeTransport::default());
        transport.manifest(&["data/a.json"], None);
        transport.serve(data, TransportResponse::ok(r#"{"rooms":[]}"#));
        let cache = Arc::new(UnreadableCache::default());
        let f = fetcher(transport.clone(), cache.clone());

        let fetched = f.fetch_if_newer(None).await.unwrap().unwrap();
        assert_eq!(fetched.bodies[0].body, r#"{"rooms":[]}"#);
        assert!(!fetched.bodies[0].from_cache);
        assert_eq!(transport.calls_to(data), 1);

        let key = cache_key_for_url(data);
        assert_eq!(cache.inner.get(&key).await.unwrap().as_deref(), Some(r#"{"rooms":[]}"#));

        // still unreadable on the next cycle, so it is downloaded again
        f.fetch_if_newer(None).await.unwrap();
        assert_eq!(transport.calls_to(data), 2);
    }

    #[tokio::test]
    async fn unreferenced_entries_are_purged() {
        let transport = Arc::new(FakeTransport::default());
        let cache = Arc::new(MemoryCache::new());
        transport.serve("https://conf.example/a.json", TransportResponse::ok("{}"));
        transport.serve("https://conf.example/b.json", TransportResponse::ok("{}"));
        let f = fetcher(transport.clone(), cache.clone());

        transport.manifest(&["a.json", "b.json"], None);
        f.fetch_if_newer(None).await.unwrap();
        assert_eq!(cache.keys().await.unwrap().len(), 2);

        transport.manifest(&["b.json"], None);
        f.fetch_if_newer(None).await.unwrap();
        assert_eq!(
            cache.keys().await.unwrap(),
            vec![cache_key_for_url("https://conf.example/b.json")]
        );
    }

    #[tokio::test]
    async fn not_modified_returns_none_and_malformed_timestamp_is_not_sent() {
        let transport = Arc::new(FakeTransport::default());
        transport.serve(MANIFEST, TransportResponse::not_modified());
        let f = fetcher(transport.clone(), Arc::new(MemoryCache::new()));

        assert!(f
            .fetch_if_newer(Some("Sun, 06 Nov 1994 08:49:37 GMT"))
            .await
            .unwrap()
            .is_none());
        assert!(f.fetch_if_newer(Some("last tuesday")).await.unwrap().is_none());

        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls[0].1.as_deref(), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(calls[1].1, None);
    }

    #[tokio::test]
    async fn wrong_format_and_empty_files_are_rejected() {
        let transport = Arc::new(FakeTransport::default());
        transport.serve(
            MANIFEST,
            TransportResponse::ok(r#"{"format": "iosched-json-v2", "data_files": []}"#),
        );
        let f = fetcher(transport.clone(), Arc::new(MemoryCache::new()));
        assert!(matches!(
            f.fetch_if_newer(None).await,
            Err(SyncError::ManifestFormat { .. })
        ));

        transport.manifest(&["empty.json"], None);
        transport.serve("https://conf.example/empty.json", TransportResponse::ok(""));
        assert!(matches!(
            f.fetch_if_newer(None).await,
            Err(SyncError::EmptyResponse { .. })
        ));

        transport.serve(
            MANIFEST,
            TransportResponse {
                status: 500,
                body: Vec::new(),
                last_modified: None,
            },
        );
        assert!(matches!(
            f.fetch_if_newer(None).await,
            Err(SyncError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn override_file_replaces_manifest_url() {
        let dir = tempfile::tempdir().unwrap();
        let override_path = dir.path().join("manifest_override");
        std::fs::write(&override_path, "  https://staging.example/manifest.json\n").unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.serve(
            "https://staging.example/manifest.json",
            TransportResponse::not_modified(),
        );
        let mut config = FetcherConfig::new(MANIFEST, dir.path());
        config.manifest_override_file = Some(override_path);
        let f = ContentFetcher::with_parts(config, transport.clone(), Arc::new(MemoryCache::new()));

        assert!(f.fetch_if_newer(None).await.unwrap().is_none());
        assert_eq!(transport.calls_to(MANIFEST), 0);
    }

    #[test]
    fn relative_urls_resolve_against_manifest() {
        assert_eq!(
            resolve_url("https://conf.example/v1/manifest.json", "data/s.json"),
            "https://conf.example/v1/data/s.json"
        );
        assert_eq!(
            resolve_url("https://conf.example/v1/manifest.json", "https://cdn.example/x.json"),
            "https://cdn.example/x.json"
        );
    }
}
