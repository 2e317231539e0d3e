//! HTTP transport for manifest and data file downloads

use crate::conf::error::{SyncError, SyncResult};
use crate::conf::fetcher::models::TransportResponse;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, IF_MODIFIED_SINCE, LAST_MODIFIED, USER_AGENT};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Conditional GET. Any status is returned as-is; only network failures are errors.
#[async_trait]
pub trait ContentTransport: Send + Sync {
    async fn get(&self, url: &str, if_modified_since: Option<&str>) -> SyncResult<TransportResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout_secs: u64) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| SyncError::transport("-", format!("invalid user agent: {}", e)))?,
        );
        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::transport("-", format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentTransport for HttpTransport {
    async fn get(&self, url: &str, if_modified_since: Option<&str>) -> SyncResult<TransportResponse> {
        let operation_id = Uuid::new_v4().to_string();
        info!("[Fetcher/HTTP] GET {}", url);
        debug!(
            "[Fetcher/HTTP]   operationID: {}, If-Modified-Since: {:?}",
            operation_id, if_modified_since
        );

        let mut request = self.client.get(url).header("operationID", &operation_id);
        if let Some(since) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let response = request.send().await.map_err(|e| {
            error!("[Fetcher/HTTP] request to {} failed: {}", url, e);
            SyncError::transport(url, e)
        })?;

        let status = response.status().as_u16();
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(url, format!("failed to read body: {}", e)))?;

        debug!(
            "[Fetcher/HTTP] {} -> {} ({} bytes, Last-Modified: {:?})",
            url,
            status,
            body.len(),
            last_modified
        );
        Ok(TransportResponse {
            status,
            body: body.to_vec(),
            last_modified,
        })
    }
}
