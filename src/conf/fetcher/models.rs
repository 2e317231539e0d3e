//! Fetcher configuration and results

use crate::conf::types::MANIFEST_FORMAT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Content fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// URL of the manifest listing the current data files
    pub manifest_url: String,
    /// `format` value the manifest must carry
    pub expected_format: String,
    /// Directory of the content-addressed data file cache
    pub cache_dir: PathBuf,
    /// Local file whose content, when present, replaces `manifest_url`
    pub manifest_override_file: Option<PathBuf>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl FetcherConfig {
    pub fn new(manifest_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            expected_format: MANIFEST_FORMAT.to_string(),
            cache_dir: cache_dir.into(),
            manifest_override_file: None,
            user_agent: format!("conference-sdk-core-rust/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

/// One downloaded (or cached) data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileBody {
    /// Absolute URL of the file
    pub url: String,
    pub body: String,
    pub from_cache: bool,
}

/// Result of a fetch cycle that found newer data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedData {
    pub bodies: Vec<DataFileBody>,
    /// RFC1123 `Last-Modified` of the manifest, when the server sent a valid one
    pub server_timestamp: Option<String>,
}

/// Raw transport response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            last_modified: None,
        }
    }

    pub fn not_modified() -> Self {
        Self {
            status: 304,
            body: Vec::new(),
            last_modified: None,
        }
    }
}
