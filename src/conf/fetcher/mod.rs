//! Content fetcher module
//!
//! Manifest and data file download through a content-addressed cache

pub mod api;
pub mod cache;
pub mod models;
pub mod service;

pub use api::{ContentTransport, HttpTransport};
pub use cache::{CacheStore, DiskCache, MemoryCache};
pub use models::{DataFileBody, FetchedData, FetcherConfig, TransportResponse};
pub use service::ContentFetcher;
