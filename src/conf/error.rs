//! Sync error taxonomy
//!
//! Every failure the pipeline can surface maps onto one variant here, so the
//! orchestrator can decide per variant whether a pass aborts, degrades or retries.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the fetch → parse → diff → apply pipeline
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network unreachable or an HTTP status other than 200 / 304
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Manifest `format` tag does not match the supported version
    #[error("manifest format not supported: expected {expected:?}, got {got:?}")]
    ManifestFormat { expected: String, got: String },

    /// A referenced data file came back without content
    #[error("empty response from {url}")]
    EmptyResponse { url: String },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache io error at {path:?}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure inside the batch transaction; the whole batch was rolled back
    #[error("storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// The store itself is unreachable (I/O, pool closed or exhausted)
    #[error("storage unavailable ({context}): {source}")]
    RemoteIo {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("a sync pass is already running")]
    AlreadyRunning,

    #[error("sync pass cancelled before apply")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, source: serde_json::Error) -> Self {
        SyncError::Parse {
            what: what.into(),
            source,
        }
    }

    /// Classify a sqlx error: connectivity problems become `RemoteIo`,
    /// everything else is a plain `Storage` failure.
    pub fn storage(context: impl Into<String>, source: sqlx::Error) -> Self {
        let context = context.into();
        match source {
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                SyncError::RemoteIo { context, source }
            }
            source => SyncError::Storage { context, source },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }
}

/// `.context(...)`-style helper for sqlx results
pub trait StorageContext<T> {
    fn storage_context(self, context: &str) -> SyncResult<T>;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn storage_context(self, context: &str) -> SyncResult<T> {
        self.map_err(|e| SyncError::storage(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_remote_io() {
        let err = SyncError::storage("apply batch", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SyncError::RemoteIo { .. }));

        let err = SyncError::storage("apply batch", sqlx::Error::RowNotFound);
        assert!(matches!(err, SyncError::Storage { .. }));
    }
}
