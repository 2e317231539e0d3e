//! User-data collaborators and token refresh
//!
//! Schedule sync and feedback upload live outside the core; the orchestrator
//! only drives them and recovers from auth failures on their behalf.

use crate::conf::error::{SyncError, SyncResult};
use async_trait::async_trait;

/// Obtains a fresh access token after an auth failure
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_token(&self) -> SyncResult<String>;
}

/// Bidirectional sync of the attendee's schedule; `SyncError::Auth` triggers recovery
#[async_trait]
pub trait UserDataSync: Send + Sync {
    async fn sync_user_data(&self) -> SyncResult<()>;
}

/// Upload of queued session feedback; returns the number of items sent
#[async_trait]
pub trait FeedbackUploader: Send + Sync {
    async fn upload_pending(&self) -> SyncResult<usize>;
}

/// No signed-in account: nothing to sync
pub struct EmptyUserDataSync;

#[async_trait]
impl UserDataSync for EmptyUserDataSync {
    async fn sync_user_data(&self) -> SyncResult<()> {
        Ok(())
    }
}

pub struct EmptyFeedbackUploader;

#[async_trait]
impl FeedbackUploader for EmptyFeedbackUploader {
    async fn upload_pending(&self) -> SyncResult<usize> {
        Ok(0)
    }
}

pub struct EmptyTokenRefresher;

#[async_trait]
impl TokenRefresher for EmptyTokenRefresher {
    async fn refresh_token(&self) -> SyncResult<String> {
        Err(SyncError::Auth("no account configured".to_string()))
    }
}
