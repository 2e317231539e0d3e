//! Sync orchestrator module

pub mod auth;
pub mod interval;
pub mod models;
pub mod service;

pub use auth::{
    EmptyFeedbackUploader, EmptyTokenRefresher, EmptyUserDataSync, FeedbackUploader,
    TokenRefresher, UserDataSync,
};
pub use interval::SyncIntervalPolicy;
pub use models::{ConferenceOutcome, StepOutcome, SyncConfig, SyncReport, SyncState, SyncTrigger};
pub use service::SyncOrchestrator;
