//! Orchestrator configuration, state and reports

use crate::conf::batch::ImportStats;
use crate::conf::parser::ParserConfig;
use crate::conf::sync::interval::SyncIntervalPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Bootstrap timestamp used when none is configured; older than any real data set
pub const DEFAULT_BOOTSTRAP_TIMESTAMP: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    NotBootstrapped,
    Bootstrapping,
    Idle,
    Syncing,
    AuthRecovery,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What started a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    AccountChanged,
}

pub struct SyncConfig {
    pub parser: ParserConfig,
    /// Packaged seed data imported once on first run
    pub bootstrap_data_file: Option<PathBuf>,
    /// RFC1123 timestamp of the seed data, becomes the first reference timestamp
    pub bootstrap_timestamp: String,
    pub interval: SyncIntervalPolicy,
}

impl SyncConfig {
    pub fn new(interval: SyncIntervalPolicy) -> Self {
        Self {
            parser: ParserConfig::new(),
            bootstrap_data_file: None,
            bootstrap_timestamp: DEFAULT_BOOTSTRAP_TIMESTAMP.to_string(),
            interval,
        }
    }
}

/// Outcome of the conference data step of a pass
#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceOutcome {
    /// Server answered 304
    Unchanged,
    Updated {
        applied: usize,
        stats: ImportStats,
    },
    /// Cancelled before apply; nothing persisted
    Cancelled,
    Failed(String),
}

impl ConferenceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ConferenceOutcome::Failed(_))
    }
}

/// Outcome of the user-data and feedback steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Auth could not be recovered; retried next pass
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Bootstrap ran during this pass
    pub bootstrapped: bool,
    pub conference: ConferenceOutcome,
    pub user_data: StepOutcome,
    pub feedback: StepOutcome,
    pub consecutive_failures: u32,
    /// Delay before the next scheduled pass
    pub next_delay: Duration,
}
