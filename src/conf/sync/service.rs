//! Sync orchestrator
//!
//! Drives bootstrap, the conference data pipeline (fetch, import, apply) and
//! the user-data collaborators. One pass at a time; state is published on a
//! watch channel.

use crate::conf::batch::{ConferenceDataImporter, ImportMode};
use crate::conf::error::{SyncError, SyncResult};
use crate::conf::fetcher::ContentFetcher;
use crate::conf::serialization::now_millis;
use crate::conf::store::metadata::key;
use crate::conf::store::{ApplyOrigin, ScheduleStore, SyncMetadataDao};
use crate::conf::sync::auth::{
    EmptyFeedbackUploader, EmptyTokenRefresher, EmptyUserDataSync, FeedbackUploader,
    TokenRefresher, UserDataSync,
};
use crate::conf::sync::models::{
    ConferenceOutcome, StepOutcome, SyncConfig, SyncReport, SyncState, SyncTrigger,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

pub struct SyncOrchestrator {
    config: SyncConfig,
    fetcher: ContentFetcher,
    store: Arc<ScheduleStore>,
    metadata: SyncMetadataDao,
    user_data: Arc<dyn UserDataSync>,
    feedback: Arc<dyn FeedbackUploader>,
    token_refresher: Arc<dyn TokenRefresher>,
    state_tx: watch::Sender<SyncState>,
    /// Held for the duration of a pass
    running: Mutex<()>,
    cancel_requested: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        fetcher: ContentFetcher,
        store: Arc<ScheduleStore>,
        metadata: SyncMetadataDao,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::NotBootstrapped);
        Self {
            config,
            fetcher,
            store,
            metadata,
            user_data: Arc::new(EmptyUserDataSync),
            feedback: Arc::new(EmptyFeedbackUploader),
            token_refresher: Arc::new(EmptyTokenRefresher),
            state_tx,
            running: Mutex::new(()),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn with_user_data(
        mut self,
        user_data: Arc<dyn UserDataSync>,
        token_refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        self.user_data = user_data;
        self.token_refresher = token_refresher;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackUploader>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Publish `Idle` instead of `NotBootstrapped` when a previous run already
    /// bootstrapped the store. The state starts as `NotBootstrapped` until
    /// this or the first pass runs.
    pub async fn restore_state(&self) -> SyncState {
        if self.state() == SyncState::NotBootstrapped && self.bootstrap_done().await {
            self.set_state(SyncState::Idle);
        }
        self.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Abandon the conference data batch of the running (or next) pass before it is applied
    pub fn request_cancel(&self) {
        info!("[Sync] cancellation requested");
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: SyncState) {
        self.state_tx.send_replace(state);
    }

    /// Run one full pass. Fails only with `AlreadyRunning`; step failures are
    /// reported in the returned [`SyncReport`].
    pub async fn sync(&self, trigger: SyncTrigger) -> SyncResult<SyncReport> {
        let _pass = self.running.try_lock().map_err(|_| {
            warn!("[Sync] {:?} sync requested while a pass is running", trigger);
            SyncError::AlreadyRunning
        })?;
        info!("[Sync] ===== sync pass started ({:?}) =====", trigger);

        let bootstrapped = if self.bootstrap_done().await {
            false
        } else {
            self.bootstrap().await;
            true
        };

        self.set_state(SyncState::Syncing);
        let started = now_millis();
        self.record(key::LAST_ATTEMPT_MILLIS, started).await;

        let conference = match self.sync_conference_data().await {
            Ok(outcome) => outcome,
            Err(SyncError::Cancelled) => {
                info!("[Sync] conference data batch abandoned before apply");
                ConferenceOutcome::Cancelled
            }
            Err(e) => {
                error!("[Sync] conference data sync failed: {}", e);
                ConferenceOutcome::Failed(e.to_string())
            }
        };
        self.cancel_requested.store(false, Ordering::SeqCst);

        let previous_failures = self.metadata.consecutive_failures().await.unwrap_or(0);
        let consecutive_failures = match &conference {
            ConferenceOutcome::Failed(_) => previous_failures.saturating_add(1),
            ConferenceOutcome::Cancelled => previous_failures,
            ConferenceOutcome::Unchanged | ConferenceOutcome::Updated { .. } => {
                self.record(key::LAST_SUCCESS_MILLIS, now_millis()).await;
                0
            }
        };
        self.record(key::CONSECUTIVE_FAILURES, consecutive_failures as i64)
            .await;

        let user_data = self.sync_user_data().await;
        let feedback = match self.feedback.upload_pending().await {
            Ok(n) => {
                if n > 0 {
                    info!("[Sync] uploaded {} feedback item(s)", n);
                }
                StepOutcome::Done
            }
            Err(e) => {
                warn!("[Sync] feedback upload failed: {}", e);
                StepOutcome::Failed(e.to_string())
            }
        };

        let next_delay = self
            .config
            .interval
            .next_delay(now_millis(), consecutive_failures);
        self.record(key::SYNC_INTERVAL_MILLIS, next_delay.as_millis() as i64)
            .await;
        self.set_state(SyncState::Idle);

        info!(
            "[Sync] ===== sync pass finished in {} ms, next in {:?} =====",
            now_millis() - started,
            next_delay
        );
        Ok(SyncReport {
            trigger,
            bootstrapped,
            conference,
            user_data,
            feedback,
            consecutive_failures,
            next_delay,
        })
    }

    /// Loop scheduled passes until `shutdown` turns true
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        info!("[Sync] periodic sync started");
        while !*shutdown.borrow() {
            let delay = match self.sync(SyncTrigger::Scheduled).await {
                Ok(report) => report.next_delay,
                Err(e) => {
                    warn!("[Sync] scheduled pass skipped: {}", e);
                    self.config.interval.interval_at(now_millis())
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("[Sync] periodic sync stopped");
    }

    async fn bootstrap_done(&self) -> bool {
        match self.metadata.is_bootstrap_done().await {
            Ok(done) => done,
            Err(e) => {
                warn!("[Sync] cannot read bootstrap flag, assuming not done: {}", e);
                false
            }
        }
    }

    /// Import the packaged seed data in full mode. Failures still mark bootstrap done.
    async fn bootstrap(&self) {
        self.set_state(SyncState::Bootstrapping);
        match self.import_seed_data().await {
            Ok(applied) => info!("[Sync/Bootstrap] seed data imported, {} mutations", applied),
            Err(e) => error!(
                "[Sync/Bootstrap] seed import failed, marking bootstrap done anyway: {}",
                e
            ),
        }
        if let Err(e) = self.metadata.mark_bootstrap_done().await {
            error!("[Sync/Bootstrap] could not persist bootstrap flag: {}", e);
        }
        self.set_state(SyncState::Idle);
    }

    async fn import_seed_data(&self) -> SyncResult<usize> {
        let Some(path) = &self.config.bootstrap_data_file else {
            info!("[Sync/Bootstrap] no seed data configured");
            return Ok(0);
        };
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SyncError::Cache {
                path: path.clone(),
                source,
            })?;

        let mut importer = ConferenceDataImporter::new(self.config.parser.clone());
        importer.add_body(&path.to_string_lossy(), &body)?;
        let (batch, _) = importer
            .build_batch(self.store.as_ref(), ImportMode::Full)
            .await?;
        let applied = self.store.apply(&batch, ApplyOrigin::Sync).await?;
        self.metadata
            .set_last_data_timestamp(&self.config.bootstrap_timestamp)
            .await?;
        Ok(applied)
    }

    async fn sync_conference_data(&self) -> SyncResult<ConferenceOutcome> {
        let reference = self.metadata.last_data_timestamp().await?;
        let Some(fetched) = self.fetcher.fetch_if_newer(reference.as_deref()).await? else {
            info!("[Sync] conference data unchanged");
            return Ok(ConferenceOutcome::Unchanged);
        };

        let mut importer = ConferenceDataImporter::new(self.config.parser.clone());
        for file in &fetched.bodies {
            importer.add_body(&file.url, &file.body)?;
        }
        let (batch, stats) = importer
            .build_batch(self.store.as_ref(), ImportMode::Incremental)
            .await?;

        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        let applied = self.store.apply(&batch, ApplyOrigin::Sync).await?;

        match &fetched.server_timestamp {
            Some(ts) => self.metadata.set_last_data_timestamp(ts).await?,
            None => warn!("[Sync] server sent no usable timestamp, next fetch is unconditional"),
        }
        info!("[Sync] conference data applied: {}", stats);
        Ok(ConferenceOutcome::Updated { applied, stats })
    }

    /// User-data step with one token refresh on auth failure
    async fn sync_user_data(&self) -> StepOutcome {
        let first = match self.user_data.sync_user_data().await {
            Ok(()) => return StepOutcome::Done,
            Err(e) => e,
        };
        if !first.is_auth() {
            warn!("[Sync] user data sync failed: {}", first);
            return StepOutcome::Failed(first.to_string());
        }

        self.set_state(SyncState::AuthRecovery);
        warn!("[Sync/Auth] user data sync unauthorized, refreshing token: {}", first);
        let outcome = match self.token_refresher.refresh_token().await {
            Ok(_) => match self.user_data.sync_user_data().await {
                Ok(()) => StepOutcome::Done,
                Err(e) if e.is_auth() => StepOutcome::Skipped(e.to_string()),
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
            Err(e) => {
                warn!("[Sync/Auth] token refresh failed, skipping user data this pass: {}", e);
                StepOutcome::Skipped(e.to_string())
            }
        };
        self.set_state(SyncState::Syncing);
        outcome
    }

    async fn record(&self, key: &str, value: i64) {
        if let Err(e) = self.metadata.set_i64(key, value).await {
            warn!("[Sync] could not record {}: {}", key, e);
        }
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }
}
