pub mod conf;

// common entry points
pub use conf::{
    batch::{ConferenceDataImporter, ImportMode, MutationBatch},
    db::create_sqlite_pool_with_migration,
    fetcher::{ContentFetcher, FetcherConfig},
    store::{ApplyOrigin, ScheduleQueries, ScheduleStore, SearchIndexUpdater, SyncMetadataDao},
    sync::{SyncConfig, SyncIntervalPolicy, SyncOrchestrator, SyncTrigger},
    SyncError, SyncResult,
};
