//! Local conference store
//!
//! sqlx applier and metadata DAO on the write side, sea-orm entities on the
//! read side, both over the same SQLite pool.

pub mod dao;
pub mod entities;
pub mod listener;
pub mod metadata;
pub mod queries;

pub use dao::{AppliedCount, ApplyOrigin, ScheduleStore};
pub use listener::{ChangeListener, EmptyChangeListener, SearchIndexUpdater};
pub use metadata::SyncMetadataDao;
pub use queries::{rebuild_search_index, ScheduleQueries};
