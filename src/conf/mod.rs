pub mod batch;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod serialization;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use types::{EntityKind, Manifest, Table};
