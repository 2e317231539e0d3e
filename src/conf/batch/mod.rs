//! Diff & batch builder
//!
//! Turns parsed records into one ordered [`MutationBatch`]; never touches the
//! network or the database directly.

pub mod diff;
pub mod importer;
pub mod mutation;

pub use diff::{FingerprintIndex, ImportStats, TableDiff, TableStats};
pub use importer::{ConferenceDataImporter, FingerprintSource, ImportMode};
pub use mutation::{EntityRow, Mutation, MutationBatch};
