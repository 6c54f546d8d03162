//! Storage: the SQLite-backed evidence store and the append-only run log.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{RunRecord, RunStore, StorageError, StorageResult};
