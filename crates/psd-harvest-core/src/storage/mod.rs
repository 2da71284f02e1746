pub mod json;
pub mod memory;
pub mod models;
mod queries;
pub mod sqlite;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;
pub use models::{ProcessingState, StateCounts};
pub use sqlite::Database;

use crate::error::StateError;
use std::fs;
use std::path::Path;

/// Durable record of dedup mappings and completed paths.
///
/// Every mutating call is flushed before it returns, so an interrupted run
/// loses at most the file that was in flight. A store has exactly one writer.
pub trait StateStore {
    fn is_processed(&self, path: &str) -> Result<bool, StateError>;

    fn lookup_hash(&self, fingerprint: &str) -> Result<Option<String>, StateError>;

    /// Whether the layers for `fingerprint` were fully written at least once.
    fn is_extracted(&self, fingerprint: &str) -> Result<bool, StateError>;

    /// Fingerprint currently owning the output base name, if any.
    fn owner_of(&self, base_name: &str) -> Result<Option<String>, StateError>;

    /// Map `fingerprint` to `base_name` unless it is already mapped.
    fn record_hash(&mut self, fingerprint: &str, base_name: &str) -> Result<(), StateError>;

    fn record_processed(&mut self, path: &str) -> Result<(), StateError>;

    /// Commit a successful extraction in one durable write: mapping (if
    /// absent), extracted marker and processed path.
    fn record_extraction(
        &mut self,
        path: &str,
        fingerprint: &str,
        base_name: &str,
    ) -> Result<(), StateError>;

    fn reset(&mut self) -> Result<(), StateError>;

    fn snapshot(&self) -> Result<ProcessingState, StateError>;

    fn counts(&self) -> Result<StateCounts, StateError> {
        Ok(StateCounts::from(&self.snapshot()?))
    }
}

/// Whether a state file path selects the SQLite backend.
pub fn is_sqlite_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("db" | "sqlite" | "sqlite3")
    )
}

/// Open the state store at `path`, choosing the backend from the extension.
///
/// With `reset` the existing file is discarded without being parsed; otherwise
/// an unreadable file is an error and is left untouched.
pub fn open_state_store(path: &Path, reset: bool) -> Result<Box<dyn StateStore>, StateError> {
    if is_sqlite_path(path) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StateError::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let db = if reset {
            Database::create_empty(path)?
        } else {
            Database::open(path)?
        };
        Ok(Box::new(db))
    } else if reset {
        Ok(Box::new(JsonStateStore::create_empty(path)?))
    } else {
        Ok(Box::new(JsonStateStore::open(path)?))
    }
}
