//! Storage module for the download history
//!
//! This module remembers which resources were already collected, so that each
//! one is downloaded at most once across crawl runs:
//! - `HistoryStore`: the shared, lock-protected mapping used during a crawl
//! - `HistoryBackend`: where that mapping is persisted between runs
//! - JSON snapshot file and SQLite implementations of the backend

mod history;
mod json;
mod schema;
mod sqlite;
mod traits;

pub use history::{Claim, HistoryStore, MemoryBackend};
pub use json::JsonFileBackend;
pub use sqlite::SqliteBackend;
pub use traits::{check_source_id, HistoryBackend, StoreError, StoreResult};

use crate::config::{BackendKind, HistoryConfig};
use std::path::Path;

/// Opens the backend selected by the configuration
///
/// # Arguments
///
/// * `config` - The history section of the crawler configuration
///
/// # Returns
///
/// * `Ok(Box<dyn HistoryBackend>)` - Ready-to-use backend
/// * `Err(StoreError)` - Failed to open the backing database
pub fn open_backend(config: &HistoryConfig) -> StoreResult<Box<dyn HistoryBackend>> {
    let path = Path::new(&config.path);
    Ok(match config.backend {
        BackendKind::Json => Box::new(JsonFileBackend::new(path)),
        BackendKind::Sqlite => Box::new(SqliteBackend::new(path)?),
    })
}

/// Opens the configured backend and loads the configured snapshot
pub fn open_history(config: &HistoryConfig) -> StoreResult<HistoryStore> {
    let backend = open_backend(config)?;
    HistoryStore::load(backend, &config.source_id)
}
