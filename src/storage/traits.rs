//! Storage traits and error types
//!
//! This module defines the trait interface for history backends and
//! associated error types.

use crate::site::ResourceInfo;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("History snapshot '{source_id}' is corrupt: {reason}")]
    Corrupt { source_id: String, reason: String },

    #[error("History store was already flushed")]
    AlreadyFlushed,

    #[error("Invalid source id '{0}'")]
    InvalidSourceId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted snapshot of `content_hash -> ResourceInfo` mappings
///
/// A backend stores one snapshot per crawl source id. It is read once when
/// a crawl starts and written once when it ends; the in-memory bookkeeping
/// in between belongs to [`crate::storage::HistoryStore`].
pub trait HistoryBackend: Send + Sync {
    /// Short backend name for log lines
    fn name(&self) -> &'static str;

    /// Reads the snapshot for `source_id`
    ///
    /// A snapshot that was never written is an empty map, not an error. A
    /// snapshot that exists but cannot be read back is [`StoreError::Corrupt`].
    fn load(&self, source_id: &str) -> StoreResult<HashMap<String, ResourceInfo>>;

    /// Replaces the snapshot for `source_id` with `entries`
    fn save(&self, source_id: &str, entries: &HashMap<String, ResourceInfo>) -> StoreResult<()>;
}

/// Checks that a snapshot's keys agree with the hashes they map to
pub(crate) fn check_entries(
    source_id: &str,
    entries: &HashMap<String, ResourceInfo>,
) -> StoreResult<()> {
    match entries.iter().find(|(hash, info)| **hash != info.content_hash) {
        Some((hash, info)) => Err(StoreError::Corrupt {
            source_id: source_id.to_string(),
            reason: format!("key {hash} holds entry for {}", info.content_hash),
        }),
        None => Ok(()),
    }
}

/// Rejects source ids that cannot be used as a file stem
pub fn check_source_id(source_id: &str) -> StoreResult<()> {
    let valid = !source_id.is_empty()
        && source_id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !source_id.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSourceId(source_id.to_string()))
    }
}
