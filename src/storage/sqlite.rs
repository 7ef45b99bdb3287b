//! SQLite history backend
//!
//! This module provides a SQLite-based implementation of the HistoryBackend trait.

use crate::site::ResourceInfo;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{check_entries, HistoryBackend, StoreResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite history backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteBackend)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn new(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, source_id: &str) -> StoreResult<HashMap<String, ResourceInfo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT content_hash, source_url, description, extension
             FROM history WHERE source_id = ?1",
        )?;

        let rows = stmt.query_map(params![source_id], |row| {
            Ok(ResourceInfo {
                content_hash: row.get(0)?,
                source_url: row.get(1)?,
                description: row.get(2)?,
                extension: row.get(3)?,
            })
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let info = row?;
            entries.insert(info.content_hash.clone(), info);
        }

        check_entries(source_id, &entries)?;
        Ok(entries)
    }

    fn save(&self, source_id: &str, entries: &HashMap<String, ResourceInfo>) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute("DELETE FROM history WHERE source_id = ?1", params![source_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO history
                 (source_id, content_hash, source_url, description, extension, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for info in entries.values() {
                insert.execute(params![
                    source_id,
                    info.content_hash,
                    info.source_url,
                    info.description,
                    info.extension,
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
