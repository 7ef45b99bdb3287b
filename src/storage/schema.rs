//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite history backend.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per collected resource, grouped by crawl source id
CREATE TABLE IF NOT EXISTS history (
    source_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    source_url TEXT NOT NULL,
    description TEXT NOT NULL,
    extension TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    PRIMARY KEY (source_id, content_hash)
);

CREATE INDEX IF NOT EXISTS idx_history_source ON history(source_id);
"#;

/// Creates the schema if it does not exist yet
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
