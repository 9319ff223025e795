//! SQL DDL for the scan history log.
//!
//! One append-only `scan_history` table, indexed for the original-source walk
//! (`file_id`, `destination_file`) and for date-range queries. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scan_history (
    scan_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    source_file TEXT NOT NULL,
    destination_file TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (scan_id, source_file, destination_file)
);

CREATE INDEX IF NOT EXISTS idx_scan_history_file_id ON scan_history(file_id);
CREATE INDEX IF NOT EXISTS idx_scan_history_destination ON scan_history(destination_file);
CREATE INDEX IF NOT EXISTS idx_scan_history_timestamp ON scan_history(timestamp);
"#;

/// Initialize the history table and indexes. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
