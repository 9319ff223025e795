//! Append-only log of file moves, used to undo them.
//!
//! Every successful move writes one [`ScanHistory`] row. Rows are never updated;
//! they are only deleted by filter or cleared in bulk. The database is opened per
//! call, so concurrent processes contend only on SQLite's own locking.

pub mod restore;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;

pub use restore::{restore_files, RestoreReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHistory {
    pub scan_id: String,
    /// Content address of the path the file had before it was first sorted.
    pub file_id: String,
    pub source_file: PathBuf,
    pub destination_file: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl ScanHistory {
    pub fn new(
        scan_id: impl Into<String>,
        file_id: impl Into<String>,
        source_file: impl Into<PathBuf>,
        destination_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scan_id: scan_id.into(),
            file_id: file_id.into(),
            source_file: source_file.into(),
            destination_file: destination_file.into(),
            timestamp: Utc::now(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let timestamp: String = row.get(4)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        Ok(Self {
            scan_id: row.get(0)?,
            file_id: row.get(1)?,
            source_file: PathBuf::from(row.get::<_, String>(2)?),
            destination_file: PathBuf::from(row.get::<_, String>(3)?),
            timestamp,
        })
    }
}

/// Stable id for a file, derived from the path it was originally found at.
pub fn file_id_for(path: &Path) -> String {
    blake3::hash(path.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a CLI date. `YYYY-MM-DD` maps to the start of that day (UTC), or its
/// last microsecond when `end_of_day` is set. Full RFC 3339 is also accepted.
pub fn parse_date(input: &str, end_of_day: bool) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        Ok(date) => {
            let start = date.and_time(NaiveTime::MIN).and_utc();
            Ok(if end_of_day {
                start + chrono::Duration::days(1) - chrono::Duration::microseconds(1)
            } else {
                start
            })
        }
        Err(_) => Ok(DateTime::parse_from_rfc3339(input.trim())?.with_timezone(&Utc)),
    }
}

/// Conjunction of optional row constraints. Empty matches every row.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub scan_id: Option<String>,
    pub file_id: Option<String>,
    pub source_file: Option<PathBuf>,
    pub destination_file: Option<PathBuf>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    pub fn destination(path: impl Into<PathBuf>) -> Self {
        Self {
            destination_file: Some(path.into()),
            ..Self::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        let mut push = |clause: &str, value: String| {
            clauses.push(clause.to_string());
            values.push(value);
        };
        if let Some(v) = &self.scan_id {
            push("scan_id = ?", v.clone());
        }
        if let Some(v) = &self.file_id {
            push("file_id = ?", v.clone());
        }
        if let Some(v) = &self.source_file {
            push("source_file = ?", v.to_string_lossy().into_owned());
        }
        if let Some(v) = &self.destination_file {
            push("destination_file = ?", v.to_string_lossy().into_owned());
        }
        if let Some(v) = &self.start {
            push("timestamp >= ?", format_timestamp(v));
        }
        if let Some(v) = &self.end {
            push("timestamp <= ?", format_timestamp(v));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

pub struct ScanHistoryDb {
    path: PathBuf,
}

impl ScanHistoryDb {
    /// Open (or create) the history database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Self { path: path.into() };
        db.connect()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::init_schema(&conn)?;
        Ok(conn)
    }

    /// Insert all rows in one transaction.
    pub fn add(&self, records: &[ScanHistory]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scan_history (scan_id, file_id, source_file, destination_file, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.scan_id,
                    record.file_id,
                    record.source_file.to_string_lossy(),
                    record.destination_file.to_string_lossy(),
                    format_timestamp(&record.timestamp),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = records.len(), "scan history appended");
        Ok(())
    }

    /// Matching rows, newest first.
    pub fn get(&self, filter: &HistoryFilter, limit: Option<usize>) -> Result<Vec<ScanHistory>> {
        let conn = self.connect()?;
        let (where_clause, values) = filter.where_clause();
        let mut sql = format!(
            "SELECT scan_id, file_id, source_file, destination_file, timestamp
             FROM scan_history {where_clause}
             ORDER BY timestamp DESC, rowid DESC"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), ScanHistory::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct destination paths of matching rows, oldest first.
    pub fn destinations(&self, filter: &HistoryFilter) -> Result<Vec<PathBuf>> {
        let conn = self.connect()?;
        let (where_clause, values) = filter.where_clause();
        let sql = format!(
            "SELECT destination_file FROM scan_history {where_clause}
             GROUP BY destination_file
             ORDER BY MIN(timestamp) ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                row.get::<_, String>(0).map(PathBuf::from)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete matching rows. Returns the number removed.
    pub fn delete(&self, filter: &HistoryFilter) -> Result<usize> {
        let conn = self.connect()?;
        let (where_clause, values) = filter.where_clause();
        let deleted = conn.execute(
            &format!("DELETE FROM scan_history {where_clause}"),
            params_from_iter(values.iter()),
        )?;
        tracing::info!(deleted, "scan history rows deleted");
        Ok(deleted)
    }

    /// Drop every row and remove the database files.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            let conn = self.connect()?;
            conn.execute("DELETE FROM scan_history", [])?;
            drop(conn);
        }
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let file = PathBuf::from(name);
            if file.exists() {
                std::fs::remove_file(&file)?;
            }
        }
        tracing::info!(path = %self.path.display(), "scan history cleared");
        Ok(())
    }

    /// Path a file had before its first logged move, following every later hop.
    ///
    /// Finds the `file_id` of the most recent row that moved a file to
    /// `destination`, then returns the source of the earliest row with that id.
    pub fn get_original_source(&self, destination: &Path) -> Result<Option<PathBuf>> {
        let conn = self.connect()?;
        let source: Option<String> = conn
            .query_row(
                "SELECT source_file FROM scan_history
                 WHERE file_id = (
                     SELECT file_id FROM scan_history
                     WHERE destination_file = ?1
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT 1
                 )
                 ORDER BY timestamp ASC, rowid ASC
                 LIMIT 1",
                params![destination.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(source.map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_bounds_cover_whole_day() {
        let start = parse_date("2024-03-05", false).unwrap();
        let end = parse_date("2024-03-05", true).unwrap();
        assert_eq!(format_timestamp(&start), "2024-03-05T00:00:00.000000Z");
        assert_eq!(format_timestamp(&end), "2024-03-05T23:59:59.999999Z");
    }

    #[test]
    fn rfc3339_dates_are_normalized_to_utc() {
        let ts = parse_date("2024-03-05T10:00:00+02:00", false).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-05T08:00:00.000000Z");
        assert!(parse_date("last tuesday", false).is_err());
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        let (clause, values) = HistoryFilter::default().where_clause();
        assert!(clause.is_empty());
        assert!(values.is_empty());
    }

    #[test]
    fn filter_binds_every_field() {
        let filter = HistoryFilter {
            scan_id: Some("s".into()),
            destination_file: Some(PathBuf::from("/d/a.txt")),
            start: Some(parse_date("2024-01-01", false).unwrap()),
            ..HistoryFilter::default()
        };
        let (clause, values) = filter.where_clause();
        assert_eq!(
            clause,
            "WHERE scan_id = ? AND destination_file = ? AND timestamp >= ?"
        );
        assert_eq!(values[1], "/d/a.txt");
    }

    #[test]
    fn file_id_is_stable_hex() {
        let a = file_id_for(Path::new("/inbox/a.txt"));
        assert_eq!(a, file_id_for(Path::new("/inbox/a.txt")));
        assert_ne!(a, file_id_for(Path::new("/inbox/b.txt")));
        assert_eq!(a.len(), 64);
    }
}
