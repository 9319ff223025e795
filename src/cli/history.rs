use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use smartscan::config::SmartScanConfig;
use smartscan::history::{HistoryFilter, ScanHistoryDb};

/// Print logged moves, newest first.
pub fn list(
    config: &SmartScanConfig,
    limit: Option<usize>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let db = ScanHistoryDb::new(config.resolved_history_db())
        .context("failed to open scan history")?;
    let rows = db.get(&HistoryFilter::between(start, end), limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No moves recorded");
        return Ok(());
    }
    println!("Scan History ({} row(s))", rows.len());
    println!("{}", "=".repeat(40));
    for row in &rows {
        println!(
            "{}  {}\n    {} -> {}",
            row.timestamp.format("%Y-%m-%d %H:%M:%S"),
            row.scan_id,
            row.source_file.display(),
            row.destination_file.display()
        );
    }
    Ok(())
}

/// Delete the scan history database.
pub fn clear(config: &SmartScanConfig) -> Result<()> {
    let path = config.resolved_history_db();
    ScanHistoryDb::new(&path)
        .context("failed to open scan history")?
        .clear()?;
    println!("Cleared scan history at {}", path.display());
    Ok(())
}
