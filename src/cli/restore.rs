use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use smartscan::config::SmartScanConfig;
use smartscan::history::{restore_files, HistoryFilter, ScanHistoryDb};

/// Move files back to where they were before they were sorted.
pub async fn restore(
    config: &SmartScanConfig,
    mut files: Vec<PathBuf>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    let db_path = config.resolved_history_db();
    tokio::task::spawn_blocking(move || {
        let db = ScanHistoryDb::new(&db_path).context("failed to open scan history")?;

        if start.is_some() || end.is_some() {
            let in_range = db.destinations(&HistoryFilter::between(start, end))?;
            println!("{} file(s) were moved in the given range", in_range.len());
            files.extend(in_range);
        }
        anyhow::ensure!(
            !files.is_empty(),
            "nothing to restore: pass FILE, --files, or a date range"
        );

        let report = restore_files(&db, &files)?;
        for (from, to) in &report.restored {
            println!("  restored {} -> {}", from.display(), to.display());
        }
        for (path, reason) in &report.skipped {
            println!("  skipped  {} ({reason})", path.display());
        }
        println!(
            "Restored {} file(s), skipped {}",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(())
    })
    .await
    .context("restore task failed")?
}
