use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use smartscan::files;
use smartscan::history::ScanHistoryDb;
use smartscan::organiser::{FileClassifier, FileScanner};

use super::progress::run_with_progress;
use super::AppContext;

pub struct AutosortArgs {
    pub target_dirs: Vec<PathBuf>,
    pub destinations: Vec<PathBuf>,
    pub threshold: f32,
    pub dry_run: bool,
    pub clear_dir_prototypes: Vec<PathBuf>,
}

/// Sort the files directly inside the target directories into destination directories.
pub async fn autosort(ctx: Arc<AppContext>, args: AutosortArgs, cancel: CancellationToken) -> Result<()> {
    anyhow::ensure!(
        !args.target_dirs.is_empty(),
        "no target directories: pass DIRLIST_FILE, --dirs, or set organiser.target_dirs"
    );

    let destinations = if args.destinations.is_empty() {
        files::child_dirs(&args.target_dirs).context("failed to list destination directories")?
    } else {
        args.destinations.iter().map(|d| files::absolute(d)).collect()
    };
    anyhow::ensure!(!destinations.is_empty(), "no destination directories found");

    if !args.clear_dir_prototypes.is_empty() {
        let removed = ctx.analyser.clear_prototypes(&args.clear_dir_prototypes)?;
        println!("Cleared {removed} prototype file(s)");
    }

    let to_sort = files::files_in_dirs(&args.target_dirs).context("failed to list files")?;
    if to_sort.is_empty() {
        println!("No supported files found in target directories");
        return Ok(());
    }
    println!(
        "Sorting {} file(s) into {} destination(s) (threshold {})",
        to_sort.len(),
        destinations.len(),
        args.threshold
    );

    let classifier = FileClassifier::new(Arc::clone(&ctx.analyser), destinations, args.threshold);
    let processor_config = &ctx.config.processor;

    if args.dry_run {
        run_with_progress(
            Arc::new(classifier),
            to_sort,
            processor_config,
            cancel,
            "classifying",
        )
        .await?;
        println!("Dry run: no files were moved");
        return Ok(());
    }

    let history = Arc::new(
        ScanHistoryDb::new(ctx.config.resolved_history_db())
            .context("failed to open scan history")?,
    );
    let scanner = Arc::new(FileScanner::new(classifier, history));
    let scan_id = scanner.scan_id().to_string();
    let result = run_with_progress(scanner, to_sort, processor_config, cancel, "sorting").await;
    println!("Scan id: {scan_id}");
    result?;
    Ok(())
}
