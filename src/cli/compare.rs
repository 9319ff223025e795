use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use smartscan::analysis::best_match;

use super::AppContext;

pub struct CompareArgs {
    pub file: PathBuf,
    pub target: Option<PathBuf>,
    pub dirs: Vec<PathBuf>,
    pub clear_dir_prototypes: Vec<PathBuf>,
}

/// Compare a file to another file, a directory, or a set of directories.
pub async fn compare(ctx: Arc<AppContext>, args: CompareArgs) -> Result<()> {
    tokio::task::spawn_blocking(move || compare_blocking(&ctx, args))
        .await
        .context("compare task failed")?
}

fn compare_blocking(ctx: &AppContext, args: CompareArgs) -> Result<()> {
    let analyser = &ctx.analyser;

    if !args.clear_dir_prototypes.is_empty() {
        let removed = analyser.clear_prototypes(&args.clear_dir_prototypes)?;
        println!("Cleared {removed} prototype file(s)");
    }

    if let Some(target) = &args.target {
        let similarity = if target.is_dir() {
            analyser.compare_file_to_dir(&args.file, target)?
        } else {
            analyser.compare_files(&args.file, target)?
        };
        println!(
            "{} vs {}: {similarity:.4}",
            args.file.display(),
            target.display()
        );
        return Ok(());
    }

    anyhow::ensure!(
        !args.dirs.is_empty(),
        "nothing to compare against: pass TARGET, --dirs, or --dirlist-file"
    );

    let similarities = analyser.compare_file_to_dirs(&args.file, &args.dirs)?;
    let mut ranked: Vec<_> = similarities.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1));

    println!("Similarity of {}", args.file.display());
    println!("{}", "=".repeat(40));
    for (dir, similarity) in &ranked {
        println!("  {similarity:>8.4}  {}", dir.display());
    }
    let skipped = args.dirs.len().saturating_sub(similarities.len());
    if skipped > 0 {
        println!("  ({skipped} director{} skipped)", if skipped == 1 { "y" } else { "ies" });
    }

    match best_match(&similarities) {
        Some((dir, similarity)) => println!("Best match: {} ({similarity:.4})", dir.display()),
        None => println!("No directory could be compared"),
    }
    Ok(())
}
