use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use smartscan::analysis::ContentMode;
use smartscan::files;
use smartscan::indexer::FileIndexer;
use smartscan::store::{collection_name, SqliteVecStore, VectorStore};

use super::progress::run_with_progress;
use super::AppContext;

/// Embed every supported file under `dirs` into the vector store, skipping files
/// that are already indexed.
pub async fn index(ctx: Arc<AppContext>, dirs: Vec<PathBuf>, cancel: CancellationToken) -> Result<()> {
    anyhow::ensure!(!dirs.is_empty(), "no directories to index");

    let vector_db = ctx.config.resolved_vector_db();
    let mut stores: HashMap<ContentMode, Arc<dyn VectorStore>> = HashMap::new();
    for mode in ContentMode::ALL {
        let (model, dimensions) = match mode {
            ContentMode::Text => (&ctx.config.models.text_model, ctx.text.dimensions()),
            ContentMode::Image | ContentMode::Video => {
                (&ctx.config.models.image_model, ctx.image.dimensions())
            }
        };
        let store = SqliteVecStore::open(&vector_db, &collection_name(model, mode.as_str()), dimensions)
            .with_context(|| format!("failed to open {mode} collection"))?;
        stores.insert(mode, Arc::new(store));
    }

    let indexer = Arc::new(FileIndexer::new(Arc::clone(&ctx.analyser), stores));

    let candidates: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| {
            ContentMode::ALL
                .into_iter()
                .flat_map(move |mode| files::eligible_files(dir, mode, usize::MAX))
        })
        .collect();
    let found = candidates.len();

    let filter_indexer = Arc::clone(&indexer);
    let pending = tokio::task::spawn_blocking(move || filter_indexer.filter(candidates))
        .await
        .context("index filter task failed")??;

    println!(
        "Found {found} file(s), {} already indexed",
        found - pending.len()
    );
    if pending.is_empty() {
        return Ok(());
    }

    run_with_progress(indexer, pending, &ctx.config.processor, cancel, "indexing").await?;
    Ok(())
}
