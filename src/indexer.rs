//! Embeds files into per-mode vector store collections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::analysis::{ContentMode, FileAnalyser};
use crate::error::{Error, Result};
use crate::files;
use crate::processor::BatchProcessor;
use crate::store::VectorStore;

#[derive(Debug, Clone)]
pub struct IndexedItem {
    /// Absolute path of the file, used as the vector store id.
    pub id: String,
    pub mode: ContentMode,
    pub embedding: Vec<f32>,
}

pub struct FileIndexer {
    analyser: Arc<FileAnalyser>,
    stores: HashMap<ContentMode, Arc<dyn VectorStore>>,
}

/// Store id for a file: its absolute path.
pub fn index_id(path: &Path) -> String {
    files::absolute(path)
        .to_string_lossy()
        .into_owned()
}

impl FileIndexer {
    pub fn new(analyser: Arc<FileAnalyser>, stores: HashMap<ContentMode, Arc<dyn VectorStore>>) -> Self {
        Self { analyser, stores }
    }

    fn store(&self, mode: ContentMode) -> Result<&Arc<dyn VectorStore>> {
        self.stores
            .get(&mode)
            .ok_or_else(|| Error::UnsupportedFileType(format!("no {mode} collection configured")))
    }

    /// Drop files that are already indexed or have no collection for their mode.
    pub fn filter(&self, files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let mut pending = Vec::with_capacity(files.len());
        for file in files {
            let Ok(mode) = ContentMode::from_path(&file) else {
                continue;
            };
            let Ok(store) = self.store(mode) else {
                continue;
            };
            if !store.contains(&index_id(&file))? {
                pending.push(file);
            }
        }
        Ok(pending)
    }
}

#[async_trait]
impl BatchProcessor for FileIndexer {
    type Input = PathBuf;
    type Output = IndexedItem;

    fn preflight(&self) -> Result<()> {
        self.analyser.ensure_ready()
    }

    fn on_process(&self, item: &PathBuf) -> Result<IndexedItem> {
        let mode = ContentMode::from_path(item)?;
        self.store(mode)?;
        let embedding = self.analyser.embed_file(item, mode)?;
        Ok(IndexedItem {
            id: index_id(item),
            mode,
            embedding,
        })
    }

    async fn on_batch_complete(&self, batch: &[IndexedItem]) -> Result<()> {
        let mut grouped: HashMap<ContentMode, (Vec<String>, Vec<Vec<f32>>)> = HashMap::new();
        for item in batch {
            let entry = grouped.entry(item.mode).or_default();
            entry.0.push(item.id.clone());
            entry.1.push(item.embedding.clone());
        }
        for (mode, (ids, embeddings)) in grouped {
            let store = Arc::clone(self.store(mode)?);
            let count = ids.len();
            tokio::task::spawn_blocking(move || store.add(&ids, &embeddings))
                .await
                .map_err(|e| Error::Task(format!("vector store writer panicked: {e}")))??;
            tracing::debug!(mode = %mode, count, "indexed batch");
        }
        Ok(())
    }
}
