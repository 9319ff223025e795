pub mod autosort;
pub mod compare;
pub mod history;
pub mod index;
pub mod model;
pub mod progress;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use smartscan::analysis::{AnalyserSettings, FileAnalyser};
use smartscan::config::SmartScanConfig;
use smartscan::embedding::{
    create_image_provider, create_text_provider, ImageEmbeddingProvider, TextEmbeddingProvider,
};
use smartscan::files;

/// Everything a model-backed command needs, built once at startup.
pub struct AppContext {
    pub config: SmartScanConfig,
    pub text: Arc<TextEmbeddingProvider>,
    pub image: Arc<ImageEmbeddingProvider>,
    pub analyser: Arc<FileAnalyser>,
}

impl AppContext {
    /// Create and initialize both embedding providers. Blocking.
    pub fn load(config: SmartScanConfig) -> Result<Self> {
        let text: Arc<TextEmbeddingProvider> = Arc::from(create_text_provider(&config.models)?);
        let image: Arc<ImageEmbeddingProvider> = Arc::from(create_image_provider(&config.models)?);

        text.init()
            .with_context(|| format!("failed to initialize {}", config.models.text_model))?;
        image
            .init()
            .with_context(|| format!("failed to initialize {}", config.models.image_model))?;

        let analyser = Arc::new(FileAnalyser::new(
            Arc::clone(&text),
            Arc::clone(&image),
            AnalyserSettings::from(&config.organiser),
        ));

        Ok(Self {
            config,
            text,
            image,
            analyser,
        })
    }

    /// Load on the blocking pool so model loading does not stall the runtime.
    pub async fn load_async(config: SmartScanConfig) -> Result<Arc<Self>> {
        let ctx = tokio::task::spawn_blocking(move || Self::load(config))
            .await
            .context("model loading task failed")??;
        Ok(Arc::new(ctx))
    }

    pub fn close(&self) {
        self.text.close();
        self.image.close();
    }
}

/// Directories given directly plus those listed in `dirlist_file`.
pub fn collect_dirs(dirs: &[PathBuf], dirlist_file: Option<&PathBuf>) -> Result<Vec<PathBuf>> {
    let mut all = Vec::new();
    if let Some(list) = dirlist_file {
        all.extend(
            files::load_dir_list(list)
                .with_context(|| format!("failed to read dir list {}", list.display()))?,
        );
    }
    for dir in dirs {
        if dir.is_dir() {
            all.push(files::absolute(dir));
        } else {
            tracing::warn!(path = %dir.display(), "not a directory, skipping");
        }
    }
    all.dedup();
    Ok(all)
}
