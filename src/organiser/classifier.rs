use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::analysis::{best_match, FileAnalyser};
use crate::error::{Error, Result};
use crate::processor::BatchProcessor;

/// Where one file would go and how confident the match is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub item: PathBuf,
    pub class_id: PathBuf,
    pub similarity: f32,
}

/// Assigns files to the most similar destination directory without touching them.
pub struct FileClassifier {
    analyser: Arc<FileAnalyser>,
    destinations: Vec<PathBuf>,
    threshold: f32,
}

impl FileClassifier {
    pub fn new(analyser: Arc<FileAnalyser>, destinations: Vec<PathBuf>, threshold: f32) -> Self {
        Self {
            analyser,
            destinations,
            threshold,
        }
    }

    pub fn destinations(&self) -> &[PathBuf] {
        &self.destinations
    }

    pub fn analyser(&self) -> &Arc<FileAnalyser> {
        &self.analyser
    }

    /// Best destination for `path`, or [`Error::BelowThreshold`] if it is not similar enough.
    pub fn classify(&self, path: &Path) -> Result<ClassificationResult> {
        if !path.is_file() {
            return Err(Error::InvalidFile(path.to_path_buf()));
        }
        let similarities = self
            .analyser
            .compare_file_to_dirs(path, &self.destinations)?;
        let (class_id, similarity) =
            best_match(&similarities).ok_or_else(|| Error::NoMatch(path.to_path_buf()))?;

        if similarity < self.threshold {
            return Err(Error::BelowThreshold {
                path: path.to_path_buf(),
                similarity,
                threshold: self.threshold,
            });
        }
        tracing::debug!(
            path = %path.display(),
            class = %class_id.display(),
            similarity,
            "classified"
        );
        Ok(ClassificationResult {
            item: path.to_path_buf(),
            class_id,
            similarity,
        })
    }
}

#[async_trait]
impl BatchProcessor for FileClassifier {
    type Input = PathBuf;
    type Output = ClassificationResult;

    fn preflight(&self) -> Result<()> {
        self.analyser.ensure_ready()
    }

    fn on_process(&self, item: &PathBuf) -> Result<ClassificationResult> {
        self.classify(item)
    }

    async fn on_batch_complete(&self, _batch: &[ClassificationResult]) -> Result<()> {
        Ok(())
    }
}
