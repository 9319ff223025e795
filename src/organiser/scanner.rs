use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::classifier::FileClassifier;
use crate::error::{Error, Result};
use crate::files;
use crate::history::{file_id_for, ScanHistory, ScanHistoryDb};
use crate::processor::BatchProcessor;

/// A file that was classified and moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub class_id: PathBuf,
    pub similarity: f32,
}

/// Classifies files, moves them into their best destination, and logs each move.
pub struct FileScanner {
    classifier: FileClassifier,
    history: Arc<ScanHistoryDb>,
    scan_id: String,
}

impl FileScanner {
    pub fn new(classifier: FileClassifier, history: Arc<ScanHistoryDb>) -> Self {
        Self {
            classifier,
            history,
            scan_id: uuid::Uuid::now_v7().to_string(),
        }
    }

    /// Id shared by every history row this scanner writes.
    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }
}

/// History rows for a batch of moves. A file that was itself moved here by an
/// earlier scan keeps the id derived from its original location.
///
/// The chain is keyed by path alone. Restoring writes no rows, so a different
/// file later placed at a previously logged destination joins that chain and
/// restores to its origin.
fn history_rows(db: &ScanHistoryDb, scan_id: &str, moves: &[MoveRecord]) -> Result<Vec<ScanHistory>> {
    moves
        .iter()
        .map(|m| {
            let original = db
                .get_original_source(&m.source)?
                .unwrap_or_else(|| m.source.clone());
            Ok(ScanHistory::new(
                scan_id,
                file_id_for(&original),
                m.source.clone(),
                m.destination.clone(),
            ))
        })
        .collect()
}

#[async_trait]
impl BatchProcessor for FileScanner {
    type Input = PathBuf;
    type Output = MoveRecord;

    fn preflight(&self) -> Result<()> {
        self.classifier.preflight()
    }

    fn on_process(&self, item: &PathBuf) -> Result<MoveRecord> {
        // History only ever holds absolute paths.
        let source = files::absolute(item);
        let result = self.classifier.classify(&source)?;
        let class_id = files::absolute(&result.class_id);
        let destination = files::move_into_dir(&source, &class_id)?;
        tracing::info!(
            from = %source.display(),
            to = %destination.display(),
            similarity = result.similarity,
            "moved"
        );
        Ok(MoveRecord {
            source,
            destination,
            class_id,
            similarity: result.similarity,
        })
    }

    async fn on_batch_complete(&self, batch: &[MoveRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.history);
        let scan_id = self.scan_id.clone();
        let moves = batch.to_vec();
        tokio::task::spawn_blocking(move || {
            let rows = history_rows(&db, &scan_id, &moves)?;
            db.add(&rows)
        })
        .await
        .map_err(|e| Error::Task(format!("history writer panicked: {e}")))?
    }
}
