use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use smartscan::config::ProcessorConfig;
use smartscan::error::Error;
use smartscan::indexer::IndexedItem;
use smartscan::organiser::{ClassificationResult, MoveRecord};
use smartscan::processor::{
    BatchProcessor, BatchRunner, MetricsFailure, MetricsSuccess, ProcessorListener,
};

/// One-line description of a processed item for the terminal.
pub trait Summary {
    fn summary(&self) -> String;
}

impl Summary for ClassificationResult {
    fn summary(&self) -> String {
        format!(
            "{} -> {} ({:.4})",
            self.item.display(),
            self.class_id.display(),
            self.similarity
        )
    }
}

impl Summary for MoveRecord {
    fn summary(&self) -> String {
        format!(
            "moved {} -> {} ({:.4})",
            self.source.display(),
            self.destination.display(),
            self.similarity
        )
    }
}

impl Summary for IndexedItem {
    fn summary(&self) -> String {
        format!("indexed [{}] {}", self.mode, self.id)
    }
}

/// Drives an indicatif bar from run events and prints per-item results.
pub struct TerminalListener {
    bar: ProgressBar,
}

impl TerminalListener {
    pub fn new(total: usize, label: &str) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("  {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }
}

impl<O: Summary + Send + Sync> ProcessorListener<PathBuf, O> for TerminalListener {
    fn on_progress(&self, progress: f64) {
        let len = self.bar.length().unwrap_or(0);
        self.bar.set_position((progress * len as f64).round() as u64);
    }

    fn on_error(&self, error: &Error, item: &PathBuf) {
        self.bar
            .suspend(|| tracing::warn!(path = %item.display(), error = %error, "skipped"));
    }

    fn on_batch_complete(&self, batch: &[O]) {
        for output in batch {
            self.bar.println(format!("  {}", output.summary()));
        }
    }

    fn on_complete(&self, metrics: &MetricsSuccess) {
        self.bar.finish_and_clear();
        println!(
            "Processed {} file(s) in {:.2}s",
            metrics.total_processed,
            metrics.time_elapsed.as_secs_f64()
        );
    }

    fn on_fail(&self, metrics: &MetricsFailure) {
        self.bar.abandon();
        eprintln!(
            "Run failed after {} file(s) in {:.2}s: {}",
            metrics.total_processed,
            metrics.time_elapsed.as_secs_f64(),
            metrics.error
        );
    }
}

/// Run `processor` over `files` with a terminal progress bar. A run-level
/// failure becomes an error so the process exits non-zero.
pub async fn run_with_progress<P>(
    processor: Arc<P>,
    files: Vec<PathBuf>,
    config: &ProcessorConfig,
    cancel: CancellationToken,
    label: &str,
) -> Result<MetricsSuccess>
where
    P: BatchProcessor<Input = PathBuf>,
    P::Output: Summary,
{
    let listener = Arc::new(TerminalListener::new(files.len(), label));
    let runner = BatchRunner::new(processor, config)
        .with_listener(listener)
        .with_cancellation_token(cancel);
    let metrics = runner.run(files).await.into_result()?;
    Ok(metrics)
}
