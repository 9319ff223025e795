//! Generic concurrent batch engine.
//!
//! A [`BatchProcessor`] supplies a synchronous per-item transform and an async
//! batch sink; [`BatchRunner`] drives it over a list of inputs:
//!
//! - inputs are split into batches of `batch_size`, run strictly one after another
//! - within a batch, items run on the blocking pool, at most N at a time, where N is
//!   recomputed by the [`MemoryManager`] before every batch
//! - a failing item is reported to the listener and dropped from the batch
//! - successful outputs (in input order) go to the sink before the next batch starts
//! - a sink error aborts the run with [`MetricsFailure`]

pub mod listener;
pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessorConfig;
use crate::error::{Error, Result};

pub use listener::{MetricsFailure, MetricsSuccess, ProcessorListener, RunState, SilentListener};
pub use memory::{MemoryManager, MemoryProbe, SystemMemory};

use listener::GuardedListener;

#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    type Input: Clone + Debug + Send + Sync + 'static;
    type Output: Send + Sync + 'static;

    /// Checked once before anything is dispatched. An error fails the run untouched.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Transform one item. Runs on a blocking worker thread.
    fn on_process(&self, item: &Self::Input) -> Result<Self::Output>;

    /// Persist one batch of successful outputs.
    async fn on_batch_complete(&self, batch: &[Self::Output]) -> Result<()>;
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(MetricsSuccess),
    Failed(MetricsFailure),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn total_processed(&self) -> usize {
        match self {
            Self::Completed(m) => m.total_processed,
            Self::Failed(m) => m.total_processed,
        }
    }

    pub fn into_result(self) -> Result<MetricsSuccess> {
        match self {
            Self::Completed(m) => Ok(m),
            Self::Failed(m) => Err(m.error),
        }
    }
}

type Listener<P> =
    Arc<dyn ProcessorListener<<P as BatchProcessor>::Input, <P as BatchProcessor>::Output>>;

pub struct BatchRunner<P: BatchProcessor> {
    processor: Arc<P>,
    batch_size: usize,
    memory: MemoryManager,
    listener: Option<Listener<P>>,
    cancel: CancellationToken,
}

impl<P: BatchProcessor> BatchRunner<P> {
    pub fn new(processor: Arc<P>, config: &ProcessorConfig) -> Self {
        Self {
            processor,
            batch_size: config.batch_size.max(1),
            memory: MemoryManager::new(
                config.low_memory_mb,
                config.high_memory_mb,
                config.min_concurrency,
                config.max_concurrency,
            ),
            listener: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<P>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_memory_manager(mut self, memory: MemoryManager) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run at the next batch boundary once cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub async fn run(&self, items: Vec<P::Input>) -> RunOutcome {
        let start = Instant::now();
        let mut listener = GuardedListener::new(self.listener.as_deref());

        if let Err(error) = self.processor.preflight() {
            tracing::error!(error = %error, "preflight failed, nothing processed");
            let metrics = MetricsFailure {
                total_processed: 0,
                time_elapsed: start.elapsed(),
                error,
            };
            listener.fail(&metrics);
            return RunOutcome::Failed(metrics);
        }

        listener.active();

        let total = items.len();
        let mut resolved = 0usize;
        let mut committed = 0usize;

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(committed, remaining = total - resolved, "run cancelled");
                let metrics = MetricsFailure {
                    total_processed: committed,
                    time_elapsed: start.elapsed(),
                    error: Error::Cancelled,
                };
                listener.fail(&metrics);
                return RunOutcome::Failed(metrics);
            }

            let concurrency = self.memory.calculate_concurrency();
            tracing::debug!(batch = index, size = batch.len(), concurrency, "dispatching batch");

            let outputs = self
                .process_batch(batch, concurrency, total, &mut resolved, &mut listener)
                .await;

            if let Err(error) = self.processor.on_batch_complete(&outputs).await {
                tracing::error!(batch = index, error = %error, "batch sink failed, aborting run");
                let metrics = MetricsFailure {
                    total_processed: committed,
                    time_elapsed: start.elapsed(),
                    error,
                };
                listener.fail(&metrics);
                return RunOutcome::Failed(metrics);
            }
            committed += outputs.len();
            listener.batch_complete(&outputs);
        }

        let metrics = MetricsSuccess {
            total_processed: committed,
            time_elapsed: start.elapsed(),
        };
        tracing::info!(
            processed = metrics.total_processed,
            failed = total - committed,
            elapsed_ms = metrics.time_elapsed.as_millis() as u64,
            "run complete"
        );
        listener.complete(&metrics);
        RunOutcome::Completed(metrics)
    }

    async fn process_batch(
        &self,
        batch: &[P::Input],
        concurrency: usize,
        total: usize,
        resolved: &mut usize,
        listener: &mut GuardedListener<'_, P::Input, P::Output>,
    ) -> Vec<P::Output> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join_set: JoinSet<(usize, Result<P::Output>)> = JoinSet::new();

        for (slot, item) in batch.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let processor = Arc::clone(&self.processor);
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (slot, Err(Error::Task("worker pool closed".into()))),
                };
                let result = tokio::task::spawn_blocking(move || processor.on_process(&item))
                    .await
                    .unwrap_or_else(|e| Err(Error::Task(format!("worker panicked: {e}"))));
                (slot, result)
            });
        }

        let mut outputs = Vec::with_capacity(batch.len());
        while let Some(joined) = join_set.join_next().await {
            *resolved += 1;
            match joined {
                Ok((slot, Ok(output))) => outputs.push((slot, output)),
                Ok((slot, Err(error))) => {
                    tracing::debug!(item = ?batch[slot], error = %error, "item failed");
                    listener.error(&error, &batch[slot]);
                }
                Err(e) => tracing::error!(error = %e, "worker task failed"),
            }
            listener.progress(*resolved as f64 / total as f64);
        }

        outputs.sort_by_key(|(slot, _)| *slot);
        outputs.into_iter().map(|(_, output)| output).collect()
    }
}
