//! Observer interface for batch runs.
//!
//! A run notifies its listener in a fixed order:
//! `on_active`, then any interleaving of `on_progress` / `on_error` /
//! `on_batch_complete`, then exactly one of `on_complete` or `on_fail`.
//! A run that fails preflight goes straight from idle to `on_fail`.
//! All methods have default no-op implementations.

use std::time::Duration;

use crate::error::Error;

/// Summary of a run that finished every batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSuccess {
    pub total_processed: usize,
    pub time_elapsed: Duration,
}

/// Summary of a run aborted by a run-level error.
#[derive(Debug)]
pub struct MetricsFailure {
    pub total_processed: usize,
    pub time_elapsed: Duration,
    pub error: Error,
}

pub trait ProcessorListener<I, O>: Send + Sync {
    fn on_active(&self) {}
    /// Fraction of all items resolved so far, in `[0, 1]`, never decreasing within a run.
    fn on_progress(&self, _progress: f64) {}
    fn on_error(&self, _error: &Error, _item: &I) {}
    fn on_batch_complete(&self, _batch: &[O]) {}
    fn on_complete(&self, _metrics: &MetricsSuccess) {}
    fn on_fail(&self, _metrics: &MetricsFailure) {}
}

/// Listener that ignores every event.
pub struct SilentListener;

impl<I, O> ProcessorListener<I, O> for SilentListener {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Active,
    Completed,
    Failed,
}

/// Forwards events to an optional listener while enforcing the run state machine.
///
/// Out-of-order events are programming errors in the engine: they trip a debug
/// assertion and are dropped (with an error log) in release builds.
pub(crate) struct GuardedListener<'a, I, O> {
    inner: Option<&'a dyn ProcessorListener<I, O>>,
    state: RunState,
    last_progress: f64,
}

impl<'a, I, O> GuardedListener<'a, I, O> {
    pub(crate) fn new(inner: Option<&'a dyn ProcessorListener<I, O>>) -> Self {
        Self {
            inner,
            state: RunState::Idle,
            last_progress: 0.0,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    fn expect_state(&self, allowed: &[RunState], event: &str) -> bool {
        if allowed.contains(&self.state) {
            return true;
        }
        tracing::error!(state = ?self.state, event, "listener event out of order");
        debug_assert!(false, "listener event {event} in state {:?}", self.state);
        false
    }

    pub(crate) fn active(&mut self) {
        if self.expect_state(&[RunState::Idle], "on_active") {
            self.state = RunState::Active;
            if let Some(l) = self.inner {
                l.on_active();
            }
        }
    }

    pub(crate) fn progress(&mut self, progress: f64) {
        if !self.expect_state(&[RunState::Active], "on_progress") {
            return;
        }
        let progress = progress.clamp(0.0, 1.0);
        if progress < self.last_progress {
            tracing::error!(progress, last = self.last_progress, "progress went backwards");
            debug_assert!(false, "progress went backwards");
            return;
        }
        self.last_progress = progress;
        if let Some(l) = self.inner {
            l.on_progress(progress);
        }
    }

    pub(crate) fn error(&self, error: &Error, item: &I) {
        if self.expect_state(&[RunState::Active], "on_error") {
            if let Some(l) = self.inner {
                l.on_error(error, item);
            }
        }
    }

    pub(crate) fn batch_complete(&self, batch: &[O]) {
        if self.expect_state(&[RunState::Active], "on_batch_complete") {
            if let Some(l) = self.inner {
                l.on_batch_complete(batch);
            }
        }
    }

    pub(crate) fn complete(&mut self, metrics: &MetricsSuccess) {
        if self.expect_state(&[RunState::Active], "on_complete") {
            self.state = RunState::Completed;
            if let Some(l) = self.inner {
                l.on_complete(metrics);
            }
        }
    }

    pub(crate) fn fail(&mut self, metrics: &MetricsFailure) {
        if self.expect_state(&[RunState::Idle, RunState::Active], "on_fail") {
            self.state = RunState::Failed;
            if let Some(l) = self.inner {
                l.on_fail(metrics);
            }
        }
    }
}
