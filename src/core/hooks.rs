//! Collaborator seams the engine consumes, with default implementations.
//!
//! The engine reads progress, consults a throughput gate, reports errors and
//! completion, and drives an elapsed-time tracker. Each concern is a trait so
//! a surrounding control plane can substitute its own accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core::EngineError;

/// How a single work invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The work function returned `Ok`.
    Succeeded,
    /// The work function returned an error.
    Failed(String),
    /// The work function panicked.
    Panicked(String),
}

impl ItemOutcome {
    /// Whether the invocation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Per-item accounting and the progress fraction derived from it.
pub trait ProgressTracker: Send + Sync {
    /// Start a new run in which `skipped` leading items count as done.
    fn reset(&self, _skipped: u64) {}
    /// Record one finished invocation. Called before its permit is released.
    fn record(&self, _outcome: &ItemOutcome) {}
    /// Fraction of the run completed, in `[0, 1]`.
    fn fraction(&self) -> f64;
}

/// External rate limiter consulted before each admission.
pub trait ThroughputGate: Send + Sync {
    /// Whether admissions should currently be held back.
    fn is_limited(&self) -> bool;
    /// Refresh the measured rate. Called every time an admission is refused.
    fn update(&self);
    /// Note that an item was dispatched.
    fn record_dispatch(&self) {}
}

/// Run-level reporting callbacks.
pub trait RunReporter: Send + Sync {
    /// An unexpected fault ended the run loop.
    fn on_error(&self, err: &EngineError);
    /// The run finished. Called exactly once per run, at teardown.
    fn on_completed(&self);
}

/// Elapsed-time tracking for a run.
pub trait RunTimer: Send + Sync {
    /// Forget accumulated time.
    fn reset(&self);
    /// Begin or continue accumulating.
    fn start(&self);
    /// Suspend accumulating.
    fn stop(&self);
    /// Accumulated active time.
    fn elapsed(&self) -> Duration;
}

/// Counts completions against an optional known total.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    total: Option<u64>,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ProgressCounter {
    /// Counter for a source of `total` items, or unknown length for `None`.
    #[must_use]
    pub const fn new(total: Option<u64>) -> Self {
        Self {
            total,
            skipped: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Configured total, if known.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Items counted as done: skipped plus finished invocations.
    pub fn completed(&self) -> u64 {
        self.skipped.load(Ordering::Acquire)
            + self.succeeded.load(Ordering::Acquire)
            + self.failed.load(Ordering::Acquire)
    }

    /// Invocations that succeeded.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Acquire)
    }

    /// Invocations that failed or panicked.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }
}

impl ProgressTracker for ProgressCounter {
    fn reset(&self, skipped: u64) {
        self.skipped.store(skipped, Ordering::Release);
        self.succeeded.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
    }

    fn record(&self, outcome: &ItemOutcome) {
        if outcome.is_success() {
            self.succeeded.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn fraction(&self) -> f64 {
        match self.total {
            None => 0.0,
            Some(0) => 1.0,
            Some(total) => (self.completed() as f64 / total as f64).min(1.0),
        }
    }
}

/// Gate that never limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unthrottled;

impl ThroughputGate for Unthrottled {
    fn is_limited(&self) -> bool {
        false
    }

    fn update(&self) {}
}

/// Reporter that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl RunReporter for TracingReporter {
    fn on_error(&self, err: &EngineError) {
        error!(error = %err, "run loop failed");
    }

    fn on_completed(&self) {
        info!("run completed");
    }
}

#[derive(Debug, Default)]
struct StopwatchState {
    accumulated: Duration,
    started_at: Option<Instant>,
}

/// Timer accumulating active time across start/stop pairs.
#[derive(Debug, Default)]
pub struct Stopwatch {
    state: Mutex<StopwatchState>,
}

impl Stopwatch {
    /// A stopped timer at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunTimer for Stopwatch {
    fn reset(&self) {
        *self.state.lock() = StopwatchState::default();
    }

    fn start(&self) {
        let mut state = self.state.lock();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(started) = state.started_at.take() {
            state.accumulated += started.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        let state = self.state.lock();
        state.accumulated + state.started_at.map_or(Duration::ZERO, |s| s.elapsed())
    }
}
