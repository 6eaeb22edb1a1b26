//! The scheduling engine run loop.
//!
//! One engine instance drives one run: it skips the configured prefix of the
//! source, primes the batch queue, then admits one item per permit until the
//! source is drained or a soft stop is requested. Work invocations are
//! spawned without waiting; each one releases its permit when it finishes.
//!
//! Exit paths:
//! - source drained or soft stop seen after acquiring: wait until progress
//!   reaches 1.0 or no permit is held;
//! - soft stop while waiting for a permit: wait until no permit is held.
//!
//! Either wait ends early on a hard stop. Teardown always runs.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::error::panic_message;
use crate::core::{
    AdmissionPermit, AdmissionPool, BatchQueue, EngineError, EngineMetrics, ItemOutcome,
    ItemSource, ProgressTracker, RunReporter, RunStatus, RunTimer, Spawn, StatusCell,
    StopController, StopSignal, ThroughputGate, WorkExecutor,
};

/// Collaborators shared by the control plane and the run loop.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub progress: Arc<dyn ProgressTracker>,
    pub gate: Arc<dyn ThroughputGate>,
    pub reporter: Arc<dyn RunReporter>,
    pub timer: Arc<dyn RunTimer>,
}

/// State shared between lifecycle callers and the run loop.
pub(crate) struct RunShared {
    pub status: StatusCell,
    /// DOP applied by the next start.
    pub idle_dop: AtomicUsize,
    /// DOP restored by resume.
    pub saved_dop: AtomicUsize,
    /// Set between pause and resume.
    pub paused: AtomicBool,
    pub pool: Mutex<Option<Arc<AdmissionPool>>>,
    pub stop: Mutex<Option<StopController>>,
    pub metrics: Arc<EngineMetrics>,
    pub hooks: Collaborators,
    /// Bumped by every start; outcomes of older runs are not recorded.
    pub generation: Mutex<u64>,
}

impl RunShared {
    /// Begin a new run generation and reset progress for it.
    pub(crate) fn next_generation(&self, skipped: u64) -> u64 {
        let mut current = self.generation.lock();
        *current += 1;
        self.hooks.progress.reset(skipped);
        *current
    }

    /// Record `outcome` unless it belongs to an earlier run.
    pub(crate) fn record(&self, generation: u64, outcome: &ItemOutcome) -> bool {
        let current = self.generation.lock();
        if *current != generation {
            return false;
        }
        self.hooks.progress.record(outcome);
        true
    }
}

/// Per-run tunables copied out of the configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineSettings {
    pub generation: u64,
    pub skip: u64,
    pub batch_target: usize,
    pub drain_poll: Duration,
    pub throttle_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainMode {
    /// Loop ended normally; progress or quiescence ends the wait.
    Exhausted,
    /// Permit wait abandoned; only quiescence ends the wait.
    Cancelled,
}

pub(crate) struct Engine<I, W, S> {
    settings: EngineSettings,
    pool: Arc<AdmissionPool>,
    signal: StopSignal,
    work: Arc<W>,
    spawner: S,
    shared: Arc<RunShared>,
    _item: PhantomData<fn(I)>,
}

impl<I, W, S> Engine<I, W, S>
where
    I: Send + 'static,
    W: WorkExecutor<I>,
    S: Spawn + Send + Sync + 'static,
{
    pub(crate) fn new(
        settings: EngineSettings,
        pool: Arc<AdmissionPool>,
        signal: StopSignal,
        work: Arc<W>,
        spawner: S,
        shared: Arc<RunShared>,
    ) -> Self {
        Self {
            settings,
            pool,
            signal,
            work,
            spawner,
            shared,
            _item: PhantomData,
        }
    }

    /// Drive the run to completion, then tear down.
    pub(crate) async fn run(self, source: ItemSource<I>) {
        let outcome = AssertUnwindSafe(self.drive(source)).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(EngineError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(err) = failure {
            warn!(error = %err, "run loop ended with an error");
            self.shared.hooks.reporter.on_error(&err);
        }
        self.teardown();
    }

    async fn drive(&self, source: ItemSource<I>) -> Result<(), EngineError> {
        let (mut batch, skipped) =
            BatchQueue::new(source, self.settings.skip, self.settings.batch_target);
        if skipped < self.settings.skip {
            debug!(skipped, skip = self.settings.skip, "source ended inside the skipped prefix");
        }
        let primed = batch.replenish();
        debug!(primed, target = batch.target(), "batch queue primed");

        let mut mode = DrainMode::Exhausted;
        while !batch.is_drained() && !self.signal.is_soft_requested() {
            let Some(permit) = self.pool.acquire(&self.signal).await? else {
                debug!("permit wait abandoned on stop request");
                mode = DrainMode::Cancelled;
                break;
            };
            if self.signal.is_soft_requested() {
                drop(permit);
                break;
            }

            let shrinking = self.pool.is_shrinking();
            if shrinking || self.shared.hooks.gate.is_limited() {
                self.shared.hooks.gate.update();
                drop(permit);
                if shrinking {
                    EngineMetrics::bump(&self.shared.metrics.permits_shed);
                    tokio::task::yield_now().await;
                } else {
                    EngineMetrics::bump(&self.shared.metrics.throttled_retries);
                    self.back_off().await;
                }
                continue;
            }

            if !batch.is_exhausted() && (batch.is_empty() || batch.len() < self.pool.capacity()) {
                let pulled = batch.replenish();
                debug!(pulled, pending = batch.len(), "batch queue replenished");
            }

            match batch.pop() {
                Some(item) => self.dispatch(item, permit),
                None => drop(permit),
            }
        }

        self.wait_for_drain(mode).await;
        Ok(())
    }

    fn dispatch(&self, item: I, permit: AdmissionPermit) {
        let work = Arc::clone(&self.work);
        let shared = Arc::clone(&self.shared);
        let metrics = Arc::clone(&self.shared.metrics);
        let stop = self.signal.clone();
        let generation = self.settings.generation;

        self.shared.hooks.gate.record_dispatch();
        EngineMetrics::bump(&metrics.items_dispatched);

        self.spawner.spawn(async move {
            let result = AssertUnwindSafe(work.execute(item, stop)).catch_unwind().await;
            let outcome = match result {
                Ok(Ok(())) => ItemOutcome::Succeeded,
                Ok(Err(err)) => {
                    debug!(error = %err, "work item failed");
                    ItemOutcome::Failed(format!("{err:#}"))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(panic = %message, "work item panicked");
                    ItemOutcome::Panicked(message)
                }
            };
            if outcome.is_success() {
                EngineMetrics::bump(&metrics.items_succeeded);
            } else {
                EngineMetrics::bump(&metrics.items_failed);
            }
            if !shared.record(generation, &outcome) {
                debug!(generation, "outcome of an earlier run not recorded");
            }
            drop(permit);
        });
    }

    async fn back_off(&self) {
        if self.settings.throttle_backoff.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            biased;
            () = self.signal.soft_requested() => {}
            () = tokio::time::sleep(self.settings.throttle_backoff) => {}
        }
    }

    async fn wait_for_drain(&self, mode: DrainMode) {
        let mut ticker = tokio::time::interval(self.settings.drain_poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let drained = match mode {
                DrainMode::Exhausted => {
                    self.shared.hooks.progress.fraction() >= 1.0 || self.pool.is_quiescent()
                }
                DrainMode::Cancelled => self.pool.is_quiescent(),
            };
            if drained {
                debug!(?mode, "run drained");
                return;
            }
            tokio::select! {
                biased;
                () = self.signal.hard_requested() => {
                    warn!(in_flight = self.pool.held(), "hard stop; abandoning in-flight work");
                    return;
                }
                _ = ticker.tick() => {}
            }
        }
    }

    /// Release run resources and return to `Idle`.
    ///
    /// Runs under the status lock, so a start or resize never observes a
    /// half-torn-down run. A resize that lands on the closed pool afterwards
    /// carries its value over itself.
    fn teardown(&self) {
        let shared = &self.shared;
        shared.hooks.reporter.on_completed();

        let dop = shared.status.update(|status| {
            self.pool.close();
            let dop = if shared.paused.swap(false, Ordering::AcqRel) {
                shared.saved_dop.load(Ordering::Acquire)
            } else {
                self.pool.capacity()
            };
            shared.idle_dop.store(dop, Ordering::Release);
            *shared.pool.lock() = None;
            *shared.stop.lock() = None;
            shared.hooks.timer.stop();
            *status = RunStatus::Idle;
            dop
        });

        info!(
            dop,
            in_flight = self.pool.held(),
            elapsed_ms = shared.hooks.timer.elapsed().as_millis(),
            "run torn down"
        );
    }
}
