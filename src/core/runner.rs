//! Control plane: lifecycle operations and the DOP resize protocol.
//!
//! A [`Runner`] owns the status, the configured/live/saved degree of
//! parallelism, the stop controller of the current run and the handle of its
//! run-loop task. Lifecycle calls are the only way to change status:
//!
//! ```text
//! Idle -start-> Running -pause-> Pausing -> Paused -resume-> Resuming -> Running
//! Running | Pausing | Paused | Resuming -stop-> Stopping -> Idle
//! any non-Idle -abort-> Stopping -> Idle
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::engine::{Collaborators, Engine, EngineSettings, RunShared};
use crate::core::{
    AdmissionPool, EngineError, EngineMetrics, MetricsSnapshot, RunStatus, Spawn, StatusCell,
    StopController, WorkExecutor,
};
use crate::runtime::TokioSpawner;

type RunHandle = Shared<BoxFuture<'static, Result<(), String>>>;

const STOPPABLE: &[RunStatus] = &[
    RunStatus::Running,
    RunStatus::Pausing,
    RunStatus::Paused,
    RunStatus::Resuming,
];

const ABORTABLE: &[RunStatus] = &[
    RunStatus::Running,
    RunStatus::Pausing,
    RunStatus::Paused,
    RunStatus::Resuming,
    RunStatus::Stopping,
];

/// Serializable view of a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Current status.
    pub status: RunStatus,
    /// Live degree of parallelism (configured value while idle).
    pub degree_of_parallelism: usize,
    /// DOP restored by the next resume.
    pub saved_degree_of_parallelism: usize,
    /// Ceiling.
    pub max_degree_of_parallelism: usize,
    /// Permits currently held.
    pub in_flight: usize,
    /// Progress fraction.
    pub progress: f64,
    /// Active run time in milliseconds.
    pub elapsed_ms: u128,
    /// Counters since the runner was built.
    pub metrics: MetricsSnapshot,
}

/// Lifecycle owner for runs of `W` over items of type `I`.
///
/// Construct one with [`crate::builders::RunnerBuilder`].
pub struct Runner<I, W, S = TokioSpawner> {
    config: EngineConfig,
    work: Arc<W>,
    spawner: S,
    shared: Arc<RunShared>,
    run: Mutex<Option<RunHandle>>,
    resize_lock: tokio::sync::Mutex<()>,
    _item: PhantomData<fn(I)>,
}

impl<I, W, S> Runner<I, W, S>
where
    I: Send + 'static,
    W: WorkExecutor<I>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(config: EngineConfig, work: W, spawner: S, hooks: Collaborators) -> Self {
        let shared = RunShared {
            status: StatusCell::new(),
            idle_dop: AtomicUsize::new(config.degree_of_parallelism),
            saved_dop: AtomicUsize::new(config.degree_of_parallelism),
            paused: AtomicBool::new(false),
            pool: Mutex::new(None),
            stop: Mutex::new(None),
            metrics: Arc::new(EngineMetrics::default()),
            hooks,
            generation: Mutex::new(0),
        };
        Self {
            config,
            work: Arc::new(work),
            spawner,
            shared: Arc::new(shared),
            run: Mutex::new(None),
            resize_lock: tokio::sync::Mutex::new(()),
            _item: PhantomData,
        }
    }

    /// Begin a run over `source` and return its id.
    ///
    /// The run loop is spawned on the ambient tokio runtime; this call does
    /// not wait for any item.
    pub fn start<T>(&self, source: T) -> Result<Uuid, EngineError>
    where
        T: IntoIterator<Item = I>,
        T::IntoIter: Send + 'static,
    {
        let shared = &self.shared;
        let run_id = Uuid::new_v4();
        // The run is fully installed before `Running` is visible to resize,
        // stop or abort.
        let (dop, generation) = shared.status.update(|status| {
            if *status != RunStatus::Idle {
                return Err(EngineError::InvalidTransition {
                    operation: "start",
                    status: *status,
                });
            }
            let dop = shared.idle_dop.load(Ordering::Acquire);
            let pool = Arc::new(AdmissionPool::new(
                dop,
                self.config.max_degree_of_parallelism,
                Arc::clone(&shared.metrics),
            ));
            let controller = StopController::new();
            let signal = controller.signal();

            *shared.pool.lock() = Some(Arc::clone(&pool));
            *shared.stop.lock() = Some(controller);
            shared.paused.store(false, Ordering::Release);
            shared.saved_dop.store(dop, Ordering::Release);
            shared.hooks.timer.reset();
            shared.hooks.timer.start();
            let generation = shared.next_generation(self.config.skip);

            let settings = EngineSettings {
                generation,
                skip: self.config.skip,
                batch_target: self.config.batch_target(),
                drain_poll: self.config.drain_poll_interval(),
                throttle_backoff: self.config.throttle_backoff(),
            };
            let engine = Engine::new(
                settings,
                pool,
                signal,
                Arc::clone(&self.work),
                self.spawner.clone(),
                Arc::clone(shared),
            );
            let task = tokio::spawn(
                engine
                    .run(Box::new(source.into_iter()))
                    .instrument(info_span!("run", %run_id)),
            );
            let handle: RunHandle = task
                .map(|joined| joined.map_err(|e| e.to_string()))
                .boxed()
                .shared();
            *self.run.lock() = Some(handle);

            *status = RunStatus::Running;
            Ok((dop, generation))
        })?;

        info!(
            %run_id,
            generation,
            dop,
            max = self.config.max_degree_of_parallelism,
            "run started"
        );
        Ok(run_id)
    }

    /// Quiesce the run: drive the DOP to zero, waiting for in-flight work.
    ///
    /// Fails with [`EngineError::InvalidTransition`] if the run ended or was
    /// stopped while quiescing.
    pub async fn pause(&self) -> Result<(), EngineError> {
        let _resizing = self.resize_lock.lock().await;
        self.shared
            .status
            .transition("pause", &[RunStatus::Running], RunStatus::Pausing)?;

        let current = self.degree_of_parallelism();
        self.shared.saved_dop.store(current, Ordering::Release);
        self.shared.paused.store(true, Ordering::Release);
        self.apply_to_pool(0).await;

        self.shared
            .status
            .transition("pause", &[RunStatus::Pausing], RunStatus::Paused)?;
        self.shared.hooks.timer.stop();
        info!(saved_dop = current, "run paused");
        Ok(())
    }

    /// Restore the DOP saved by [`Self::pause`].
    pub async fn resume(&self) -> Result<(), EngineError> {
        let _resizing = self.resize_lock.lock().await;
        self.shared
            .status
            .transition("resume", &[RunStatus::Paused], RunStatus::Resuming)?;

        let saved = self.shared.saved_dop.load(Ordering::Acquire);
        self.shared.paused.store(false, Ordering::Release);
        self.apply_to_pool(saved).await;

        self.shared
            .status
            .transition("resume", &[RunStatus::Resuming], RunStatus::Running)?;
        self.shared.hooks.timer.start();
        info!(dop = saved, "run resumed");
        Ok(())
    }

    /// Stop admitting items and wait for admitted ones to finish.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.shared
            .status
            .transition("stop", STOPPABLE, RunStatus::Stopping)?;
        if let Some(controller) = self.shared.stop.lock().as_ref() {
            controller.request_soft();
        }
        info!("stop requested");
        self.wait().await
    }

    /// Stop admitting items and tear down without waiting for stragglers.
    pub async fn abort(&self) -> Result<(), EngineError> {
        self.shared
            .status
            .transition("abort", ABORTABLE, RunStatus::Stopping)?;
        if let Some(controller) = self.shared.stop.lock().as_ref() {
            controller.request_hard();
        }
        info!("abort requested");
        self.wait().await
    }

    /// Change the degree of parallelism.
    ///
    /// While idle the value applies to the next start; while paused it
    /// replaces the saved value. Otherwise the live pool is resized: growth
    /// is immediate, and a decrease returns only once at most `dop` permits
    /// are held.
    pub async fn resize(&self, dop: usize) -> Result<(), EngineError> {
        let max = self.config.max_degree_of_parallelism;
        if dop > max {
            return Err(EngineError::DopOutOfRange { requested: dop, max });
        }
        let _resizing = self.resize_lock.lock().await;
        let shared = &self.shared;
        let live = shared.status.update(|status| {
            if *status == RunStatus::Idle {
                shared.idle_dop.store(dop, Ordering::Release);
                return None;
            }
            if shared.paused.load(Ordering::Acquire) {
                shared.saved_dop.store(dop, Ordering::Release);
                return None;
            }
            let pool = shared.pool.lock().clone();
            if pool.is_none() {
                shared.idle_dop.store(dop, Ordering::Release);
            }
            pool
        });

        if let Some(pool) = live {
            pool.resize(dop).await;
            shared.status.update(|_| {
                // Torn down mid-resize: teardown may have read the old capacity.
                if pool.is_closed() {
                    shared.idle_dop.store(dop, Ordering::Release);
                }
            });
        }
        info!(dop, "degree of parallelism set");
        Ok(())
    }

    /// Wait for the current run, if any, to tear down.
    pub async fn wait(&self) -> Result<(), EngineError> {
        let handle = self.run.lock().clone();
        match handle {
            Some(handle) => handle.await.map_err(EngineError::Join),
            None => Ok(()),
        }
    }

    async fn apply_to_pool(&self, dop: usize) {
        let pool = self.shared.pool.lock().clone();
        if let Some(pool) = pool {
            pool.resize(dop).await;
        }
    }
}

impl<I, W, S> Runner<I, W, S> {
    /// Current status.
    pub fn status(&self) -> RunStatus {
        self.shared.status.get()
    }

    /// Live DOP while a run exists, otherwise the DOP of the next start.
    pub fn degree_of_parallelism(&self) -> usize {
        self.shared.pool.lock().as_ref().map_or_else(
            || self.shared.idle_dop.load(Ordering::Acquire),
            |pool| pool.capacity(),
        )
    }

    /// DOP that the next resume restores.
    pub fn saved_degree_of_parallelism(&self) -> usize {
        self.shared.saved_dop.load(Ordering::Acquire)
    }

    /// Configured ceiling.
    pub const fn max_degree_of_parallelism(&self) -> usize {
        self.config.max_degree_of_parallelism
    }

    /// Permits currently held by the run loop and in-flight invocations.
    pub fn in_flight(&self) -> usize {
        self.shared
            .pool
            .lock()
            .as_ref()
            .map_or(0, |pool| pool.held())
    }

    /// Progress fraction reported by the progress tracker.
    pub fn progress(&self) -> f64 {
        self.shared.hooks.progress.fraction()
    }

    /// Active time of the current or last run.
    pub fn elapsed(&self) -> Duration {
        self.shared.hooks.timer.elapsed()
    }

    /// Counters since the runner was built.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Configuration this runner was built with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serializable view of the runner.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status(),
            degree_of_parallelism: self.degree_of_parallelism(),
            saved_degree_of_parallelism: self.saved_degree_of_parallelism(),
            max_degree_of_parallelism: self.max_degree_of_parallelism(),
            in_flight: self.in_flight(),
            progress: self.progress(),
            elapsed_ms: self.elapsed().as_millis(),
            metrics: self.metrics(),
        }
    }
}

impl<I, W, S> Drop for Runner<I, W, S> {
    fn drop(&mut self) {
        // Detached run loops must not keep waiting on stragglers.
        if let Some(controller) = self.shared.stop.lock().as_ref() {
            controller.request_hard();
        }
    }
}
