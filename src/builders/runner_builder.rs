//! Builder assembling a [`Runner`] from configuration and collaborators.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::engine::Collaborators;
use crate::core::{
    EngineError, PerMinuteGate, ProgressCounter, ProgressTracker, RunReporter, RunTimer, Runner,
    Spawn, Stopwatch, ThroughputGate, TracingReporter, Unthrottled, WorkExecutor,
};
use crate::runtime::TokioSpawner;

/// Builder for [`Runner`].
///
/// Collaborators left unset fall back to [`ProgressCounter`] (sized from
/// `total_items`), [`PerMinuteGate`] when `checks_per_minute` is set or
/// [`Unthrottled`] otherwise, [`TracingReporter`] and [`Stopwatch`].
///
/// ```rust,ignore
/// use prometheus_dop_engine::builders::RunnerBuilder;
/// use prometheus_dop_engine::config::EngineConfig;
///
/// let runner = RunnerBuilder::new(
///     EngineConfig::new()
///         .with_max_degree_of_parallelism(16)
///         .with_degree_of_parallelism(4),
///     my_work,
/// )
/// .build()?;
/// runner.start(items)?;
/// ```
pub struct RunnerBuilder<I, W, S = TokioSpawner> {
    config: EngineConfig,
    work: W,
    spawner: S,
    progress: Option<Arc<dyn ProgressTracker>>,
    gate: Option<Arc<dyn ThroughputGate>>,
    reporter: Option<Arc<dyn RunReporter>>,
    timer: Option<Arc<dyn RunTimer>>,
    _item: PhantomData<fn(I)>,
}

impl<I, W> RunnerBuilder<I, W, TokioSpawner>
where
    I: Send + 'static,
    W: WorkExecutor<I>,
{
    /// Start a builder for `work` with `config`.
    pub fn new(config: EngineConfig, work: W) -> Self {
        Self {
            config,
            work,
            spawner: TokioSpawner::default(),
            progress: None,
            gate: None,
            reporter: None,
            timer: None,
            _item: PhantomData,
        }
    }
}

impl<I, W, S> RunnerBuilder<I, W, S>
where
    I: Send + 'static,
    W: WorkExecutor<I>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Use a custom progress tracker.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use a custom throughput gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ThroughputGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Use a custom reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Use a custom timer.
    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn RunTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Dispatch work invocations through `spawner`.
    pub fn with_spawner<S2>(self, spawner: S2) -> RunnerBuilder<I, W, S2>
    where
        S2: Spawn + Clone + Send + Sync + 'static,
    {
        RunnerBuilder {
            config: self.config,
            work: self.work,
            spawner,
            progress: self.progress,
            gate: self.gate,
            reporter: self.reporter,
            timer: self.timer,
            _item: PhantomData,
        }
    }

    /// Validate the configuration and build the runner.
    pub fn build(self) -> Result<Runner<I, W, S>, EngineError> {
        self.config
            .validate()
            .map_err(EngineError::InvalidConfig)?;

        let progress = self.progress.unwrap_or_else(|| {
            Arc::new(ProgressCounter::new(self.config.total_items)) as Arc<dyn ProgressTracker>
        });
        let gate = self.gate.unwrap_or_else(|| match self.config.checks_per_minute {
            Some(limit) => Arc::new(PerMinuteGate::new(limit)) as Arc<dyn ThroughputGate>,
            None => Arc::new(Unthrottled),
        });
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter) as Arc<dyn RunReporter>);
        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(Stopwatch::new()) as Arc<dyn RunTimer>);

        let hooks = Collaborators {
            progress,
            gate,
            reporter,
            timer,
        };
        Ok(Runner::new(self.config, self.work, self.spawner, hooks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunStatus, StopSignal};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl WorkExecutor<u32> for Noop {
        async fn execute(&self, _item: u32, _stop: StopSignal) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = EngineConfig::new()
            .with_max_degree_of_parallelism(2)
            .with_degree_of_parallelism(3);
        let err = RunnerBuilder::<u32, _>::new(config, Noop).build().err().unwrap();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_defaults() {
        let config = EngineConfig::new()
            .with_max_degree_of_parallelism(4)
            .with_degree_of_parallelism(2)
            .with_total_items(10);
        let runner = RunnerBuilder::<u32, _>::new(config, Noop).build().unwrap();
        assert_eq!(runner.status(), RunStatus::Idle);
        assert_eq!(runner.degree_of_parallelism(), 2);
        assert_eq!(runner.max_degree_of_parallelism(), 4);
        assert_eq!(runner.in_flight(), 0);
        assert!(runner.progress().abs() < f64::EPSILON);
    }
}
