//! Core scheduling abstractions: admission, lifecycle and the run loop.

pub mod admission;
pub mod batch;
pub mod cancel;
pub(crate) mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod metrics;
pub mod runner;
pub mod status;
pub mod throttle;

pub use admission::{AdmissionPermit, AdmissionPool};
pub use batch::{BatchQueue, ItemSource};
pub use cancel::{StopController, StopLevel, StopSignal};
pub use error::{AppResult, EngineError};
pub use executor::{Spawn, WorkExecutor};
pub use hooks::{
    ItemOutcome, ProgressCounter, ProgressTracker, RunReporter, RunTimer, Stopwatch,
    ThroughputGate, TracingReporter, Unthrottled,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use runner::{RunSnapshot, Runner};
pub use status::{RunStatus, StatusCell};
pub use throttle::PerMinuteGate;
