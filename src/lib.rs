//! # Prometheus DOP Engine
//!
//! A parallel work-dispatch engine with a live-adjustable degree of
//! parallelism (DOP).
//!
//! The engine pulls items from a possibly unbounded source and applies a
//! user-supplied async work function to each one, with at most DOP
//! invocations in flight. The DOP can be raised or lowered while a run is
//! active, and a run can be paused, resumed, stopped gracefully or aborted.
//!
//! ## Core Problem Solved
//!
//! Bulk jobs (link checks, crawls, batch API calls) need concurrency that an
//! operator can tune without restarting the job:
//!
//! - **Live Resizing**: Growing the DOP admits more work immediately; shrinking
//!   waits until in-flight work drops to the new limit
//! - **Pause Is Resize**: Pausing drives the DOP to zero and remembers it
//! - **Two-Tier Stop**: A soft stop lets admitted work finish, a hard stop
//!   abandons it
//! - **Item Isolation**: A failing or panicking item never ends the run
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -start-> Running -pause-> Pausing -> Paused -resume-> Resuming -> Running
//! Running | Pausing | Paused | Resuming -stop-> Stopping -> Idle
//! any non-Idle -abort-> Stopping -> Idle
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use prometheus_dop_engine::builders::RunnerBuilder;
//! use prometheus_dop_engine::config::EngineConfig;
//! use prometheus_dop_engine::core::{StopSignal, WorkExecutor};
//!
//! struct Checker;
//!
//! #[async_trait]
//! impl WorkExecutor<String> for Checker {
//!     async fn execute(&self, url: String, _stop: StopSignal) -> anyhow::Result<()> {
//!         check(&url).await
//!     }
//! }
//!
//! let runner = RunnerBuilder::new(
//!     EngineConfig::new()
//!         .with_max_degree_of_parallelism(32)
//!         .with_degree_of_parallelism(8),
//!     Checker,
//! )
//! .build()?;
//!
//! runner.start(urls)?;
//! runner.resize(16).await?;
//! runner.pause().await?;
//! runner.resume().await?;
//! runner.wait().await?;
//! ```
//!
//! For complete scenarios, see `tests/runner_lifecycle_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: admission, lifecycle and the run loop.
pub mod core;
/// Configuration models for the engine.
pub mod config;
/// Builders to construct runners from configuration.
pub mod builders;
/// Runtime adapters for spawning work invocations.
pub mod runtime;
/// Shared utilities.
pub mod util;
