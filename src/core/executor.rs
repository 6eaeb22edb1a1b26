//! Work function and spawning abstractions.

use std::future::Future;

use async_trait::async_trait;

use crate::core::StopSignal;

/// The user-supplied work function applied to every item of a run.
///
/// Invocations run concurrently, up to the live degree of parallelism. A
/// returned error (or a panic) is isolated to its item: it is recorded by the
/// progress tracker and the run carries on.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_dop_engine::core::{StopSignal, WorkExecutor};
///
/// struct UrlChecker {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl WorkExecutor<String> for UrlChecker {
///     async fn execute(&self, url: String, stop: StopSignal) -> anyhow::Result<()> {
///         if stop.is_hard_requested() {
///             return Ok(());
///         }
///         self.client.head(&url).send().await?.error_for_status()?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WorkExecutor<I>: Send + Sync + 'static
where
    I: Send + 'static,
{
    /// Process one item.
    ///
    /// `stop` reflects the run's stop level; honouring it is optional.
    async fn execute(&self, item: I, stop: StopSignal) -> anyhow::Result<()>;
}

/// Abstraction for spawning work invocations on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
