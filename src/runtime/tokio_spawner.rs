//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::Spawn;

/// Tokio-based spawner for work invocations.
///
/// The default instance spawns onto whichever runtime is current at the time
/// of the call; [`TokioSpawner::new`] pins invocations to a specific runtime.
#[derive(Clone, Default)]
pub struct TokioSpawner {
    handle: Option<Arc<tokio::runtime::Handle>>,
}

impl TokioSpawner {
    /// Create a spawner bound to a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Some(Arc::new(handle)),
        }
    }

    /// Create a spawner bound to the current runtime.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.handle {
            Some(handle) => {
                handle.spawn(fut);
            }
            None => {
                tokio::spawn(fut);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_spawner_spawn() {
        let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn(async move {
            tx.send(123).unwrap();
        });

        let result = rx.await.expect("oneshot result");
        assert_eq!(result, 123);
    }

    #[tokio::test]
    async fn test_default_spawner_uses_ambient_runtime() {
        let spawner = TokioSpawner::default();
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn(async move {
            tx.send("ok").unwrap();
        });
        assert_eq!(rx.await.expect("oneshot result"), "ok");
        assert!(TokioSpawner::try_current().is_some());
    }
}
