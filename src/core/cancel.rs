//! Two-tier stop signalling.
//!
//! A run carries a single monotonic [`StopLevel`] instead of two independent
//! flags, so a hard stop always implies a soft one. The [`StopController`] is
//! owned by the control plane; [`StopSignal`] handles are cheap clones handed
//! to the run loop and to every work invocation.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// How far a run has been asked to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLevel {
    /// No stop requested.
    Running,
    /// Stop admitting new items; let in-flight work finish.
    SoftStopRequested,
    /// Additionally stop waiting for in-flight work.
    HardStopRequested,
}

/// Owner side of the stop state. Levels only ever increase.
#[derive(Debug)]
pub struct StopController {
    tx: watch::Sender<StopLevel>,
}

impl Default for StopController {
    fn default() -> Self {
        Self::new()
    }
}

impl StopController {
    /// Create a controller at [`StopLevel::Running`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StopLevel::Running);
        Self { tx }
    }

    /// A signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request a cooperative stop.
    pub fn request_soft(&self) {
        self.raise(StopLevel::SoftStopRequested);
    }

    /// Request an immediate stop.
    pub fn request_hard(&self) {
        self.raise(StopLevel::HardStopRequested);
    }

    /// Current level.
    #[must_use]
    pub fn level(&self) -> StopLevel {
        *self.tx.borrow()
    }

    fn raise(&self, level: StopLevel) {
        self.tx.send_if_modified(|current| {
            if level > *current {
                *current = level;
                true
            } else {
                false
            }
        });
    }
}

/// Observer side of the stop state.
///
/// Work functions receive one of these and may honour it; the engine never
/// cancels an invocation on its own.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<StopLevel>,
}

impl StopSignal {
    /// Current level.
    #[must_use]
    pub fn level(&self) -> StopLevel {
        *self.rx.borrow()
    }

    /// Whether at least a soft stop was requested.
    #[must_use]
    pub fn is_soft_requested(&self) -> bool {
        self.level() >= StopLevel::SoftStopRequested
    }

    /// Whether a hard stop was requested.
    #[must_use]
    pub fn is_hard_requested(&self) -> bool {
        self.level() >= StopLevel::HardStopRequested
    }

    /// Resolve once at least a soft stop is requested.
    pub async fn soft_requested(&self) {
        self.reached(StopLevel::SoftStopRequested).await;
    }

    /// Resolve once a hard stop is requested.
    pub async fn hard_requested(&self) {
        self.reached(StopLevel::HardStopRequested).await;
    }

    async fn reached(&self, level: StopLevel) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|current| *current >= level).await.is_err() {
            // Controller disposed without reaching `level`: never resolves.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_levels_are_monotonic() {
        let controller = StopController::new();
        let signal = controller.signal();
        assert_eq!(signal.level(), StopLevel::Running);

        controller.request_hard();
        assert!(signal.is_hard_requested());
        assert!(signal.is_soft_requested());

        controller.request_soft();
        assert_eq!(controller.level(), StopLevel::HardStopRequested);
    }

    #[tokio::test]
    async fn test_soft_wait_resolves_on_hard() {
        let controller = StopController::new();
        let signal = controller.signal();
        let waiter = tokio::spawn(async move { signal.soft_requested().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.request_hard();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("soft wait should resolve")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn test_hard_wait_ignores_soft() {
        let controller = StopController::new();
        let signal = controller.signal();
        controller.request_soft();
        let waited =
            tokio::time::timeout(Duration::from_millis(30), signal.hard_requested()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_dropped_controller_never_resolves() {
        let controller = StopController::new();
        let signal = controller.signal();
        drop(controller);
        let waited =
            tokio::time::timeout(Duration::from_millis(30), signal.soft_requested()).await;
        assert!(waited.is_err());
        assert_eq!(signal.level(), StopLevel::Running);
    }
}
