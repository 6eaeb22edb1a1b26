//! Engine diagnostics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Permits handed to the run loop.
    pub permits_acquired: u64,
    /// Permits given back to the pool.
    pub permits_released: u64,
    /// Permits returned unused because a decrease was in flight.
    pub permits_shed: u64,
    /// Permits returned unused because the throughput gate was limited.
    pub throttled_retries: u64,
    /// Work invocations launched.
    pub items_dispatched: u64,
    /// Invocations that returned `Ok`.
    pub items_succeeded: u64,
    /// Invocations that returned an error or panicked.
    pub items_failed: u64,
}

/// Lock-free counters shared by the run loop, completions and resizes.
///
/// Purely observational; nothing in the engine reads them for decisions.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub(crate) permits_acquired: AtomicU64,
    pub(crate) permits_released: AtomicU64,
    pub(crate) permits_shed: AtomicU64,
    pub(crate) throttled_retries: AtomicU64,
    pub(crate) items_dispatched: AtomicU64,
    pub(crate) items_succeeded: AtomicU64,
    pub(crate) items_failed: AtomicU64,
}

impl EngineMetrics {
    /// Get a snapshot of current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            permits_acquired: self.permits_acquired.load(Ordering::Relaxed),
            permits_released: self.permits_released.load(Ordering::Relaxed),
            permits_shed: self.permits_shed.load(Ordering::Relaxed),
            throttled_retries: self.throttled_retries.load(Ordering::Relaxed),
            items_dispatched: self.items_dispatched.load(Ordering::Relaxed),
            items_succeeded: self.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = EngineMetrics::default();
        metrics.permits_acquired.fetch_add(10, Ordering::Relaxed);
        metrics.permits_released.fetch_add(9, Ordering::Relaxed);
        EngineMetrics::bump(&metrics.items_failed);

        let snap = metrics.snapshot();
        assert_eq!(snap.permits_acquired, 10);
        assert_eq!(snap.permits_released, 9);
        assert_eq!(snap.items_failed, 1);
        assert_eq!(snap.items_succeeded, 0);
    }

    #[test]
    fn test_snapshot_default() {
        assert_eq!(EngineMetrics::default().snapshot(), MetricsSnapshot::default());
    }
}
