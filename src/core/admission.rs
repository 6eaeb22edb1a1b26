//! Resizable admission pool.
//!
//! Wraps a fair tokio [`Semaphore`] whose total permit count always equals the
//! live degree of parallelism. Permits are detached from the semaphore on
//! acquisition and tracked by hand so that a resize can add or retire permits
//! while invocations that hold them are still running.
//!
//! - Growing adds permits immediately.
//! - Shrinking raises a flag the run loop honours by shedding fresh permits,
//!   then retires permits one by one as running work releases them. The call
//!   returns only once the pool actually shrank.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::core::{EngineError, EngineMetrics, StopSignal};

/// Counting permit set sized to the live DOP with a hard ceiling.
#[derive(Debug)]
pub struct AdmissionPool {
    semaphore: Semaphore,
    ceiling: usize,
    capacity: AtomicUsize,
    held: AtomicUsize,
    shrinking: AtomicBool,
    metrics: Arc<EngineMetrics>,
}

impl AdmissionPool {
    /// Create a pool with `capacity` permits, clamped to `ceiling`.
    pub fn new(capacity: usize, ceiling: usize, metrics: Arc<EngineMetrics>) -> Self {
        let capacity = capacity.min(ceiling);
        Self {
            semaphore: Semaphore::new(capacity),
            ceiling,
            capacity: AtomicUsize::new(capacity),
            held: AtomicUsize::new(0),
            shrinking: AtomicBool::new(false),
            metrics,
        }
    }

    /// Live capacity (the live DOP).
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Absolute ceiling.
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Permits currently held by the run loop and in-flight invocations.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Permits free for acquisition right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Whether a decrease is in flight.
    pub fn is_shrinking(&self) -> bool {
        self.shrinking.load(Ordering::Acquire)
    }

    /// Whether every permit handed out has come back.
    pub fn is_quiescent(&self) -> bool {
        self.held() == 0
    }

    /// Wait for a permit, giving up once a soft stop is requested.
    ///
    /// Returns `Ok(None)` when the wait was abandoned because of the stop
    /// signal and [`EngineError::PoolClosed`] if the pool was disposed.
    pub async fn acquire(
        self: &Arc<Self>,
        stop: &StopSignal,
    ) -> Result<Option<AdmissionPermit>, EngineError> {
        tokio::select! {
            biased;
            () = stop.soft_requested() => Ok(None),
            acquired = self.semaphore.acquire() => {
                let permit = acquired.map_err(|_| EngineError::PoolClosed)?;
                permit.forget();
                self.held.fetch_add(1, Ordering::AcqRel);
                EngineMetrics::bump(&self.metrics.permits_acquired);
                Ok(Some(AdmissionPermit {
                    pool: Arc::clone(self),
                }))
            }
        }
    }

    /// Change the capacity to `target`.
    ///
    /// Equal values touch nothing. Increases take effect immediately.
    /// Decreases block until enough running work has released its permits;
    /// if the pool is closed meanwhile the call returns early.
    pub async fn resize(&self, target: usize) {
        let target = target.min(self.ceiling);
        let current = self.capacity();
        match target.cmp(&current) {
            CmpOrdering::Equal => {}
            CmpOrdering::Greater => {
                self.semaphore.add_permits(target - current);
                self.capacity.store(target, Ordering::Release);
                debug!(from = current, to = target, "admission pool grown");
            }
            CmpOrdering::Less => {
                let mut guard = ShrinkGuard {
                    pool: self,
                    from: current,
                    retired: 0,
                };
                self.shrinking.store(true, Ordering::Release);
                while guard.retired < current - target {
                    match self.semaphore.acquire().await {
                        Ok(permit) => {
                            permit.forget();
                            guard.retired += 1;
                        }
                        Err(_) => {
                            debug!("admission pool closed during shrink");
                            break;
                        }
                    }
                }
                debug!(from = current, to = target, "admission pool shrunk");
            }
        }
    }

    /// Dispose the pool: wakes pending acquisitions and shrinks with an error.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether [`Self::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    fn release(&self) {
        self.held.fetch_sub(1, Ordering::AcqRel);
        self.semaphore.add_permits(1);
        EngineMetrics::bump(&self.metrics.permits_released);
    }
}

/// Clears the decrease flag and publishes the capacity reached so far, even
/// when the shrinking future is dropped part-way.
struct ShrinkGuard<'a> {
    pool: &'a AdmissionPool,
    from: usize,
    retired: usize,
}

impl Drop for ShrinkGuard<'_> {
    fn drop(&mut self) {
        self.pool
            .capacity
            .store(self.from - self.retired, Ordering::Release);
        self.pool.shrinking.store(false, Ordering::Release);
    }
}

/// One unit of admission. Released back to its pool exactly once, on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    pool: Arc<AdmissionPool>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StopController;
    use std::time::Duration;

    fn pool(capacity: usize, ceiling: usize) -> Arc<AdmissionPool> {
        Arc::new(AdmissionPool::new(
            capacity,
            ceiling,
            Arc::new(EngineMetrics::default()),
        ))
    }

    #[tokio::test]
    async fn test_acquire_and_release_on_drop() {
        let pool = pool(2, 4);
        let stop = StopController::new();
        let signal = stop.signal();

        let a = pool.acquire(&signal).await.unwrap().unwrap();
        let b = pool.acquire(&signal).await.unwrap().unwrap();
        assert_eq!(pool.held(), 2);
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.held(), 1);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert!(pool.is_quiescent());
        assert_eq!(pool.metrics.snapshot().permits_released, 2);
    }

    #[tokio::test]
    async fn test_acquire_abandoned_on_soft_stop() {
        let pool = pool(0, 4);
        let stop = StopController::new();
        let signal = stop.signal();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(&signal).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.request_soft();

        let outcome = waiter.await.unwrap().unwrap();
        assert!(outcome.is_none());
        assert_eq!(pool.held(), 0);
    }

    #[tokio::test]
    async fn test_grow_adds_exact_permits() {
        let pool = pool(3, 5);
        pool.resize(5).await;
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.available(), 5);

        // Clamped to the ceiling.
        pool.resize(9).await;
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.available(), 5);
    }

    #[tokio::test]
    async fn test_resize_to_same_value_is_noop() {
        let pool = pool(3, 5);
        let stop = StopController::new();
        let held = pool.acquire(&stop.signal()).await.unwrap().unwrap();

        pool.resize(3).await;
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.held(), 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_shrink_waits_for_release() {
        let pool = pool(2, 4);
        let stop = StopController::new();
        let signal = stop.signal();
        let a = pool.acquire(&signal).await.unwrap().unwrap();
        let b = pool.acquire(&signal).await.unwrap().unwrap();

        let shrinker = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.resize(0).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.is_shrinking());
        assert!(!shrinker.is_finished());

        drop(a);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!shrinker.is_finished());

        drop(b);
        tokio::time::timeout(Duration::from_secs(1), shrinker)
            .await
            .expect("shrink should finish")
            .unwrap();
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.available(), 0);
        assert!(!pool.is_shrinking());
        assert!(pool.is_quiescent());
    }

    #[tokio::test]
    async fn test_close_unblocks_shrink() {
        let pool = pool(1, 1);
        let stop = StopController::new();
        let held = pool.acquire(&stop.signal()).await.unwrap().unwrap();

        let shrinker = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.resize(0).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pool.is_closed());
        pool.close();
        assert!(pool.is_closed());
        tokio::time::timeout(Duration::from_secs(1), shrinker)
            .await
            .expect("close should unblock shrink")
            .unwrap();
        assert!(!pool.is_shrinking());
        drop(held);
    }

    #[tokio::test]
    async fn test_acquire_on_closed_pool_errors() {
        let pool = pool(1, 1);
        pool.close();
        let stop = StopController::new();
        let err = pool.acquire(&stop.signal()).await.unwrap_err();
        assert!(matches!(err, EngineError::PoolClosed));
    }
}
