//! Checks-per-minute throughput gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::ThroughputGate;

const WINDOW: Duration = Duration::from_secs(60);

/// Limits dispatches to `limit` within any sliding 60-second window.
#[derive(Debug)]
pub struct PerMinuteGate {
    limit: u32,
    window: Duration,
    dispatches: Mutex<VecDeque<Instant>>,
    current_rate: AtomicU32,
}

impl PerMinuteGate {
    /// Gate allowing `limit` dispatches per minute.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    /// Gate with a custom window length.
    #[must_use]
    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            dispatches: Mutex::new(VecDeque::new()),
            current_rate: AtomicU32::new(0),
        }
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Dispatch count inside the window as of the last refresh.
    pub fn current_rate(&self) -> u32 {
        self.current_rate.load(Ordering::Relaxed)
    }

    fn prune(&self, dispatches: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = dispatches.front() {
            if now.duration_since(*oldest) < self.window {
                break;
            }
            dispatches.pop_front();
        }
    }
}

impl ThroughputGate for PerMinuteGate {
    fn is_limited(&self) -> bool {
        let now = Instant::now();
        let mut dispatches = self.dispatches.lock();
        self.prune(&mut dispatches, now);
        dispatches.len() >= self.limit as usize
    }

    fn update(&self) {
        let now = Instant::now();
        let mut dispatches = self.dispatches.lock();
        self.prune(&mut dispatches, now);
        let rate = u32::try_from(dispatches.len()).unwrap_or(u32::MAX);
        self.current_rate.store(rate, Ordering::Relaxed);
        debug!(rate, limit = self.limit, "throughput gate refreshed");
    }

    fn record_dispatch(&self) {
        let mut dispatches = self.dispatches.lock();
        dispatches.push_back(Instant::now());
        let rate = u32::try_from(dispatches.len()).unwrap_or(u32::MAX);
        self.current_rate.store(rate, Ordering::Relaxed);
    }
}
