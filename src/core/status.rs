//! Lifecycle status of a run.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// Lifecycle state of the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run in progress.
    Idle,
    /// Items are being admitted.
    Running,
    /// Quiescing in-flight work on the way to `Paused`.
    Pausing,
    /// Admission capacity is zero; the run is held.
    Paused,
    /// Restoring the saved degree of parallelism.
    Resuming,
    /// A stop or abort is waiting for teardown.
    Stopping,
}

impl RunStatus {
    /// Whether a run exists in this status (everything but `Idle`).
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Shared status storage with checked transitions.
#[derive(Debug)]
pub struct StatusCell {
    inner: Mutex<RunStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    /// Create a cell in `Idle`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RunStatus::Idle),
        }
    }

    /// Current status.
    pub fn get(&self) -> RunStatus {
        *self.inner.lock()
    }

    /// Overwrite the status unconditionally.
    pub fn set(&self, status: RunStatus) {
        *self.inner.lock() = status;
    }

    /// Run `f` with exclusive access to the status.
    ///
    /// Lifecycle steps that must not interleave with a status change (publishing
    /// a run's pool, tearing it down) happen inside `f`.
    pub fn update<R>(&self, f: impl FnOnce(&mut RunStatus) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Move to `next` if the current status is one of `from`.
    ///
    /// Returns the previous status on success; on failure the status is left
    /// untouched and the error names `operation`.
    pub fn transition(
        &self,
        operation: &'static str,
        from: &[RunStatus],
        next: RunStatus,
    ) -> Result<RunStatus, EngineError> {
        self.update(|status| {
            let current = *status;
            if !from.contains(&current) {
                return Err(EngineError::InvalidTransition {
                    operation,
                    status: current,
                });
            }
            *status = next;
            Ok(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_from_allowed_status() {
        let cell = StatusCell::new();
        let prev = cell
            .transition("start", &[RunStatus::Idle], RunStatus::Running)
            .unwrap();
        assert_eq!(prev, RunStatus::Idle);
        assert_eq!(cell.get(), RunStatus::Running);
    }

    #[test]
    fn test_transition_rejected_leaves_status() {
        let cell = StatusCell::new();
        let err = cell
            .transition("resume", &[RunStatus::Paused], RunStatus::Resuming)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                operation: "resume",
                status: RunStatus::Idle
            }
        ));
        assert_eq!(cell.get(), RunStatus::Idle);
    }

    #[test]
    fn test_update_sees_and_sets_status() {
        let cell = StatusCell::new();
        let seen = cell.update(|status| {
            let seen = *status;
            *status = RunStatus::Stopping;
            seen
        });
        assert_eq!(seen, RunStatus::Idle);
        assert_eq!(cell.get(), RunStatus::Stopping);
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&RunStatus::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        assert!(RunStatus::Paused.is_active());
        assert!(!RunStatus::Idle.is_active());
    }
}
