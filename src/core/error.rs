//! Error types for engine and lifecycle operations.

use thiserror::Error;

use crate::core::RunStatus;

/// Errors produced by the engine and its control plane.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A lifecycle operation was called from a status that does not allow it.
    #[error("cannot {operation} while {status}")]
    InvalidTransition {
        /// Name of the rejected lifecycle operation.
        operation: &'static str,
        /// Status observed when the call was made.
        status: RunStatus,
    },
    /// A requested degree of parallelism is above the configured ceiling.
    #[error("degree of parallelism {requested} exceeds maximum {max}")]
    DopOutOfRange {
        /// Value passed by the caller.
        requested: usize,
        /// Configured ceiling.
        max: usize,
    },
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The admission pool was disposed while the loop still needed it.
    #[error("admission pool closed")]
    PoolClosed,
    /// A panic escaped the run loop or the item source.
    #[error("run loop panicked: {0}")]
    Panicked(String),
    /// The run-loop task could not be joined.
    #[error("run loop join failed: {0}")]
    Join(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = EngineError::InvalidTransition {
            operation: "pause",
            status: RunStatus::Idle,
        };
        assert_eq!(err.to_string(), "cannot pause while idle");
    }

    #[test]
    fn test_dop_out_of_range_display() {
        let err = EngineError::DopOutOfRange { requested: 9, max: 4 };
        assert_eq!(
            err.to_string(),
            "degree of parallelism 9 exceeds maximum 4"
        );
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
