//! # Tracker Errors
//!
//! Top-level error type for the tracker and its tick loop.
//!
//! Only two kinds of failure stop the loop: invalid configuration (before it
//! starts) and an invariant violation (a programming error). Adapter outages
//! and recorder failures are recovered inside the loop and counted in its
//! [`RunReport`](crate::runner::RunReport); they never appear here.

use presence_core::ValidationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from the presence tracker and tick loop.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tracking table reached a state the state machine cannot produce.
    /// Fatal: the loop aborts rather than guessing a repair.
    #[error("invariant violation at tick {tick}: {detail}")]
    InvariantViolation {
        /// Tick during which the violation was detected.
        tick: u64,
        /// What was found.
        detail: String,
    },
}

impl TrackerError {
    /// Whether the error must not be retried or swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. } | Self::Config(_))
    }

    pub(crate) fn invariant(tick: u64, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            tick,
            detail: detail.into(),
        }
    }

    pub(crate) fn from_validation(tick: u64, err: ValidationError) -> Self {
        Self::invariant(tick, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violation_is_fatal() {
        let err = TrackerError::invariant(7, "duplicate open state for alice");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "invariant violation at tick 7: duplicate open state for alice"
        );
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = TrackerError::from(ConfigError::ZeroThreshold(0));
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("configuration error"));
    }
}
