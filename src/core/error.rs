//! # Error Handling Module
//!
//! Error types for the balancing engine, built on `thiserror`.
//!
//! Propagation policy: selection-path errors are returned to the caller and
//! never panic; errors inside the background loops are logged and recovered
//! locally (the loops sleep briefly and continue), so they never surface to
//! callers of `select_node`.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Errors produced by the balancing engine.
#[derive(Debug, Error, Clone)]
pub enum BalancerError {
    /// The candidate list passed to `select_node` was empty.
    #[error("no nodes available for selection")]
    NoNodesAvailable,

    /// The node registry or enrichment source could not be read.
    ///
    /// Recovered inside the metrics loop: the cycle continues with stale or
    /// partial data and the failure only degrades metric quality.
    #[error("metrics collection failed: {message}")]
    MetricsCollection { message: String },

    /// A strategy identifier had no registered implementation.
    #[error("unknown balancing strategy: {name}")]
    UnknownStrategy { name: String },

    /// One or more background loops did not stop within the shutdown wait.
    #[error("shutdown timed out waiting for background loop: {loop_name}")]
    ShutdownTimeout { loop_name: String },
}

impl BalancerError {
    /// True when the error is recoverable inside a background loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BalancerError::MetricsCollection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            BalancerError::NoNodesAvailable.to_string(),
            "no nodes available for selection"
        );
        let err = BalancerError::MetricsCollection {
            message: "registry unreachable".to_string(),
        };
        assert!(err.to_string().contains("registry unreachable"));
        assert!(err.is_recoverable());
        assert!(!BalancerError::NoNodesAvailable.is_recoverable());
    }
}
