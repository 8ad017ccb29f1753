//! Error taxonomy for the job service.
//!
//! Four failure families with different propagation rules: transport
//! and timeout errors are fatal to the current request and never
//! retried automatically; computation errors are recorded and relayed
//! without crashing the server; silent child death is reported
//! separately from a caught computation failure because no structured
//! error record was ever produced.

use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between dispatch and terminal state.
#[derive(Debug, Error)]
pub enum AxonError {
    /// The channel store or task queue is unreachable.
    #[error("transport: {0}")]
    Transport(String),

    /// The job exceeded its overall allowed duration.
    #[error("timed out after {waited:?}")]
    Timeout { waited: Duration },

    /// A worker or fan-out child failed inside the computation.
    #[error("computation failed ({kind}): {message}")]
    Computation { kind: String, message: String },

    /// Children exited without signaling completion.
    #[error("{completed} of {expected} workers completed; the rest died without a sentinel")]
    ChildrenDied { expected: usize, completed: usize },

    /// The channel is missing or idle past its TTL.
    #[error("channel {0} expired or was never written")]
    Expired(String),

    /// A write arrived after the terminal marker.
    #[error("channel already closed")]
    Closed,
}

impl AxonError {
    /// Build a computation error from anything displayable.
    pub fn computation(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AxonError::Computation {
            kind: kind.into(),
            message: err.to_string(),
        }
    }

    /// Whether this is the distinct timeout family (not a computation
    /// failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, AxonError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_not_computation() {
        let e = AxonError::Timeout {
            waited: Duration::from_secs(5),
        };
        assert!(e.is_timeout());
        let e = AxonError::computation("numeric", "diverged");
        assert!(!e.is_timeout());
    }

    #[test]
    fn display_strings() {
        let e = AxonError::ChildrenDied {
            expected: 4,
            completed: 2,
        };
        assert!(e.to_string().contains("2 of 4"));
    }
}
