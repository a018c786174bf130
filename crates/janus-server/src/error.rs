//! Server error types.

use janus_core::JanusError;
use thiserror::Error;

/// Errors raised while starting, running or stopping a server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// The address that failed to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Registration or build failed.
    #[error(transparent)]
    Build(#[from] JanusError),

    /// One or more lifecycle hooks failed.
    #[error("{phase} hooks failed: {}", failures.join("; "))]
    Hooks {
        /// `enter` or `exit`.
        phase: &'static str,
        /// One message per failed service.
        failures: Vec<String>,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The current state.
        state: String,
    },
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
