//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while initialising telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The log filter could not be parsed.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// The rejected filter directive.
        filter: String,
        /// Parser message.
        reason: String,
    },
}
