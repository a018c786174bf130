//! Error types for Janus.
//!
//! [`JanusError`] is the single error type that crosses every seam of the
//! framework: the coercion engine, the render registry, the service registry
//! and user targets all report through it. The dispatcher translates it into
//! a response in exactly one place, using [`ErrorKind`] to decide how.
//!
//! # Application error codes
//!
//! | Code | Meaning |
//! |---|---|
//! | `100101` | missing required field |
//! | `100102` | unexpected or invalid field |
//! | `100103` | invalid request content |
//! | `100000` | unclassified internal error |
//!
//! Application errors raised by user code carry their own code and HTTP
//! status.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`JanusError`].
pub type JanusResult<T> = Result<T, JanusError>;

/// Code reported for a missing required field.
pub const CODE_PARAM_LACK: i64 = 100_101;

/// Code reported for an unexpected or uncastable field.
pub const CODE_PARAM_INVALID: i64 = 100_102;

/// Code reported for a request body that cannot be parsed.
pub const CODE_CONTENT_INVALID: i64 = 100_103;

/// Code reported for anything the framework does not recognize.
pub const CODE_INTERNAL: i64 = 100_000;

/// Closed classification of every [`JanusError`].
///
/// The dispatcher matches on this instead of on individual variants, so every
/// caller handles the same small set of outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid parameters, invalid request content.
    Validation,
    /// An error raised by user code with an explicit public message.
    Application,
    /// Any other failure raised while invoking a target.
    Invocation,
    /// Registration or configuration failure. Fatal at startup.
    Configuration,
}

impl ErrorKind {
    /// Returns `true` if errors of this kind carry a message safe to show
    /// callers.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self, Self::Validation | Self::Application)
    }
}

/// Standard error type for Janus.
///
/// # Example
///
/// ```
/// use janus_core::{JanusError, ErrorKind};
///
/// let err = JanusError::param_lack("b");
/// assert_eq!(err.kind(), ErrorKind::Validation);
/// assert_eq!(err.code(), 100101);
/// assert_eq!(err.to_string(), "field `b` must be assiged");
/// ```
#[derive(Error, Debug)]
pub enum JanusError {
    /// A required parameter was not supplied.
    #[error("field `{field}` must be assiged")]
    ParamLack {
        /// Name of the missing parameter.
        field: String,
    },

    /// A parameter was not declared, or its value could not be converted.
    #[error("{message}")]
    ParamInvalid {
        /// Name of the offending parameter.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// The request body could not be parsed.
    #[error("invalid request content: {message}")]
    ContentInvalid {
        /// Human-readable explanation.
        message: String,
    },

    /// An error raised by user code with a public code and message.
    #[error("{message}")]
    Application {
        /// Application-level error code.
        code: i64,
        /// Public message.
        message: String,
        /// HTTP status reported with the error.
        status: StatusCode,
    },

    /// An unclassified failure.
    #[error("{message}")]
    Internal {
        /// Human-readable explanation.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Invalid registration or configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable explanation.
        message: String,
    },

    /// A render key was registered twice in one collection.
    #[error("{role} render `{name}` is already registered")]
    DuplicateRender {
        /// The render collection (request, response or error).
        role: &'static str,
        /// The duplicated key.
        name: String,
    },

    /// A render key was looked up but never registered.
    #[error("unknown {role} render `{name}`")]
    UnknownRender {
        /// The render collection (request, response or error).
        role: &'static str,
        /// The missing key.
        name: String,
    },

    /// Two methods were bound to the same route.
    #[error("route {verb} {uri} is bound to both `{existing}` and `{duplicate}`")]
    DuplicateRoute {
        /// HTTP verb of the route.
        verb: String,
        /// URI of the route.
        uri: String,
        /// Method that claimed the route first.
        existing: String,
        /// Method that tried to claim it again.
        duplicate: String,
    },

    /// A verb outside the allow-list was supplied.
    #[error("invalid http method `{verb}`")]
    InvalidVerb {
        /// The rejected verb, as supplied.
        verb: String,
    },
}

impl JanusError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn param_lack(field: impl Into<String>) -> Self {
        Self::ParamLack {
            field: field.into(),
        }
    }

    /// Creates an error for a field that is not part of the signature.
    #[must_use]
    pub fn param_unexpected(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::ParamInvalid {
            message: format!("field `{field}` is not allowed"),
            field,
        }
    }

    /// Creates an error for a value that could not be cast to its declared type.
    #[must_use]
    pub fn param_invalid(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        target: impl std::fmt::Display,
    ) -> Self {
        let field = field.into();
        Self::ParamInvalid {
            message: format!("field `{field}` with value `{value}` cannot be converted to {target}"),
            field,
        }
    }

    /// Creates an invalid-content error.
    #[must_use]
    pub fn content_invalid(message: impl Into<String>) -> Self {
        Self::ContentInvalid {
            message: message.into(),
        }
    }

    /// Creates an application error reported with HTTP 500.
    #[must_use]
    pub fn application(code: i64, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Replaces the HTTP status of an application error.
    ///
    /// Has no effect on other variants.
    #[must_use]
    pub fn with_status(mut self, new_status: StatusCode) -> Self {
        if let Self::Application { status, .. } = &mut self {
            *status = new_status;
        }
        self
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ParamLack { .. } | Self::ParamInvalid { .. } | Self::ContentInvalid { .. } => {
                ErrorKind::Validation
            }
            Self::Application { .. } => ErrorKind::Application,
            Self::Internal { .. } => ErrorKind::Invocation,
            Self::Config { .. }
            | Self::DuplicateRender { .. }
            | Self::UnknownRender { .. }
            | Self::DuplicateRoute { .. }
            | Self::InvalidVerb { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns the application-level error code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::ParamLack { .. } => CODE_PARAM_LACK,
            Self::ParamInvalid { .. } => CODE_PARAM_INVALID,
            Self::ContentInvalid { .. } => CODE_CONTENT_INVALID,
            Self::Application { code, .. } => *code,
            _ => CODE_INTERNAL,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ParamLack { .. } | Self::ParamInvalid { .. } | Self::ContentInvalid { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Application { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the error and every source in its chain as one line.
    ///
    /// ```
    /// use janus_core::JanusError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
    /// let err = JanusError::internal_with_source("write failed", io);
    /// assert_eq!(err.chain_text(), "write failed: disk full");
    /// ```
    #[must_use]
    pub fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut last = text.clone();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            // anyhow sources repeat the outer message
            let current = cause.to_string();
            if current != last {
                text.push_str(": ");
                text.push_str(&current);
            }
            last = current;
            source = cause.source();
        }
        text
    }
}

impl From<anyhow::Error> for JanusError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<JanusError>() {
            Ok(janus) => janus,
            Err(other) => Self::Internal {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

/// Serializable error envelope: `{"code": int, "msg": string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Application-level error code.
    pub code: i64,
    /// Message shown to the caller.
    pub msg: String,
}
