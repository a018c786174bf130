//! # Janus Core
//!
//! Core types shared by every Janus crate.
//!
//! This crate provides:
//!
//! - [`JanusError`] and [`ErrorKind`]: the tagged error taxonomy and its
//!   application error codes
//! - [`TraceContext`]: per-request, task-scoped correlation metadata
//! - [`HttpVerb`] and [`normalize_verb`]: the HTTP method allow-list
//! - [`HttpRequest`], [`Params`] and [`Reply`]: the transport-neutral request
//!   and response model
//! - [`Kwargs`] and [`KwargsExt`]: keyword arguments passed to targets
//!
//! ## Example
//!
//! ```rust
//! use janus_core::{normalize_verb, HttpVerb, JanusError};
//!
//! assert_eq!(normalize_verb("post").unwrap(), HttpVerb::Post);
//! assert_eq!(JanusError::param_lack("b").code(), 100101);
//! ```

#![doc(html_root_url = "https://docs.rs/janus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod kwargs;
mod request;
mod verb;

pub use context::{
    RequestId, TraceContext, DEFAULT_TRACE_HEADERS, REQUEST_ID_HEADER, START_TIME_KEY,
};
pub use error::{
    ErrorEnvelope, ErrorKind, JanusError, JanusResult, CODE_CONTENT_INVALID, CODE_INTERNAL,
    CODE_PARAM_INVALID, CODE_PARAM_LACK,
};
pub use kwargs::{Kwargs, KwargsExt};
pub use request::{HttpRequest, HttpRequestBuilder, Params, Reply};
pub use verb::{normalize_verb, HttpVerb};
