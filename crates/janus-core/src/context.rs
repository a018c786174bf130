//! Per-request trace context.
//!
//! A [`TraceContext`] is created by the dispatcher immediately before the
//! request render runs and lives in task-local storage for the duration of
//! one request. Concurrent requests run in separate scopes, so no request can
//! observe another's context, and the context is dropped when its scope ends
//! whether the handler succeeded or failed.
//!
//! Blocking targets that run on the worker pool receive the same context
//! through [`TraceContext::sync_scope`].

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Key under which the request start time (unix millis) is exposed.
pub const START_TIME_KEY: &str = "start-time";

/// Trace headers copied into the context when no explicit list is configured.
pub const DEFAULT_TRACE_HEADERS: &[&str] = &[
    REQUEST_ID_HEADER,
    "traceparent",
    "tracestate",
    "x-b3-traceid",
    "x-b3-spanid",
];

tokio::task_local! {
    static CURRENT: TraceContext;
}

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it suitable for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request, task-scoped correlation metadata.
///
/// # Example
///
/// ```
/// use janus_core::TraceContext;
///
/// # tokio_test::block_on(async {
/// let ctx = TraceContext::with_request_id("req-1");
/// let seen = ctx
///     .scope(async { TraceContext::current().map(|c| c.request_id().to_string()) })
///     .await;
/// assert_eq!(seen.as_deref(), Some("req-1"));
/// assert!(TraceContext::current().is_none());
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    request_id: String,
    started_at: Instant,
    start_time_ms: u128,
    headers: BTreeMap<String, String>,
}

impl TraceContext {
    /// Creates a context with a freshly generated request id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new().to_string())
    }

    /// Creates a context with the given request id.
    #[must_use]
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let mut headers = BTreeMap::new();
        headers.insert(REQUEST_ID_HEADER.to_string(), request_id.clone());
        Self {
            request_id,
            started_at: Instant::now(),
            start_time_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            headers,
        }
    }

    /// Builds a context from inbound headers.
    ///
    /// Every header named in `trace_headers` that is present and valid UTF-8
    /// is copied. The request id is taken from `x-request-id` when present,
    /// otherwise a new one is generated.
    #[must_use]
    pub fn from_headers<S: AsRef<str>>(headers: &HeaderMap, trace_headers: &[S]) -> Self {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| RequestId::new().to_string(), ToString::to_string);

        let mut ctx = Self::with_request_id(request_id);
        for name in trace_headers {
            let name = name.as_ref().to_ascii_lowercase();
            if name == REQUEST_ID_HEADER {
                continue;
            }
            if let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
                ctx.headers.insert(name, value.to_string());
            }
        }
        ctx
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the wall-clock start time in unix milliseconds.
    #[must_use]
    pub const fn start_time_ms(&self) -> u128 {
        self.start_time_ms
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns a propagated trace header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns the context as a flat mapping, including `start-time`.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.headers.clone();
        map.insert(START_TIME_KEY.to_string(), self.start_time_ms.to_string());
        map
    }

    /// Returns a clone of the context installed for the current task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Runs `fut` with this context installed for the current task.
    ///
    /// The context is removed when `fut` completes or is dropped.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Runs `f` synchronously with this context installed.
    ///
    /// Used for blocking targets running on worker threads.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
