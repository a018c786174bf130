//! Bounded worker pool for blocking targets.
//!
//! Blocking targets never run on the dispatch loop while a pool is
//! configured: each call takes a permit from a semaphore sized by
//! `worker_count` and runs on tokio's blocking threads. With a
//! `worker_count` of zero there is no pool, and blocking targets run inline
//! on the dispatching task, stalling it for the duration of the call.
//!
//! Cancelling a dispatch (for example because the client went away) does not
//! cancel a call already running on the pool. The call runs to completion,
//! keeps its permit until then and its result is discarded. [`WorkerPool::shutdown`]
//! waits for such calls too.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use janus_core::{JanusError, JanusResult, Kwargs, TraceContext};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::service::BlockingTarget;
use crate::shutdown::InFlightTracker;

/// Process-wide pool that runs blocking targets off the dispatch loop.
///
/// Cloning is cheap; all clones share the same permits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Option<Arc<PoolInner>>,
}

#[derive(Debug)]
struct PoolInner {
    size: usize,
    permits: Arc<Semaphore>,
    in_flight: InFlightTracker,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool running at most `size` blocking calls at once.
    ///
    /// A size of zero creates an inline pool.
    #[must_use]
    pub fn new(size: usize) -> Self {
        if size == 0 {
            return Self::inline();
        }
        Self {
            inner: Some(Arc::new(PoolInner {
                size,
                permits: Arc::new(Semaphore::new(size)),
                in_flight: InFlightTracker::new(),
                closed: AtomicBool::new(false),
            })),
        }
    }

    /// Creates a pool that runs blocking calls on the calling task.
    #[must_use]
    pub const fn inline() -> Self {
        Self { inner: None }
    }

    /// Returns the number of worker slots, zero for an inline pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.size)
    }

    /// Returns the number of calls currently running on the pool.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.in_flight.active())
    }

    /// Runs `target` with `kwargs`.
    ///
    /// The caller's [`TraceContext`] is visible to the target. Panics are
    /// reported as internal errors.
    pub async fn run(&self, target: BlockingTarget, kwargs: Kwargs) -> JanusResult<Value> {
        let context = TraceContext::current();
        let Some(inner) = &self.inner else {
            return call(&target, kwargs);
        };

        if inner.closed.load(Ordering::SeqCst) {
            return Err(JanusError::internal("worker pool is shut down"));
        }

        let permit = Arc::clone(&inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| JanusError::internal("worker pool is shut down"))?;
        let guard = inner.in_flight.acquire();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = guard;
            match context {
                Some(ctx) => ctx.sync_scope(|| call(&target, kwargs)),
                None => call(&target, kwargs),
            }
        });

        handle
            .await
            .map_err(|e| JanusError::internal_with_source("worker task failed", e))?
    }

    /// Stops accepting calls and waits for running ones to finish.
    ///
    /// Only the first call waits; later calls return immediately.
    pub async fn shutdown(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.permits.close();
        tracing::debug!(in_flight = inner.in_flight.active(), "draining worker pool");
        inner.in_flight.wait_idle().await;
        tracing::debug!("worker pool drained");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::inline()
    }
}

fn call(target: &BlockingTarget, kwargs: Kwargs) -> JanusResult<Value> {
    catch_unwind(AssertUnwindSafe(|| target(kwargs))).unwrap_or_else(|payload| Err(panic_error(payload)))
}

/// Converts a panic payload into an internal error.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> JanusError {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    JanusError::internal(format!("target panicked: {message}"))
}
