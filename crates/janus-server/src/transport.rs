//! Transport contracts.
//!
//! A [`TransportAdapter`] binds route handlers onto a concrete HTTP listener.
//! It must hand the request's query string, path parameters, headers and body
//! to the handler through [`HttpRequest`], and must write the returned
//! [`Reply`] to the wire with its status code unchanged.
//!
//! An [`RpcTransport`] receives one [`RpcHandler`] per RPC-enabled method.
//! No concrete RPC transport ships with Janus.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use http::HeaderMap;
use janus_core::{HttpRequest, HttpVerb, JanusResult, Kwargs, Reply};
use serde_json::Value;

use crate::error::ServerResult;

/// Handles one HTTP request bound to a route.
pub type RouteHandler = Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, Reply> + Send + Sync>;

/// Handles one RPC call.
pub type RpcHandler = Arc<dyn Fn(RpcRequest) -> BoxFuture<'static, JanusResult<Value>> + Send + Sync>;

/// An RPC call as handed over by an RPC transport.
#[derive(Debug, Clone, Default)]
pub struct RpcRequest {
    /// Keyword arguments of the call.
    pub kwargs: Kwargs,
    /// Call metadata; trace headers are read from here.
    pub metadata: HeaderMap,
}

impl RpcRequest {
    /// Creates a call without metadata.
    #[must_use]
    pub fn new(kwargs: Kwargs) -> Self {
        Self {
            kwargs,
            metadata: HeaderMap::new(),
        }
    }
}

/// Binds route handlers onto an HTTP listener.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Binds `handler` to `verb` on `path`.
    ///
    /// `path` may contain `{name}` segments, exposed to renders as path
    /// parameters.
    fn add_route(&mut self, verb: HttpVerb, path: &str, handler: RouteHandler) -> JanusResult<()>;

    /// Starts listening. Returns once the listener is bound.
    async fn start(&mut self, host: &str, port: u16) -> ServerResult<()>;

    /// Stops listening and drains open connections.
    async fn stop(&mut self);

    /// Returns the bound address while listening, if the transport has one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Exposes methods through an RPC protocol.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Registers `handler` under the qualified method name.
    fn add_method(&mut self, name: &str, handler: RpcHandler) -> JanusResult<()>;

    /// Starts the transport.
    async fn start(&mut self) -> ServerResult<()>;

    /// Stops the transport.
    async fn stop(&mut self);
}
