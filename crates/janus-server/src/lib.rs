//! # Janus Server
//!
//! Service registry, dispatcher and lifecycle manager for Janus.
//!
//! This crate provides:
//!
//! - [`Service`], [`MethodDef`] and [`ServiceRegistry`]: registration of
//!   services and bare functions, bound once into immutable [`Method`]s
//! - [`route`]: route descriptors derived from overrides, docstrings or
//!   method names
//! - [`Endpoint`] and [`RouteTable`]: per-route dispatch through the render
//!   and coercion pipeline
//! - [`WorkerPool`]: bounded offload of blocking targets
//! - [`Server`]: startup and shutdown across transports and services
//! - [`TransportAdapter`] and [`RpcTransport`]: the transport contracts, with
//!   [`HyperTransport`] as the HTTP/1.1 implementation
//!
//! ## Example
//!
//! ```rust
//! use janus_coerce::{ParamType, Signature};
//! use janus_core::{HttpRequest, HttpVerb, JanusError, Kwargs, KwargsExt};
//! use janus_server::{MethodDef, Server, ServerSettings};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut server = Server::new(ServerSettings::default());
//! server
//!     .register_function(
//!         MethodDef::blocking(
//!             "add",
//!             Signature::new().param("a", ParamType::Int).param("b", ParamType::Int),
//!             |kwargs: Kwargs| Ok::<_, JanusError>(kwargs.arg::<i64>("a")? + kwargs.arg::<i64>("b")?),
//!         )
//!         .doc("HTTP: /math/add get"),
//!     )
//!     .unwrap();
//! server.build().unwrap();
//!
//! let endpoint = server.endpoint(HttpVerb::Get, "/math/add").unwrap();
//! let reply = endpoint
//!     .handle(HttpRequest::builder().uri("/math/add?a=2&b=3").build())
//!     .await;
//! assert_eq!(
//!     reply.json_body().unwrap(),
//!     json!({"code": 0, "msg": "ok", "data": {"data": 5}})
//! );
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/janus-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatch;
mod error;
mod hyper_transport;
mod pool;
pub mod route;
mod server;
mod service;
mod shutdown;
mod transport;

pub use dispatch::{rpc_handler, Endpoint, RouteEntry, RouteInfo, RouteTable};
pub use error::{ServerError, ServerResult};
pub use hyper_transport::HyperTransport;
pub use pool::WorkerPool;
pub use route::{RouteDescriptor, RouteOverrides};
pub use server::{LifecycleState, Server, ServerSettings};
pub use service::{
    AsyncTarget, BlockingTarget, BoundService, Callable, Method, MethodDef, RegistryState,
    Service, ServiceFactory, ServiceRegistry,
};
pub use shutdown::{InFlightGuard, InFlightTracker, ShutdownReceiver, ShutdownSignal};
pub use transport::{RouteHandler, RpcHandler, RpcRequest, RpcTransport, TransportAdapter};
