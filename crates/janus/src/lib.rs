//! # Janus
//!
//! **One service registry, served over HTTP and RPC.**
//!
//! Janus lets you register services (or bare functions) once and expose each
//! method both as an HTTP route and as an RPC method:
//!
//! - **Routes from names or docstrings** – `Math.add` becomes `/math/add`,
//!   or a docstring line `HTTP: /sum get,post` says otherwise
//! - **Typed parameters** – string inputs from queries, forms and path
//!   segments are coerced to each method's declared parameter types
//! - **Pluggable renders** – request, response and error renders are looked
//!   up by key, with a JSON envelope by default
//! - **Blocking offload** – synchronous targets run on a bounded worker pool
//!   without stalling the async runtime
//! - **Trace context** – per-request headers are visible to targets,
//!   including on worker threads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use janus::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("janus.toml")?
//!         .with_env_prefix("JANUS")
//!         .load()?;
//!     janus::telemetry::init_logging(&config.log_config())?;
//!
//!     let mut server = Server::new(config.server_settings());
//!     server.register_function(
//!         MethodDef::asynchronous(
//!             "greet",
//!             Signature::new().param("name", ParamType::Str),
//!             |kwargs: Kwargs| async move {
//!                 let name: String = kwargs.arg("name")?;
//!                 Ok::<_, JanusError>(json!({ "hello": name }))
//!             },
//!         )
//!         .doc("Greets someone.\n\nHTTP: /greet get"),
//!     )?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Dispatch
//!
//! ```text
//! Request → TraceContext → RequestRender → Coercion → Target → ResponseRender
//!                                   ↓            ↓         ↓
//!                                   └────────────┴─────→ ErrorRender
//! ```

#![doc(html_root_url = "https://docs.rs/janus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use janus_core as core;

// Re-export coercion types
pub use janus_coerce as coerce;

// Re-export render types
pub use janus_render as render;

// Re-export server types
pub use janus_server as server;

// Re-export configuration types
pub use janus_config as config;

// Re-export telemetry types
pub use janus_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use janus::prelude::*;
///
/// let settings = ServerSettings::default();
/// assert_eq!(settings.port, 8080);
/// ```
pub mod prelude {
    pub use janus_core::{
        ErrorKind, HttpRequest, HttpVerb, JanusError, JanusResult, Kwargs, KwargsExt, Reply,
        RequestId, TraceContext,
    };

    // Parameter declarations
    pub use janus_coerce::{ParamType, Signature};

    // Render registration
    pub use janus_render::{request_render, Renders, DEFAULT_KEY};

    // Services and lifecycle
    pub use janus_server::{
        MethodDef, Server, ServerError, ServerSettings, Service, ShutdownSignal,
        TransportAdapter,
    };

    // Configuration
    pub use janus_config::{ConfigLoader, JanusConfig};
}
