//! # Janus Config
//!
//! Layered configuration for Janus servers: defaults, then a TOML or JSON
//! file, then `PREFIX__SECTION__KEY` environment variables.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! worker_count = 4              # 0 runs blocking targets inline
//! shutdown_timeout_secs = 30
//! trace_headers = ["x-request-id", "traceparent", "tracestate"]
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"               # or "pretty"
//!
//! [init_kwargs]                 # for service factories needing arguments
//! dsn = "postgres://localhost/app"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use janus_config::ConfigLoader;
//! use janus_server::Server;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("janus.toml")?
//!     .with_env_prefix("JANUS")
//!     .load()?;
//!
//! janus_telemetry::init_logging(&config.log_config())?;
//! let server = Server::new(config.server_settings());
//! # let _ = server;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/janus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{JanusConfig, LoggingConfig, ServerConfig, MAX_WORKERS};
pub use error::ConfigError;
pub use loader::ConfigLoader;
