//! # Janus Render
//!
//! Named, pluggable renders for the three stages around a target call:
//!
//! - **request** renders parse an inbound request into keyword arguments
//! - **response** renders turn a return value into a reply
//! - **error** renders turn a failure into a reply
//!
//! Each stage has its own [`RenderSet`]: keys are write-once, entries keep
//! registration order, and the first registered entry is promoted to
//! `"default"` when none was registered explicitly.
//!
//! ## Example
//!
//! ```rust
//! use janus_render::{request_render, Renders};
//! use janus_core::{HttpRequest, Kwargs};
//! use std::sync::Arc;
//!
//! let mut renders = Renders::builtin();
//! renders
//!     .request
//!     .register("empty", request_render(|_req: Arc<HttpRequest>| async { Ok(Kwargs::new()) }))
//!     .unwrap();
//! renders.request.alias("none", "empty").unwrap();
//! renders.ensure_defaults().unwrap();
//!
//! assert!(renders.request.get("none").is_ok());
//! assert!(renders.request.get("xml").is_err());
//! ```

#![doc(html_root_url = "https://docs.rs/janus-render/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod registry;
mod renders;
pub mod request;
mod response;

pub use registry::{RenderSet, DEFAULT_KEY};
pub use renders::Renders;
pub use request::{request_render, RequestRender};
pub use response::{envelope, error_envelope, ErrorRender, ResponseRender};
