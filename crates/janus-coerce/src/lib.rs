//! # Janus Coerce
//!
//! Parameter validation and type coercion for Janus targets.
//!
//! A target declares its parameters with a [`Signature`]. At build time the
//! signature is compiled against a [`TypeRegistry`] into a [`CoercionPlan`],
//! which every call then applies to the keyword arguments produced by the
//! request render:
//!
//! 1. every required parameter must be present (`100101` otherwise)
//! 2. undeclared keys are rejected unless the signature takes extra keyword
//!    arguments (`100102`)
//! 3. textual values are cast to the declared type (`100102` on failure)
//!
//! ## Example
//!
//! ```rust
//! use janus_coerce::{CoercionPlan, ParamType, Signature, TypeRegistry};
//! use janus_core::Kwargs;
//! use serde_json::json;
//!
//! let mut types = TypeRegistry::new();
//! types.register_type("cents", |s: &str| {
//!     let dollars: f64 = s.parse().map_err(|_| "not a price".to_string())?;
//!     Ok(json!((dollars * 100.0).round() as i64))
//! });
//!
//! let sig = Signature::new()
//!     .param("price", ParamType::custom("cents"))
//!     .param("qty", ParamType::Int);
//! let plan = CoercionPlan::build(&sig, &types);
//!
//! let mut kwargs = Kwargs::new();
//! kwargs.insert("price".into(), json!("1.25"));
//! kwargs.insert("qty".into(), json!("3"));
//!
//! let coerced = plan.format(kwargs).unwrap();
//! assert_eq!(coerced["price"], json!(125));
//! assert_eq!(coerced["qty"], json!(3));
//! ```

#![doc(html_root_url = "https://docs.rs/janus-coerce/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod plan;
mod signature;
mod types;

pub use plan::{CoercionPlan, MethodId, PlanCache};
pub use signature::{ParamSpec, Signature};
pub use types::{Caster, ParamType, TypeRegistry};
