//! Declared signatures of target methods.

use serde_json::Value;

use crate::types::ParamType;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type, if annotated.
    pub ty: Option<ParamType>,
    /// Default value. Parameters with a default are not required.
    pub default: Option<Value>,
}

impl ParamSpec {
    /// Returns `true` if callers must supply this parameter.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The declared parameters of a target.
///
/// # Example
///
/// ```
/// use janus_coerce::{ParamType, Signature};
/// use serde_json::json;
///
/// let sig = Signature::new()
///     .param("a", ParamType::Int)
///     .param("b", ParamType::Int)
///     .param_default("scale", ParamType::Float, json!(1.0));
///
/// assert_eq!(sig.required().collect::<Vec<_>>(), vec!["a", "b"]);
/// assert!(!sig.accepts_extra());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<ParamSpec>,
    var_kwargs: bool,
}

impl Signature {
    /// Creates an empty signature.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required, typed parameter.
    #[must_use]
    pub fn param(self, name: impl Into<String>, ty: ParamType) -> Self {
        self.push(name.into(), Some(ty), None)
    }

    /// Adds a typed parameter with a default value.
    #[must_use]
    pub fn param_default(self, name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        self.push(name.into(), Some(ty), Some(default))
    }

    /// Adds a required parameter without a declared type.
    #[must_use]
    pub fn untyped(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, None)
    }

    /// Adds an arbitrary parameter spec.
    #[must_use]
    pub fn with(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Accepts keyword arguments beyond the declared ones.
    #[must_use]
    pub fn var_kwargs(mut self) -> Self {
        self.var_kwargs = true;
        self
    }

    fn push(mut self, name: String, ty: Option<ParamType>, default: Option<Value>) -> Self {
        self.params.push(ParamSpec { name, ty, default });
        self
    }

    /// Returns the declared parameters in order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Returns the names of required parameters in order.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
    }

    /// Returns `true` if undeclared keyword arguments are accepted.
    #[must_use]
    pub const fn accepts_extra(&self) -> bool {
        self.var_kwargs
    }
}
