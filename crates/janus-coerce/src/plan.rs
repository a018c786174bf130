//! Coercion plans and the per-method plan cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use janus_core::{JanusError, JanusResult, Kwargs};
use parking_lot::RwLock;
use serde_json::Value;

use crate::signature::Signature;
use crate::types::{Cast, TypeRegistry};

/// Precomputed validation and casting rules for one method.
///
/// Built once from a [`Signature`] and a [`TypeRegistry`], then applied to
/// every call with [`format`](Self::format). Applying a plan has no side
/// effects.
///
/// # Example
///
/// ```
/// use janus_coerce::{CoercionPlan, ParamType, Signature, TypeRegistry};
/// use janus_core::Kwargs;
/// use serde_json::json;
///
/// let sig = Signature::new().param("a", ParamType::Int).param("b", ParamType::Int);
/// let plan = CoercionPlan::build(&sig, &TypeRegistry::new());
///
/// let mut kwargs = Kwargs::new();
/// kwargs.insert("a".into(), json!("2"));
/// kwargs.insert("b".into(), json!("3"));
///
/// let coerced = plan.format(kwargs).unwrap();
/// assert_eq!(coerced["a"], json!(2));
/// assert_eq!(coerced["b"], json!(3));
/// ```
#[derive(Debug)]
pub struct CoercionPlan {
    required: Vec<String>,
    declared: HashSet<String>,
    casts: Vec<(String, Cast)>,
    defaults: Vec<(String, Value)>,
    accepts_extra: bool,
}

impl CoercionPlan {
    /// Builds a plan for `signature`.
    ///
    /// Parameters without a type, or whose type the registry cannot resolve,
    /// pass through unconverted.
    #[must_use]
    pub fn build(signature: &Signature, types: &TypeRegistry) -> Self {
        let mut casts = Vec::new();
        let mut defaults = Vec::new();
        for param in signature.params() {
            if let Some(cast) = param.ty.as_ref().and_then(|ty| types.resolve(ty)) {
                casts.push((param.name.clone(), cast));
            }
            if let Some(default) = &param.default {
                defaults.push((param.name.clone(), default.clone()));
            }
        }

        Self {
            required: signature.required().map(String::from).collect(),
            declared: signature.params().iter().map(|p| p.name.clone()).collect(),
            casts,
            defaults,
            accepts_extra: signature.accepts_extra(),
        }
    }

    /// Validates and casts `kwargs`.
    ///
    /// Fails with `ParamLack` for the first missing required parameter, then
    /// with `ParamInvalid` for an undeclared key (unless the signature accepts
    /// extra keyword arguments) or a textual value that cannot be cast.
    /// Defaults are filled in for absent parameters.
    pub fn format(&self, mut kwargs: Kwargs) -> JanusResult<Kwargs> {
        if let Some(missing) = self.required.iter().find(|name| !kwargs.contains_key(*name)) {
            return Err(JanusError::param_lack(missing.as_str()));
        }

        if !self.accepts_extra {
            if let Some(extra) = kwargs.keys().find(|key| !self.declared.contains(*key)) {
                return Err(JanusError::param_unexpected(extra.as_str()));
            }
        }

        for (name, cast) in &self.casts {
            let Some(Value::String(text)) = kwargs.get(name) else {
                continue;
            };
            let value = cast.apply(text).map_err(|reason| {
                tracing::debug!(field = %name, target_type = %cast.ty(), %reason, "cast failed");
                JanusError::param_invalid(name.as_str(), text, cast.ty())
            })?;
            kwargs.insert(name.clone(), value);
        }

        for (name, default) in &self.defaults {
            if !kwargs.contains_key(name) {
                kwargs.insert(name.clone(), default.clone());
            }
        }

        Ok(kwargs)
    }

    /// Returns the required parameter names in declaration order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns `true` if `name` is a declared parameter.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.declared.contains(name)
    }
}

/// Identity of a bound method: the registration slot of its service and the
/// method name within that service.
///
/// Qualified names are not unique: two services may share a name and differ
/// only by their URI prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
    /// Registration slot of the owning service.
    pub service: usize,
    /// Method name within the service.
    pub method: String,
}

impl MethodId {
    /// Creates a method identity.
    #[must_use]
    pub fn new(service: usize, method: impl Into<String>) -> Self {
        Self {
            service,
            method: method.into(),
        }
    }
}

/// Plans cached by method identity.
///
/// Plans are built the first time a method is seen and shared afterwards;
/// they are never rebuilt per call.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<MethodId, Arc<CoercionPlan>>>,
}

impl PlanCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plan for `method`, building it with `build` on first use.
    pub fn get_or_build(
        &self,
        method: &MethodId,
        build: impl FnOnce() -> CoercionPlan,
    ) -> Arc<CoercionPlan> {
        if let Some(plan) = self.plans.read().get(method) {
            return Arc::clone(plan);
        }
        let mut plans = self.plans.write();
        Arc::clone(
            plans
                .entry(method.clone())
                .or_insert_with(|| Arc::new(build())),
        )
    }

    /// Returns the number of cached plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    /// Returns `true` if no plan has been built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }
}
