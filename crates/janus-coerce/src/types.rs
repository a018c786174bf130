//! Declared parameter types and the caster registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A caster converts textual input into a typed JSON value.
///
/// The error string explains why the conversion failed; it is logged but the
/// caller-facing message is built from the field, value and type name.
pub type Caster = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Accepts anything without conversion.
    Any,
    /// `true/false/1/0/yes/no/on/off`.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Text.
    Str,
    /// A JSON object.
    Record,
    /// A JSON array.
    List,
    /// `null`.
    None,
    /// `T` or `null`.
    Optional(Box<ParamType>),
    /// The first member that accepts the value wins.
    Union(Vec<ParamType>),
    /// A type registered with [`TypeRegistry::register_type`].
    Custom(String),
}

impl ParamType {
    /// Shorthand for [`ParamType::Optional`].
    #[must_use]
    pub fn optional(inner: ParamType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Shorthand for [`ParamType::Custom`].
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Name used to look up the caster for a non-composite type.
    fn caster_name(&self) -> Option<&str> {
        match self {
            Self::Bool => Some("bool"),
            Self::Int => Some("int"),
            Self::Float => Some("float"),
            Self::Str => Some("str"),
            Self::Record => Some("record"),
            Self::List => Some("list"),
            Self::Custom(name) => Some(name),
            Self::Any | Self::None | Self::Optional(_) | Self::Union(_) => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::None => f.write_str("null"),
            Self::Optional(inner) => write!(f, "optional<{inner}>"),
            Self::Union(members) => {
                f.write_str("union<")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str(">")
            }
            other => f.write_str(other.caster_name().unwrap_or("any")),
        }
    }
}

/// A resolved conversion for one parameter.
#[derive(Clone)]
pub(crate) enum Cast {
    /// One caster.
    Single { ty: ParamType, caster: Caster },
    /// Members tried in declaration order.
    Union {
        ty: ParamType,
        members: Vec<Cast>,
    },
}

impl Cast {
    pub(crate) fn ty(&self) -> &ParamType {
        match self {
            Self::Single { ty, .. } | Self::Union { ty, .. } => ty,
        }
    }

    pub(crate) fn apply(&self, text: &str) -> Result<Value, String> {
        match self {
            Self::Single { caster, .. } => caster(text),
            Self::Union { members, .. } => {
                let mut last = String::new();
                for member in members {
                    match member.apply(text) {
                        Ok(value) => return Ok(value),
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cast({})", self.ty())
    }
}

/// Registry of casters, keyed by type name.
///
/// Constructed at startup with the built-in casters, extended with
/// [`register_type`](Self::register_type), then shared read-only with every
/// coercion plan.
///
/// # Example
///
/// ```
/// use janus_coerce::{ParamType, TypeRegistry};
/// use serde_json::json;
///
/// let mut types = TypeRegistry::new();
/// types.register_type("upper", |s: &str| Ok(json!(s.to_uppercase())));
///
/// assert!(types.resolves(&ParamType::Int));
/// assert!(types.resolves(&ParamType::custom("upper")));
/// assert!(!types.resolves(&ParamType::custom("date")));
/// ```
#[derive(Clone)]
pub struct TypeRegistry {
    casters: HashMap<String, Caster>,
}

impl TypeRegistry {
    /// Creates a registry holding the built-in casters.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            casters: HashMap::new(),
        };
        registry
            .register_type("bool", cast_bool)
            .register_type("int", cast_int)
            .register_type("float", cast_float)
            .register_type("str", |s: &str| Ok(Value::String(s.to_string())))
            .register_type("record", cast_record)
            .register_type("list", cast_list);
        registry
    }

    /// Registers a caster under `name`, replacing any previous one.
    pub fn register_type<F>(&mut self, name: impl Into<String>, caster: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.casters.insert(name.into(), Arc::new(caster));
        self
    }

    /// Registers a structured type that is parsed from JSON text into `T`.
    ///
    /// The coerced value is `T` serialized back to JSON, so targets can read
    /// it with `KwargsExt::arg::<T>`.
    pub fn register_serde<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.register_type(name, |s: &str| {
            let parsed: T = serde_json::from_str(s).map_err(|e| e.to_string())?;
            serde_json::to_value(parsed).map_err(|e| e.to_string())
        })
    }

    /// Returns `true` if values of `ty` would be converted.
    #[must_use]
    pub fn resolves(&self, ty: &ParamType) -> bool {
        self.resolve(ty).is_some()
    }

    /// Resolves `ty` into a cast, or `None` if it passes through unconverted.
    pub(crate) fn resolve(&self, ty: &ParamType) -> Option<Cast> {
        match ty {
            ParamType::Any | ParamType::None => None,
            ParamType::Optional(inner) => self.resolve_union(ty, std::slice::from_ref(inner.as_ref())),
            ParamType::Union(members) => self.resolve_union(ty, members),
            other => {
                let name = other.caster_name()?;
                self.casters.get(name).map(|caster| Cast::Single {
                    ty: other.clone(),
                    caster: Arc::clone(caster),
                })
            }
        }
    }

    fn resolve_union(&self, ty: &ParamType, members: &[ParamType]) -> Option<Cast> {
        let mut casts = Vec::with_capacity(members.len());
        for member in members {
            match member {
                ParamType::None => {}
                // an unresolvable member makes the whole union pass through
                _ => casts.push(self.resolve(member)?),
            }
        }
        if casts.is_empty() {
            return None;
        }
        Some(Cast::Union {
            ty: ty.clone(),
            members: casts,
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.casters.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

fn cast_bool(s: &str) -> Result<Value, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
        "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
        other => Err(format!("`{other}` is not a boolean")),
    }
}

fn cast_int(s: &str) -> Result<Value, String> {
    s.trim()
        .parse::<i64>()
        .map(Value::from)
        .map_err(|e| e.to_string())
}

fn cast_float(s: &str) -> Result<Value, String> {
    let parsed = s.trim().parse::<f64>().map_err(|e| e.to_string())?;
    serde_json::Number::from_f64(parsed)
        .map(Value::Number)
        .ok_or_else(|| format!("`{s}` is not a finite number"))
}

fn cast_record(s: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(s).map_err(|e| e.to_string())? {
        value @ Value::Object(_) => Ok(value),
        _ => Err("expected a JSON object".to_string()),
    }
}

fn cast_list(s: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(s).map_err(|e| e.to_string())? {
        value @ Value::Array(_) => Ok(value),
        _ => Err("expected a JSON array".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn apply(registry: &TypeRegistry, ty: &ParamType, text: &str) -> Result<Value, String> {
        registry.resolve(ty).expect("type should resolve").apply(text)
    }

    #[test]
    fn test_builtin_casts() {
        let types = TypeRegistry::new();
        assert_eq!(apply(&types, &ParamType::Int, "42"), Ok(json!(42)));
        assert_eq!(apply(&types, &ParamType::Float, "2.5"), Ok(json!(2.5)));
        assert_eq!(apply(&types, &ParamType::Str, "x"), Ok(json!("x")));
        assert_eq!(apply(&types, &ParamType::Bool, "Yes"), Ok(json!(true)));
        assert_eq!(apply(&types, &ParamType::Bool, "off"), Ok(json!(false)));
        assert!(apply(&types, &ParamType::Int, "abc").is_err());
        assert!(apply(&types, &ParamType::Float, "NaN").is_err());
    }

    #[test]
    fn test_record_and_list_check_shape() {
        let types = TypeRegistry::new();
        assert_eq!(
            apply(&types, &ParamType::Record, r#"{"k": 1}"#),
            Ok(json!({"k": 1}))
        );
        assert!(apply(&types, &ParamType::Record, "[1]").is_err());
        assert_eq!(apply(&types, &ParamType::List, "[1, 2]"), Ok(json!([1, 2])));
        assert!(apply(&types, &ParamType::List, "{}").is_err());
    }

    #[test]
    fn test_union_tries_members_in_order() {
        let types = TypeRegistry::new();
        let ty = ParamType::Union(vec![ParamType::Int, ParamType::Str]);
        assert_eq!(apply(&types, &ty, "7"), Ok(json!(7)));
        assert_eq!(apply(&types, &ty, "seven"), Ok(json!("seven")));

        let ty = ParamType::Union(vec![ParamType::Str, ParamType::Int]);
        assert_eq!(apply(&types, &ty, "7"), Ok(json!("7")));
    }

    #[test]
    fn test_optional_and_unresolved() {
        let types = TypeRegistry::new();
        let ty = ParamType::optional(ParamType::Int);
        assert_eq!(apply(&types, &ty, "3"), Ok(json!(3)));
        assert!(apply(&types, &ty, "x").is_err());

        assert!(!types.resolves(&ParamType::Any));
        assert!(!types.resolves(&ParamType::custom("date")));
        assert!(!types.resolves(&ParamType::Union(vec![
            ParamType::Int,
            ParamType::custom("date")
        ])));
        assert!(!types.resolves(&ParamType::optional(ParamType::None)));
    }

    #[test]
    fn test_register_serde() {
        #[derive(Deserialize, Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let mut types = TypeRegistry::new();
        types.register_serde::<Point>("point");
        let ty = ParamType::custom("point");
        assert_eq!(apply(&types, &ty, r#"{"x":1,"y":2}"#), Ok(json!({"x":1,"y":2})));
        assert!(apply(&types, &ty, r#"{"x":1}"#).is_err());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ParamType::Int.to_string(), "int");
        assert_eq!(ParamType::optional(ParamType::Float).to_string(), "optional<float>");
        assert_eq!(
            ParamType::Union(vec![ParamType::Int, ParamType::None]).to_string(),
            "union<int, null>"
        );
        assert_eq!(ParamType::custom("date").to_string(), "date");
    }
}
