//! Keyword arguments passed to targets.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{JanusError, JanusResult};

/// Named arguments produced by a request render and refined by coercion.
pub type Kwargs = Map<String, Value>;

/// Typed access to [`Kwargs`].
///
/// ```
/// use janus_core::{Kwargs, KwargsExt};
/// use serde_json::json;
///
/// let mut kwargs = Kwargs::new();
/// kwargs.insert("a".into(), json!(2));
///
/// let a: i64 = kwargs.arg("a").unwrap();
/// assert_eq!(a, 2);
/// assert!(kwargs.arg::<i64>("missing").is_err());
/// assert_eq!(kwargs.arg_opt::<i64>("missing").unwrap(), None);
/// ```
pub trait KwargsExt {
    /// Deserializes a required argument.
    ///
    /// Fails with `ParamLack` if absent and `ParamInvalid` if it does not fit
    /// `T`.
    fn arg<T: DeserializeOwned>(&self, name: &str) -> JanusResult<T>;

    /// Deserializes an optional argument. `null` counts as absent.
    fn arg_opt<T: DeserializeOwned>(&self, name: &str) -> JanusResult<Option<T>>;
}

impl KwargsExt for Kwargs {
    fn arg<T: DeserializeOwned>(&self, name: &str) -> JanusResult<T> {
        match self.arg_opt(name)? {
            Some(value) => Ok(value),
            None => Err(JanusError::param_lack(name)),
        }
    }

    fn arg_opt<T: DeserializeOwned>(&self, name: &str) -> JanusResult<Option<T>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| JanusError::param_invalid(name, value, e)),
        }
    }
}
