//! The three render collections used by a server.

use janus_core::JanusResult;

use crate::registry::RenderSet;
use crate::request::{self, RequestRender};
use crate::response::{builtin_errors, builtin_responses, ErrorRender, ResponseRender};

/// Request, response and error render collections.
///
/// # Example
///
/// ```
/// use janus_render::Renders;
///
/// let mut renders = Renders::builtin();
/// renders.ensure_defaults().unwrap();
///
/// assert!(renders.request.get("default").is_ok());
/// assert!(renders.request.get("json").is_ok());
/// assert!(renders.error.get("default").is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Renders {
    /// Request renders.
    pub request: RenderSet<RequestRender>,
    /// Response renders.
    pub response: RenderSet<ResponseRender>,
    /// Error renders.
    pub error: RenderSet<ErrorRender>,
}

impl Renders {
    /// Creates empty collections.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            request: RenderSet::new("request"),
            response: RenderSet::new("response"),
            error: RenderSet::new("error"),
        }
    }

    /// Creates collections holding the built-in renders.
    ///
    /// `auto` is the first request render and `envelope` the first response
    /// and error render, so they become the defaults unless a `"default"`
    /// render is registered explicitly.
    #[must_use]
    pub fn builtin() -> Self {
        let mut renders = Self::empty();
        // the collections are empty, so none of these can collide
        for (name, render) in request::builtin() {
            let _ = renders.request.register(name, render);
        }
        for (name, render) in builtin_responses() {
            let _ = renders.response.register(name, render);
        }
        for (name, render) in builtin_errors() {
            let _ = renders.error.register(name, render);
        }
        renders
    }

    /// Promotes a default entry in every collection.
    pub fn ensure_defaults(&mut self) -> JanusResult<()> {
        self.request.ensure_default()?;
        self.response.ensure_default()?;
        self.error.ensure_default()
    }
}

impl Default for Renders {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DEFAULT_KEY;

    #[test]
    fn test_builtin_names() {
        let renders = Renders::builtin();
        let names: Vec<_> = renders.request.names().collect();
        assert_eq!(names, vec!["auto", "json", "form", "query", "match", "simple"]);
        assert_eq!(renders.response.names().collect::<Vec<_>>(), vec!["envelope", "raw"]);
        assert_eq!(renders.error.len(), 1);
    }

    #[test]
    fn test_ensure_defaults_is_idempotent() {
        let mut renders = Renders::builtin();
        renders.ensure_defaults().unwrap();
        renders.ensure_defaults().unwrap();
        assert_eq!(renders.request.names().filter(|n| *n == DEFAULT_KEY).count(), 1);
    }

    #[test]
    fn test_empty_collections_fail() {
        assert!(Renders::empty().ensure_defaults().is_err());
    }
}
