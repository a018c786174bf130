//! Write-once, registration-ordered render collections.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use janus_core::{JanusError, JanusResult};

/// Key of the entry used when a route does not name a render.
pub const DEFAULT_KEY: &str = "default";

/// One named collection of renders.
///
/// Keys are write-once. Entries keep their registration order, so the entry
/// promoted to `"default"` is always the first one registered.
///
/// # Example
///
/// ```
/// use janus_render::RenderSet;
///
/// let mut set: RenderSet<u8> = RenderSet::new("response");
/// set.register("envelope", 1).unwrap();
/// set.register("raw", 2).unwrap();
/// set.alias("plain", "raw").unwrap();
///
/// assert!(set.register("raw", 3).is_err());
/// assert_eq!(*set.get("plain").unwrap(), 2);
/// assert_eq!(*set.default_render().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct RenderSet<F> {
    role: &'static str,
    entries: IndexMap<String, F>,
    aliases: HashMap<String, String>,
}

impl<F> RenderSet<F> {
    /// Creates an empty collection. `role` names it in errors.
    #[must_use]
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            entries: IndexMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Returns the collection role.
    #[must_use]
    pub const fn role(&self) -> &'static str {
        self.role
    }

    /// Registers `render` under `name`.
    ///
    /// Fails if `name` is already registered or used as an alias.
    pub fn register(&mut self, name: impl Into<String>, render: F) -> JanusResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(self.duplicate(name));
        }
        self.entries.insert(name, render);
        Ok(())
    }

    /// Makes `alias` resolve to the entry registered under `target`.
    ///
    /// Aliases are followed one level only, so `target` must be a registered
    /// key rather than another alias.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> JanusResult<()> {
        let alias = alias.into();
        let target = target.into();
        if self.contains(&alias) {
            return Err(self.duplicate(alias));
        }
        if !self.entries.contains_key(&target) {
            return Err(self.unknown(target));
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    /// Returns `true` if `name` is a key or an alias.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Looks up a render, following one level of aliasing.
    pub fn get(&self, name: &str) -> JanusResult<&F> {
        if let Some(render) = self.entries.get(name) {
            return Ok(render);
        }
        self.aliases
            .get(name)
            .and_then(|target| self.entries.get(target))
            .ok_or_else(|| self.unknown(name.to_string()))
    }

    /// Looks up a render, or the default one when `name` is `None`.
    pub fn get_or_default(&self, name: Option<&str>) -> JanusResult<&F> {
        match name {
            Some(name) if name != DEFAULT_KEY => self.get(name),
            _ => self.default_render(),
        }
    }

    /// Returns the `"default"` entry, or the first registered entry.
    ///
    /// Fails if the collection is empty.
    pub fn default_render(&self) -> JanusResult<&F> {
        self.entries
            .get(DEFAULT_KEY)
            .or_else(|| self.entries.first().map(|(_, render)| render))
            .ok_or_else(|| self.unknown(DEFAULT_KEY.to_string()))
    }

    /// Returns registered keys in registration order (aliases excluded).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn duplicate(&self, name: String) -> JanusError {
        JanusError::DuplicateRender {
            role: self.role,
            name,
        }
    }

    fn unknown(&self, name: String) -> JanusError {
        JanusError::UnknownRender {
            role: self.role,
            name,
        }
    }
}

impl<F: Clone> RenderSet<F> {
    /// Promotes the first registered entry to `"default"` if none exists.
    ///
    /// Fails if the collection is empty.
    pub fn ensure_default(&mut self) -> JanusResult<()> {
        if self.entries.contains_key(DEFAULT_KEY) {
            return Ok(());
        }
        let (first, render) = self
            .entries
            .first()
            .map(|(name, render)| (name.clone(), render.clone()))
            .ok_or_else(|| self.unknown(DEFAULT_KEY.to_string()))?;
        tracing::debug!(role = self.role, render = %first, "promoted render to default");
        self.entries.insert(DEFAULT_KEY.to_string(), render);
        Ok(())
    }
}

impl<F> fmt::Debug for RenderSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSet")
            .field("role", &self.role)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}
