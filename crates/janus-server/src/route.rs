//! Route descriptor derivation.
//!
//! A method's route comes from three sources, strongest first:
//!
//! 1. explicit [`RouteOverrides`] set on the method definition,
//! 2. the first docstring line of the form
//!    `HTTP: /uri [verb[,verb...]] [request] [response] [error]`,
//! 3. defaults: the slug of the qualified method name, `GET`, and the
//!    `"default"` render of each role.
//!
//! Overrides win field by field, so a method may take its URI from the
//! docstring and its verbs from an override. Descriptors are derived once
//! while the registry builds and never re-parsed.

use std::collections::BTreeSet;
use std::fmt;

use janus_core::{normalize_verb, HttpVerb, JanusResult};
use janus_render::DEFAULT_KEY;

const DOC_MARKER: &str = "http:";
const UNSET: &str = "-";

/// Converts a qualified method name into a URI path.
///
/// Dots become path separators and the result is lower-cased. Names that
/// already contain a `/` are taken as paths and only case-folded.
///
/// ```rust
/// use janus_server::route::slugify;
///
/// assert_eq!(slugify("Foo.Bar"), "/foo/bar");
/// assert_eq!(slugify("already/slash"), "already/slash");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    if name.contains('/') {
        return name.to_lowercase();
    }
    let path = name.replace('.', "/").to_lowercase();
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Route fields parsed from a docstring line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocRoute {
    /// URI path.
    pub uri: Option<String>,
    /// Raw verbs, not yet validated.
    pub verbs: Option<Vec<String>>,
    /// Request render key.
    pub request: Option<String>,
    /// Response render key.
    pub response: Option<String>,
    /// Error render key.
    pub error: Option<String>,
}

/// Parses the first `HTTP:` line of a docstring.
///
/// Returns `None` when no line carries the marker. Later marker lines are
/// ignored.
///
/// ```rust
/// use janus_server::route::parse_doc;
///
/// let route = parse_doc("Adds numbers.\n\n  HTTP: /math/add get,post json").unwrap();
/// assert_eq!(route.uri.as_deref(), Some("/math/add"));
/// assert_eq!(route.verbs, Some(vec!["get".to_string(), "post".to_string()]));
/// assert_eq!(route.request.as_deref(), Some("json"));
/// assert_eq!(route.response, None);
/// ```
#[must_use]
pub fn parse_doc(doc: &str) -> Option<DocRoute> {
    let line = doc.lines().map(str::trim_start).find(|line| {
        line.get(..DOC_MARKER.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(DOC_MARKER))
    })?;

    let mut fields = line[DOC_MARKER.len()..]
        .split_whitespace()
        .map(|field| (field != UNSET).then(|| field.to_string()));
    let mut next = || fields.next().flatten();

    let uri = next();
    let verbs = next().map(|raw| {
        raw.split(',')
            .filter(|verb| !verb.is_empty())
            .map(ToString::to_string)
            .collect()
    });

    Some(DocRoute {
        uri,
        verbs,
        request: next(),
        response: next(),
        error: next(),
    })
}

/// Route metadata set explicitly on a method definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOverrides {
    /// URI path.
    pub uri: Option<String>,
    /// Verbs, validated when the descriptor is built.
    pub verbs: Option<Vec<String>>,
    /// Request render key.
    pub request: Option<String>,
    /// Response render key.
    pub response: Option<String>,
    /// Error render key.
    pub error: Option<String>,
}

/// The immutable route of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// URI path, always starting with `/`.
    pub uri: String,
    /// Allowed verbs, never empty.
    pub verbs: BTreeSet<HttpVerb>,
    /// Request render key.
    pub request_render: String,
    /// Response render key.
    pub response_render: String,
    /// Error render key.
    pub error_render: String,
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verbs: Vec<&str> = self.verbs.iter().map(HttpVerb::as_str).collect();
        write!(
            f,
            "{} {} [{} {} {}]",
            verbs.join(","),
            self.uri,
            self.request_render,
            self.response_render,
            self.error_render
        )
    }
}

/// Builds the route descriptor of one method.
///
/// `prefix` is the owning service's URI prefix, if any. Fails with
/// `InvalidVerb` if any verb is outside the allow-list.
pub fn build_descriptor(
    qualified_name: &str,
    doc: Option<&str>,
    overrides: &RouteOverrides,
    prefix: Option<&str>,
) -> JanusResult<RouteDescriptor> {
    let doc = doc.and_then(parse_doc).unwrap_or_default();

    let uri = overrides
        .uri
        .clone()
        .or(doc.uri)
        .unwrap_or_else(|| slugify(qualified_name));

    let verbs = match overrides.verbs.as_ref().or(doc.verbs.as_ref()) {
        Some(raw) => raw
            .iter()
            .map(|verb| normalize_verb(verb))
            .collect::<JanusResult<BTreeSet<_>>>()?,
        None => BTreeSet::new(),
    };
    let verbs = if verbs.is_empty() {
        BTreeSet::from([HttpVerb::Get])
    } else {
        verbs
    };

    let key = |explicit: &Option<String>, documented: Option<String>| {
        explicit
            .clone()
            .or(documented)
            .unwrap_or_else(|| DEFAULT_KEY.to_string())
    };

    Ok(RouteDescriptor {
        uri: join_uri(prefix, &uri),
        verbs,
        request_render: key(&overrides.request, doc.request),
        response_render: key(&overrides.response, doc.response),
        error_render: key(&overrides.error, doc.error),
    })
}

fn join_uri(prefix: Option<&str>, uri: &str) -> String {
    let path = uri.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) if path.is_empty() => format!("/{prefix}"),
        Some(prefix) => format!("/{prefix}/{path}"),
        None => format!("/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::JanusError;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Foo.Bar"), "/foo/bar");
        assert_eq!(slugify("already/slash"), "already/slash");
        assert_eq!(slugify("/Already/Slash"), "/already/slash");
        assert_eq!(slugify("add"), "/add");
    }

    #[test]
    fn test_parse_doc_first_match_wins() {
        let doc = "Summary line.\n    http: /first post\n    HTTP: /second put";
        let route = parse_doc(doc).unwrap();
        assert_eq!(route.uri.as_deref(), Some("/first"));
        assert_eq!(route.verbs, Some(vec!["post".to_string()]));
    }

    #[test]
    fn test_parse_doc_without_marker() {
        assert_eq!(parse_doc("Just a description.\nNo routing here."), None);
        assert_eq!(parse_doc(""), None);
    }

    #[test]
    fn test_parse_doc_unset_fields() {
        let route = parse_doc("HTTP: /users - - raw").unwrap();
        assert_eq!(route.uri.as_deref(), Some("/users"));
        assert_eq!(route.verbs, None);
        assert_eq!(route.request, None);
        assert_eq!(route.response.as_deref(), Some("raw"));
        assert_eq!(route.error, None);
    }

    #[test]
    fn test_defaults_from_name() {
        let route = build_descriptor("Math.Add", None, &RouteOverrides::default(), None).unwrap();
        assert_eq!(route.uri, "/math/add");
        assert_eq!(route.verbs, BTreeSet::from([HttpVerb::Get]));
        assert_eq!(route.request_render, "default");
        assert_eq!(route.response_render, "default");
        assert_eq!(route.error_render, "default");
    }

    #[test]
    fn test_overrides_win_per_field() {
        let overrides = RouteOverrides {
            verbs: Some(vec!["delete".to_string()]),
            response: Some("raw".to_string()),
            ..RouteOverrides::default()
        };
        let route = build_descriptor(
            "users.remove",
            Some("HTTP: /users/{id} post json envelope"),
            &overrides,
            None,
        )
        .unwrap();
        assert_eq!(route.uri, "/users/{id}");
        assert_eq!(route.verbs, BTreeSet::from([HttpVerb::Delete]));
        assert_eq!(route.request_render, "json");
        assert_eq!(route.response_render, "raw");
    }

    #[test]
    fn test_invalid_verb_fails_at_build() {
        let err = build_descriptor("x", Some("HTTP: /x get,xyz"), &RouteOverrides::default(), None)
            .unwrap_err();
        assert!(matches!(err, JanusError::InvalidVerb { verb } if verb == "xyz"));
    }

    #[test]
    fn test_prefix_and_leading_slash() {
        let route = build_descriptor(
            "orders.list",
            Some("HTTP: list get,post"),
            &RouteOverrides::default(),
            Some("/api/v1/"),
        )
        .unwrap();
        assert_eq!(route.uri, "/api/v1/list");
        assert_eq!(route.verbs, BTreeSet::from([HttpVerb::Get, HttpVerb::Post]));
        assert_eq!(route.to_string(), "GET,POST /api/v1/list [default default default]");
    }

    #[test]
    fn test_slug_without_leading_slash_is_rooted() {
        let route = build_descriptor("already/slash", None, &RouteOverrides::default(), None).unwrap();
        assert_eq!(route.uri, "/already/slash");
    }
}
