//! HTTP verb allow-list.

use std::fmt;
use std::str::FromStr;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::error::{JanusError, JanusResult};

/// One of the HTTP verbs a route may be bound to.
///
/// The allow-list is closed: `GET`, `POST`, `DELETE`, `PATCH`, `PUT`,
/// `OPTIONS` and `HEAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `PUT`
    Put,
    /// `OPTIONS`
    Options,
    /// `HEAD`
    Head,
}

impl HttpVerb {
    /// Every allowed verb, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Delete,
        Self::Patch,
        Self::Put,
        Self::Options,
        Self::Head,
    ];

    /// Returns the upper-case verb name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }

    /// Converts to an [`http::Method`].
    #[must_use]
    pub fn as_method(&self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Delete => Method::DELETE,
            Self::Patch => Method::PATCH,
            Self::Put => Method::PUT,
            Self::Options => Method::OPTIONS,
            Self::Head => Method::HEAD,
        }
    }

    /// Converts from an [`http::Method`], if it is on the allow-list.
    #[must_use]
    pub fn from_method(method: &Method) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_method() == *method)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = JanusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_verb(s)
    }
}

/// Normalises a verb to its allow-listed form.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// ```
/// use janus_core::{normalize_verb, HttpVerb};
///
/// assert_eq!(normalize_verb("get").unwrap(), HttpVerb::Get);
/// assert!(normalize_verb("XYZ").is_err());
/// ```
pub fn normalize_verb(verb: &str) -> JanusResult<HttpVerb> {
    let upper = verb.trim().to_ascii_uppercase();
    HttpVerb::ALL
        .into_iter()
        .find(|v| v.as_str() == upper)
        .ok_or_else(|| JanusError::InvalidVerb {
            verb: verb.to_string(),
        })
}
