//! Routes and route keys
//!
//! A route is a method plus a concrete path. Its key groups requests that the server
//! rate limits together: major parameters (channel, guild and webhook ids) stay in the
//! key, every other id collapses into a placeholder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path segments whose following id is a major parameter
const MAJOR_SEGMENTS: &[&str] = &["channels", "guilds", "webhooks"];

/// A concrete request target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    method: Method,
    path: String,
}

impl Route {
    /// Create a route; the path is normalised to start with `/` and carry no query string
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.split('?').next().unwrap_or_default().trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Self { method, path }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The first major parameter in the path, if any
    #[must_use]
    pub fn major_parameter(&self) -> Option<&str> {
        let mut segments = self.path.split('/').filter(|s| !s.is_empty());
        while let Some(segment) = segments.next() {
            if MAJOR_SEGMENTS.contains(&segment) {
                return segments.next();
            }
        }
        None
    }

    /// Key used to queue and rate limit this route until the server names its bucket
    #[must_use]
    pub fn key(&self) -> RouteKey {
        let mut normalized = String::with_capacity(self.path.len());
        let mut previous: Option<&str> = None;
        let mut after_reactions = false;

        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            normalized.push('/');

            let is_major = previous.is_some_and(|p| MAJOR_SEGMENTS.contains(&p));
            if after_reactions {
                // Emoji and user segments under a reaction share one bucket
                normalized.push_str(":reaction");
            } else if is_id(segment) && !is_major {
                normalized.push_str(":id");
            } else {
                normalized.push_str(segment);
            }

            after_reactions = after_reactions || segment == "reactions";
            previous = Some(segment);
        }

        RouteKey(format!("{} {}", self.method, normalized))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Normalised route identity (`"GET /channels/123/messages/:id"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(String);

impl RouteKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
