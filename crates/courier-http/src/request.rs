//! Request and response types crossing the transport boundary

use crate::error::{HttpError, HttpResult};
use crate::route::{Method, Route};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Header carrying the audit log reason for moderation endpoints
pub const AUDIT_LOG_REASON_HEADER: &str = "x-audit-log-reason";

/// An outbound REST call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    route: Route,
    body: Option<Vec<u8>>,
    headers: Vec<(String, String)>,
}

impl Request {
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Shorthand for `Request::new(Route::new(method, path))`
    #[must_use]
    pub fn with_method(method: Method, path: impl Into<String>) -> Self {
        Self::new(Route::new(method, path))
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> HttpResult<Self> {
        self.body = Some(serde_json::to_vec(body).map_err(HttpError::Encode)?);
        self.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Attach a raw body
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Record a reason in the server's audit log
    #[must_use]
    pub fn reason(self, reason: impl Into<String>) -> Self {
        self.header(AUDIT_LOG_REASON_HEADER, reason)
    }

    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// A response as seen by the dispatcher
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8 (for error messages)
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        serde_json::from_slice(&self.body).map_err(HttpError::Decode)
    }
}
