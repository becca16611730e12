//! HTTP transport boundary
//!
//! The dispatcher only needs `execute(request) -> status, headers, body`; timeouts and
//! retries are applied by the dispatcher, not by the transport.

use crate::error::TransportError;
use crate::request::{HttpResponse, Request};
use crate::route::Method;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes a single HTTP call
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: &Request) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        (**self).execute(request).await
    }
}

/// User agent sent with every request
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/courier-rs/courier, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` authenticating with a bot token
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self::with_client(client, base_url, token))
    }

    /// Use a preconfigured `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, token: &str) -> Self {
        let token = token.trim();
        let authorization = if token.starts_with("Bot ") || token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bot {token}")
        };

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization,
        }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        let route = request.route();
        let url = format!("{}{}", self.base_url, route.path());

        let mut builder = self
            .client
            .request(Self::method(route.method()), &url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization);

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}
