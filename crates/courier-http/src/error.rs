//! REST error types

use crate::route::RouteKey;
use courier_common::ErrorClass;
use thiserror::Error;

/// Failure reported by the HTTP transport itself
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection refused/reset, DNS, TLS
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result of a dispatched request
#[derive(Debug, Error)]
pub enum HttpError {
    /// 401: credentials rejected
    #[error("Authentication failed ({status}): {body}")]
    Authentication { status: u16, body: String },

    /// Non-quota 4xx: surfaced without retry
    #[error("Request rejected with status {status}: {body}")]
    Client { status: u16, body: String },

    /// 5xx after all retries
    #[error("Server error {status} after {attempts} attempts")]
    Server { status: u16, attempts: u32 },

    /// Network failure after all retries
    #[error("Network failure after {attempts} attempts: {source}")]
    Network {
        #[source]
        source: TransportError,
        attempts: u32,
    },

    /// Still rate limited after all retries
    #[error("Rate limit retries exhausted for {route} after {attempts} attempts")]
    RateLimitExceeded { route: RouteKey, attempts: u32 },

    /// The dispatcher dropped the request before completing it
    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl HttpError {
    /// Failure class
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Authentication { .. } => ErrorClass::Authentication,
            Self::Client { .. } => ErrorClass::Client,
            Self::Server { .. } => ErrorClass::Server,
            Self::Network { .. } => ErrorClass::TransientNetwork,
            Self::RateLimitExceeded { .. } => ErrorClass::RateLimitExceeded,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Encode(_) => ErrorClass::Internal,
            Self::Decode(_) => ErrorClass::ProtocolViolation,
        }
    }

    /// HTTP status, when the failure came from a response
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Client { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }

    /// Stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION_FAILED",
            Self::Client { .. } => "CLIENT_ERROR",
            Self::Server { .. } => "SERVER_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::Encode(_) => "ENCODE_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
        }
    }
}

/// Result type alias for REST operations
pub type HttpResult<T> = Result<T, HttpError>;
