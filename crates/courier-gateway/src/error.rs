//! Gateway error types

use crate::protocol::CloseCode;
use crate::state::InvalidTransition;
use courier_common::ErrorClass;
use thiserror::Error;

/// Failure of the underlying bidirectional connection
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Io(String),

    /// The connection is already closed
    #[error("Connection closed")]
    Closed,
}

/// Frame that could not be turned into a message (or back)
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced by shards and the shard cluster
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server rejected the token (close 4004)
    #[error("Shard {shard} authentication failed: {reason}")]
    AuthenticationFailed { shard: u32, reason: String },

    /// Any other close code that forbids reconnecting
    #[error("Shard {shard} closed by server: {code}")]
    FatalClose { shard: u32, code: CloseCode, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("REST error: {0}")]
    Http(#[from] courier_http::HttpError),

    #[error("Resume store error: {0}")]
    ResumeStore(String),

    #[error("Identify coordinator error: {0}")]
    Coordinator(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The shard task is gone
    #[error("Shard {0} has stopped")]
    ShardStopped(u32),
}

impl GatewayError {
    /// Failure class
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AuthenticationFailed { .. } => ErrorClass::Authentication,
            Self::FatalClose { .. } => ErrorClass::Fatal,
            Self::Transport(_) => ErrorClass::TransientNetwork,
            Self::Codec(_) => ErrorClass::ProtocolViolation,
            Self::Http(e) => e.class(),
            Self::ShardStopped(_) => ErrorClass::Cancelled,
            Self::InvalidTransition(_)
            | Self::ResumeStore(_)
            | Self::Coordinator(_)
            | Self::Config(_) => ErrorClass::Internal,
        }
    }

    /// Stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::FatalClose { .. } => "FATAL_CLOSE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Codec(_) => "CODEC_ERROR",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Http(e) => e.error_code(),
            Self::ResumeStore(_) => "RESUME_STORE_ERROR",
            Self::Coordinator(_) => "COORDINATOR_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ShardStopped(_) => "SHARD_STOPPED",
        }
    }

    /// Error for a fatal close code received by `shard`
    #[must_use]
    pub fn from_close(shard: u32, code: CloseCode, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match code {
            CloseCode::AuthenticationFailed => Self::AuthenticationFailed { shard, reason },
            code => Self::FatalClose { shard, code, reason },
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::ResumeStore(e.to_string())
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
