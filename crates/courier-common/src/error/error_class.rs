//! Failure classes
//!
//! Both the REST dispatcher and the gateway map their concrete errors onto these
//! classes; retry and propagation policy is decided per class, not per variant.

use serde::Serialize;
use std::fmt;

/// Classification of a failure by how the runtime reacts to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Credentials rejected; never retried
    Authentication,
    /// Connection reset, timeout, DNS failure; retried with backoff
    TransientNetwork,
    /// Quota retries exhausted
    RateLimitExceeded,
    /// Undecodable or out-of-protocol payload
    ProtocolViolation,
    /// Server discarded the session; a fresh handshake is required
    SessionInvalidated,
    /// Caller gave up on the operation
    Cancelled,
    /// Non-quota 4xx response
    Client,
    /// 5xx response
    Server,
    /// The server closed the gateway with a non-recoverable code
    Fatal,
    /// Bug or unexpected local failure
    Internal,
}

impl ErrorClass {
    /// Whether the runtime retries this class on its own
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::Server | Self::SessionInvalidated | Self::ProtocolViolation
        )
    }

    /// Whether this class ends the affected component for good
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Authentication | Self::Fatal)
    }

    /// Cancellation is caller-initiated and not reported as a failure
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Stable machine-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::TransientNetwork => "transient_network",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ProtocolViolation => "protocol_violation",
            Self::SessionInvalidated => "session_invalidated",
            Self::Cancelled => "cancelled",
            Self::Client => "client",
            Self::Server => "server",
            Self::Fatal => "fatal",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
