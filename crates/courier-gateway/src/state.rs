//! Session state machine
//!
//! `SessionState::on` is the whole transition table. The shard loop feeds it inputs
//! and never assigns a state directly, so every change is checked and observable.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Handshake sent after Hello
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeKind {
    /// Start a fresh session
    Identify,
    /// Continue the previous session
    Resume,
}

/// Connection state of one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking(HandshakeKind),
    Connected,
    Reconnecting,
    /// Terminal
    Shutdown,
}

/// Something that happened to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionInput {
    Start,
    HelloReceived { can_resume: bool },
    /// READY or RESUMED arrived
    HandshakeAcknowledged,
    ConnectionLost,
    ReconnectRequested,
    ZombieDetected,
    SessionInvalidated,
    MalformedThreshold,
    BackoffElapsed,
    Stop,
    Fatal,
}

/// Input not allowed in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid session transition: {input:?} in state {state}")]
pub struct InvalidTransition {
    pub state: SessionState,
    pub input: SessionInput,
}

impl SessionState {
    /// Next state after `input`
    pub fn on(self, input: SessionInput) -> Result<Self, InvalidTransition> {
        use SessionInput as I;
        use SessionState as S;

        let next = match (self, input) {
            (S::Shutdown, _) => None,
            (_, I::Stop | I::Fatal) => Some(S::Shutdown),

            (S::Disconnected, I::Start) => Some(S::Connecting),
            (S::Connecting, I::HelloReceived { can_resume }) => Some(S::Handshaking(if can_resume {
                HandshakeKind::Resume
            } else {
                HandshakeKind::Identify
            })),
            (S::Handshaking(_), I::HandshakeAcknowledged) => Some(S::Connected),
            (
                S::Connecting | S::Handshaking(_) | S::Connected,
                I::ConnectionLost
                | I::ReconnectRequested
                | I::ZombieDetected
                | I::SessionInvalidated
                | I::MalformedThreshold,
            ) => Some(S::Reconnecting),
            (S::Reconnecting, I::BackoffElapsed) => Some(S::Connecting),
            _ => None,
        };

        next.ok_or(InvalidTransition { state: self, input })
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Events flow only in this state
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking(HandshakeKind::Identify) => "identifying",
            Self::Handshaking(HandshakeKind::Resume) => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
