//! Gateway message envelope

use super::{HelloPayload, IdentifyPayload, OpCode, PresenceUpdatePayload, ReadyPayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of every gateway frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event data payload
    #[serde(default)]
    pub d: Option<Value>,

    /// Sequence number (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Option<Value>) -> Self {
        Self { op, d, s: None, t: None }
    }

    // === Client Messages ===

    /// Heartbeat (op=1) carrying the last processed sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, Some(last_sequence.map_or(Value::Null, Value::from)))
    }

    /// Identify (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::new(OpCode::Identify, Some(serde_json::to_value(payload).unwrap_or_default()))
    }

    /// Presence Update (op=3)
    #[must_use]
    pub fn presence_update(payload: &PresenceUpdatePayload) -> Self {
        Self::new(
            OpCode::PresenceUpdate,
            Some(serde_json::to_value(payload).unwrap_or_default()),
        )
    }

    /// Resume (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::new(OpCode::Resume, Some(serde_json::to_value(payload).unwrap_or_default()))
    }

    // === Server Messages ===

    /// Dispatch (op=0)
    #[must_use]
    pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: Some(data),
            s: Some(sequence),
            t: Some(event.into()),
        }
    }

    /// Hello (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            Some(serde_json::to_value(HelloPayload::with_interval(heartbeat_interval)).unwrap_or_default()),
        )
    }

    /// Heartbeat ACK (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, None)
    }

    /// Reconnect (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, None)
    }

    /// Invalid Session (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    // === Parsing ===

    fn payload<T: serde::de::DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        self.d.as_ref().and_then(|d| T::deserialize(d).ok())
    }

    /// Parse the Hello payload (op=10)
    #[must_use]
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.payload(OpCode::Hello)
    }

    /// Parse the Identify payload (op=2)
    #[must_use]
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.payload(OpCode::Identify)
    }

    /// Parse the Resume payload (op=6)
    #[must_use]
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.payload(OpCode::Resume)
    }

    /// Parse the session fields of a READY dispatch
    #[must_use]
    pub fn as_ready(&self) -> Option<ReadyPayload> {
        if self.t.as_deref() != Some("READY") {
            return None;
        }
        self.payload(OpCode::Dispatch)
    }

    /// Whether an Invalid Session (op=9) allows resuming; missing `d` means no
    #[must_use]
    pub fn invalid_session_resumable(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_serialization() {
        assert_eq!(GatewayMessage::heartbeat(None).to_json().unwrap(), r#"{"op":1,"d":null}"#);
        assert_eq!(GatewayMessage::heartbeat(Some(42)).to_json().unwrap(), r#"{"op":1,"d":42}"#);
    }

    #[test]
    fn test_parse_server_frame_with_nulls() {
        let msg = GatewayMessage::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
            .unwrap();

        assert_eq!(msg.op, OpCode::Hello);
        assert_eq!(msg.s, None);
        assert_eq!(msg.as_hello().unwrap().heartbeat_interval, 41250);
        assert!(msg.as_identify().is_none());
    }

    #[test]
    fn test_ready() {
        let msg = GatewayMessage::dispatch(
            "READY",
            1,
            serde_json::json!({"session_id": "s1", "resume_gateway_url": "wss://r"}),
        );
        let ready = msg.as_ready().unwrap();
        assert_eq!(ready.session_id, "s1");

        let other = GatewayMessage::dispatch("MESSAGE_CREATE", 2, serde_json::json!({"session_id": "x"}));
        assert!(other.as_ready().is_none());
    }

    #[test]
    fn test_invalid_session() {
        assert_eq!(GatewayMessage::invalid_session(true).invalid_session_resumable(), Some(true));
        assert_eq!(GatewayMessage::invalid_session(false).invalid_session_resumable(), Some(false));
        assert_eq!(GatewayMessage::reconnect().invalid_session_resumable(), None);
    }

    #[test]
    fn test_resume_roundtrip() {
        let resume = ResumePayload {
            token: "Bot t".to_string(),
            session_id: "abc".to_string(),
            seq: 42,
        };
        let msg = GatewayMessage::resume(&resume);
        let parsed = GatewayMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed.as_resume(), Some(resume));
    }

    #[test]
    fn test_message_display() {
        let dispatch = GatewayMessage::dispatch("MESSAGE_CREATE", 5, serde_json::json!({}));
        let display = dispatch.to_string();
        assert!(display.contains("MESSAGE_CREATE"));
        assert!(display.contains("s=5"));
    }
}
