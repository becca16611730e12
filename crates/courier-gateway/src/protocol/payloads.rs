//! Handshake payloads
//!
//! Only the fields the session runtime reads or writes are modelled; dispatch payloads
//! stay untyped `serde_json::Value`s for the consumer to interpret.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Client connection properties sent with Identify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "courier".to_string(),
            device: "courier".to_string(),
        }
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: ConnectionProperties,
    pub intents: u64,
    /// `[shard_id, shard_count]`
    pub shard: [u32; 2],
    pub large_threshold: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: u64,
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds the client went idle
    pub since: Option<u64>,
    #[serde(default)]
    pub activities: Vec<Value>,
    pub status: String,
    #[serde(default)]
    pub afk: bool,
}

impl PresenceUpdatePayload {
    #[must_use]
    pub fn online() -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: "online".to_string(),
            afk: false,
        }
    }
}

/// Session fields of the READY dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    /// URL to use when resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_serialization() {
        let identify = IdentifyPayload {
            token: "Bot abc".to_string(),
            properties: ConnectionProperties::default(),
            intents: 513,
            shard: [1, 4],
            large_threshold: 50,
            presence: None,
        };

        let json = serde_json::to_value(&identify).unwrap();
        assert_eq!(json["shard"], serde_json::json!([1, 4]));
        assert_eq!(json["intents"], 513);
        assert!(json.get("presence").is_none());
    }

    #[test]
    fn test_ready_ignores_unknown_fields() {
        let ready: ReadyPayload = serde_json::from_value(serde_json::json!({
            "v": 10,
            "user": {"id": "1"},
            "session_id": "abc",
            "resume_gateway_url": "wss://resume.example",
            "guilds": []
        }))
        .unwrap();

        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.resume_gateway_url.as_deref(), Some("wss://resume.example"));
        assert_eq!(ready.shard, None);
    }
}
