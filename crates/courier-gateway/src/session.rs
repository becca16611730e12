//! Per-shard session data
//!
//! Owned exclusively by the shard task; exported as a `SessionSnapshot` so a later
//! process can resume instead of identifying again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard id and shard count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u32,
    pub total: u32,
}

impl ShardInfo {
    #[must_use]
    pub fn new(id: u32, total: u32) -> Self {
        Self { id, total }
    }

    /// `[id, total]` as sent in Identify
    #[must_use]
    pub fn as_array(self) -> [u32; 2] {
        [self.id, self.total]
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.id, self.total)
    }
}

/// Resumable session state that outlives a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// Last processed sequence
    pub sequence: u64,
    #[serde(default)]
    pub resume_url: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// How an inbound sequence number relates to the last processed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Next in line (or the first one)
    InOrder,
    /// Not newer than what was already processed; must be dropped
    Duplicate { last: u64 },
    /// Newer, but some sequences never arrived
    Gap { expected: u64 },
}

/// Session id, resume URL and sequence of a shard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
}

impl SessionData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: Some(snapshot.session_id),
            resume_url: snapshot.resume_url,
            sequence: Some(snapshot.sequence),
        }
    }

    /// A Resume can be attempted
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// READY: a new session started
    pub fn start(&mut self, session_id: String, resume_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_url = resume_url;
    }

    /// Forget the session; the next handshake is an Identify
    pub fn clear(&mut self) {
        self.session_id = None;
        self.resume_url = None;
        self.sequence = None;
    }

    /// Record an inbound dispatch sequence
    ///
    /// Duplicates leave the stored sequence untouched.
    pub fn record_sequence(&mut self, sequence: u64) -> SequenceCheck {
        match self.sequence {
            Some(last) if sequence <= last => SequenceCheck::Duplicate { last },
            Some(last) if sequence > last + 1 => {
                self.sequence = Some(sequence);
                SequenceCheck::Gap { expected: last + 1 }
            }
            _ => {
                self.sequence = Some(sequence);
                SequenceCheck::InOrder
            }
        }
    }

    /// Export for a later resume
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        Some(SessionSnapshot {
            session_id: self.session_id.clone()?,
            sequence: self.sequence?,
            resume_url: self.resume_url.clone(),
            saved_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_tracking() {
        let mut session = SessionData::new();

        assert_eq!(session.record_sequence(1), SequenceCheck::InOrder);
        assert_eq!(session.record_sequence(2), SequenceCheck::InOrder);
        assert_eq!(session.record_sequence(2), SequenceCheck::Duplicate { last: 2 });
        assert_eq!(session.record_sequence(1), SequenceCheck::Duplicate { last: 2 });
        assert_eq!(session.record_sequence(5), SequenceCheck::Gap { expected: 3 });
        assert_eq!(session.sequence(), Some(5));
    }

    #[test]
    fn test_resume_requires_session_and_sequence() {
        let mut session = SessionData::new();
        assert!(!session.can_resume());

        session.start("abc".to_string(), Some("wss://resume".to_string()));
        assert!(!session.can_resume());

        session.record_sequence(1);
        assert!(session.can_resume());

        session.clear();
        assert!(!session.can_resume());
        assert_eq!(session.resume_url(), None);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut session = SessionData::new();
        assert!(session.snapshot().is_none());

        session.start("abc".to_string(), None);
        session.record_sequence(42);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.sequence, 42);

        let restored = SessionData::from_snapshot(snapshot);
        assert_eq!(restored, session);
    }

    #[test]
    fn test_shard_info_display() {
        let shard = ShardInfo::new(2, 8);
        assert_eq!(shard.to_string(), "[2, 8]");
        assert_eq!(shard.as_array(), [2, 8]);
    }
}
