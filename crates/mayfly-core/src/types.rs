//! Core types — senders, messages, session phase, timeout decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Session phase ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Active,
    Expired,
}

// ── Participants ──

/// Opaque identifier for one party in a session. Minted once per join;
/// never reused across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Senders ──

/// Who authored a message, from the local session's point of view.
/// Wire messages carry the author's `ParticipantId`; classification into
/// `User` vs `Peer` is an explicit id-equality check in the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Peer,
    System,
}

// ── Messages (session view) ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A session-local system notice, stamped now.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::System,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// ── Timer readout (event payload) ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimerData {
    pub remaining_secs: u32,
    pub timeout_secs: u32,
}

// ── Timeout decisions ──

/// Input to one advisor evaluation. Built per send, discarded after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutDecisionRequest {
    /// Latest message text, verbatim. May be empty.
    pub message_content: String,
    /// Messages this party sent within the trailing window, counting the
    /// one just sent — never 0 in the send flow.
    pub user_activity_level: u32,
    /// Timeout in effect immediately before this decision, in seconds.
    pub current_timeout_secs: u32,
}

/// One advisor decision. `new_timeout_secs` is already clamped to the
/// floor by whichever advisor produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutDecisionResult {
    pub new_timeout_secs: u32,
    pub reason: String,
}

// ── Constants ──

/// Sessions start with a five minute inactivity budget.
pub const INITIAL_TIMEOUT_SECS: u32 = 300;

/// Hard floor: no decision may push the timeout below this.
pub const TIMEOUT_FLOOR_SECS: u32 = 60;

/// Trailing window for the activity metric, in seconds.
pub const ACTIVITY_WINDOW_SECS: i64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ids_unique() {
        assert_ne!(ParticipantId::mint(), ParticipantId::mint());
    }

    #[test]
    fn test_sender_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::Peer).unwrap(), "\"peer\"");
        assert_eq!(
            serde_json::from_str::<Sender>("\"system\"").unwrap(),
            Sender::System
        );
    }

    #[test]
    fn test_system_message_stamped() {
        let msg = ChatMessage::system("hello");
        assert_eq!(msg.sender, Sender::System);
        assert_eq!(msg.text, "hello");
        assert!(!msg.id.is_empty());
    }
}
