//! Trailing activity metric fed into timeout evaluation.

use chrono::{DateTime, Duration, Utc};

use crate::types::{ChatMessage, Sender, ACTIVITY_WINDOW_SECS};

/// Count of own messages younger than the trailing window. The send flow
/// calls this after appending the outgoing message, so it always reports
/// at least 1 there. Peer and system messages never count.
pub fn activity_level(conversation: &[ChatMessage], now: DateTime<Utc>) -> u32 {
    let cutoff = now - Duration::seconds(ACTIVITY_WINDOW_SECS);
    conversation
        .iter()
        .filter(|m| m.sender == Sender::User && m.timestamp > cutoff)
        .count() as u32
}
