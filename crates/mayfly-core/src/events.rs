//! SessionEvent enum — broadcast from the session engine to frontends via
//! tokio::broadcast.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, SessionPhase, TimeoutDecisionResult, TimerData};

/// Events broadcast from a running session to all subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// A message entered the local conversation (user, peer, or system).
    #[serde(rename = "message")]
    Message(ChatMessage),

    /// Countdown readout — emitted on every tick and every reset.
    #[serde(rename = "timer")]
    Timer(TimerData),

    /// The advisor changed the timeout.
    #[serde(rename = "timeout_adjusted")]
    TimeoutAdjusted(TimeoutDecisionResult),

    /// Session phase changed (only ever Active -> Expired).
    #[serde(rename = "phase")]
    Phase(SessionPhase),

    /// Whether a send is in flight (drives the composer lock).
    #[serde(rename = "sending")]
    Sending(bool),
}
