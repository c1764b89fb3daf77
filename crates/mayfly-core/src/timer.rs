//! Session countdown — Active to Expired, driven by an external tick source.

use crate::types::SessionPhase;

/// Reset attempted after the session already expired. Expiry is terminal,
/// so the caller must discard whatever prompted the reset.
#[derive(Debug, thiserror::Error)]
#[error("session already expired")]
pub struct TimerExpired;

#[derive(Debug, Clone)]
pub struct CountdownTimer {
    timeout_secs: u32,
    remaining_secs: u32,
    phase: SessionPhase,
}

impl CountdownTimer {
    pub fn new(timeout_secs: u32) -> Self {
        Self {
            timeout_secs,
            remaining_secs: timeout_secs,
            phase: SessionPhase::Active,
        }
    }

    /// Advance one second. Returns true exactly once, on the tick that
    /// crosses into Expired; ticks after that are no-ops.
    pub fn tick(&mut self) -> bool {
        if self.phase == SessionPhase::Expired {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.phase = SessionPhase::Expired;
            return true;
        }
        false
    }

    /// Restart the countdown with a new budget.
    pub fn reset(&mut self, new_timeout_secs: u32) -> Result<(), TimerExpired> {
        if self.phase == SessionPhase::Expired {
            return Err(TimerExpired);
        }
        self.timeout_secs = new_timeout_secs;
        self.remaining_secs = new_timeout_secs;
        Ok(())
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_expired(&self) -> bool {
        self.phase == SessionPhase::Expired
    }
}
