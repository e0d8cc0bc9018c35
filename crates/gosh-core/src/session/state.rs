//! Session lifecycle state.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Phase of a hosted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport accepted, nothing exchanged yet.
    Connected,
    /// Environment exchange and authentication in progress.
    Negotiating,
    /// Pseudo-terminal and session process being set up.
    Spawning,
    /// Bytes are forwarded between transport and terminal.
    Serving,
    /// Torn down. Terminal.
    Closed,
}

impl SessionPhase {
    /// Check whether `next` may follow this phase.
    ///
    /// Phases only move forward one step at a time, except that `Closed` is
    /// reachable from anywhere but itself.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Connected, Negotiating)
                | (Negotiating, Spawning)
                | (Spawning, Serving)
                | (Connected | Negotiating | Spawning | Serving, Closed)
        )
    }

    /// Returns true once the session is closed.
    pub fn is_closed(self) -> bool {
        self == SessionPhase::Closed
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Connected => "Connected",
            SessionPhase::Negotiating => "Negotiating",
            SessionPhase::Spawning => "Spawning",
            SessionPhase::Serving => "Serving",
            SessionPhase::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Session state tracking.
#[derive(Debug)]
pub struct SessionState {
    /// Current phase.
    phase: SessionPhase,
    /// When the session was created.
    created_at: Instant,
    /// When the current phase was entered.
    entered_at: Instant,
}

impl SessionState {
    /// Create a session in the `Connected` phase.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            phase: SessionPhase::Connected,
            created_at: now,
            entered_at: now,
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: SessionPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::InvalidState {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        self.entered_at = Instant::now();
        Ok(())
    }

    /// Move to `Closed` unless already there.
    ///
    /// Returns false if the session was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase.is_closed() {
            return false;
        }
        self.phase = SessionPhase::Closed;
        self.entered_at = Instant::now();
        true
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time spent in the current phase.
    pub fn time_in_phase(&self) -> Duration {
        self.entered_at.elapsed()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
