//! Per-connection session types.
//!
//! This module provides:
//! - The session context built during negotiation and authentication
//! - The validated session lifecycle state machine

mod context;
mod state;

pub use context::{KeyChallengeState, SessionContext};
pub use state::{SessionPhase, SessionState};
