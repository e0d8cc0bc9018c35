//! gosh-core: Shared library for the gosh remote shell daemon.
//!
//! This crate provides:
//! - Handshake packet definitions and stream helpers
//! - Authentication traits and RSA challenge helpers
//! - Session context and lifecycle state
//! - Operating-system seams (terminals, processes, accounts)
//! - Logging setup and the common error type

pub mod auth;
pub mod constants;
pub mod error;
pub mod identity;
pub mod logging;
pub mod platform;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
