//! gosh-server: the goshd remote shell daemon.
//!
//! Provides:
//! - Environment negotiation and authentication of incoming connections
//! - Session hosting on a pseudo-terminal with ordered teardown
//! - Byte forwarding between the transport and the terminal
//! - TLS transport, TCP listener and Unix platform implementations

pub mod auth;
pub mod cli;
pub mod config;
pub mod forward;
pub mod host;
pub mod listener;
pub mod negotiate;
pub mod platform;
pub mod transport;

pub use auth::{AuthConfig, Authenticator};
pub use cli::{Cli, CliLogFormat};
pub use config::DaemonConfig;
pub use forward::{ForwardStats, Forwarder};
pub use host::{HostServices, SessionConfig, SessionHost, SessionSummary};
pub use listener::{Listener, ListenerConfig};
pub use negotiate::Negotiator;
pub use transport::{TlsTransportFactory, TransportFactory};
