//! Operating-system seams: pseudo-terminals and session processes.
//!
//! The daemon is generic over these traits so that sessions can be hosted
//! against in-memory fakes in tests.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

// =============================================================================
// Pseudo-terminals
// =============================================================================

/// An allocated pseudo-terminal.
#[derive(Debug)]
pub struct PtyPair<M, S> {
    /// Daemon side; read for process output, write for process input.
    pub master: M,
    /// Process side; handed to the launcher.
    pub slave: S,
    /// Device path of the slave side.
    pub slave_name: String,
}

/// Allocates pseudo-terminal pairs.
pub trait PtyFactory: Send + Sync + 'static {
    type Master: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Slave: Send + 'static;

    /// Open a new pair.
    fn open(&self) -> Result<PtyPair<Self::Master, Self::Slave>>;
}

// =============================================================================
// Processes
// =============================================================================

/// What to run on the slave side of a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Run as this user id; `None` keeps the daemon's credentials.
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub cwd: PathBuf,
    /// Complete environment; nothing is inherited from the daemon.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Look up a variable in the launch environment.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Signals the daemon sends to a session process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGINT
    Interrupt,
    /// SIGHUP
    Hangup,
    /// SIGKILL
    Kill,
}

/// How a session process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code when the process exited normally.
    pub code: Option<i32>,
    /// Signal number when the process was killed.
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Normal exit with `code`.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Death by signal `signal`.
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Returns true for exit code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// A running session process.
#[async_trait]
pub trait SessionProcess: Send + 'static {
    /// Process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Deliver a signal.
    fn signal(&mut self, signal: ProcessSignal) -> Result<()>;

    /// Wait for the process to exit and reap it.
    ///
    /// Cancel safe; calling again after completion returns the same status.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Reap the process if it already exited.
    fn try_wait(&mut self) -> Result<Option<ProcessExit>>;
}

/// Starts processes attached to a terminal slave of type `S`.
pub trait ProcessLauncher<S>: Send + Sync + 'static {
    type Process: SessionProcess;

    /// Start `spec` with `slave` as its controlling terminal and stdio.
    fn launch(&self, slave: S, spec: &LaunchSpec) -> Result<Self::Process>;
}
