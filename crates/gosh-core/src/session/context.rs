//! Session context collected before the session process starts.

use std::fmt;
use std::net::SocketAddr;

/// Progress of the public-key challenge for this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyChallengeState {
    /// No lookup was made yet.
    #[default]
    NotAttempted,
    /// The key store holds no key for this principal.
    NoKey,
    /// A key was found and the challenge was answered correctly.
    Succeeded,
    /// A key was found but the challenge failed.
    Failed,
}

/// Everything known about a connection before its process is spawned.
///
/// The environment keeps insertion order; inserting an existing name
/// replaces the value in place.
#[derive(Clone)]
pub struct SessionContext {
    /// Transport peer address.
    pub peer: SocketAddr,
    /// Remote principal name (`USER` on the remote side).
    pub remote_user: String,
    /// Remote host name, or the peer address when none was given.
    pub remote_host: String,
    /// Local account the remote side wants to use.
    pub local_user: String,
    /// Password answered during the delegated flow.
    password: Option<String>,
    /// Public-key challenge progress.
    pub key_state: KeyChallengeState,
    env: Vec<(String, String)>,
}

impl SessionContext {
    /// Create an empty context for `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            remote_user: String::new(),
            remote_host: String::new(),
            local_user: String::new(),
            password: None,
            key_state: KeyChallengeState::default(),
            env: Vec::new(),
        }
    }

    /// Set or replace an environment variable.
    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.env.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.env.push((name, value)),
        }
    }

    /// Look up an environment variable.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Environment in insertion order.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Record the password answered in the delegated flow.
    pub fn set_password(&mut self, password: String) {
        self.password = Some(password);
    }

    /// Password answered in the delegated flow, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Forget the password once it has been used.
    pub fn clear_password(&mut self) {
        self.password = None;
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("peer", &self.peer)
            .field("remote_user", &self.remote_user)
            .field("remote_host", &self.remote_host)
            .field("local_user", &self.local_user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_state", &self.key_state)
            .field("env", &self.env)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new("127.0.0.1:4000".parse().unwrap())
    }

    #[test]
    fn env_keeps_insertion_order() {
        let mut ctx = ctx();
        ctx.set_env("TERM", "xterm");
        ctx.set_env("LANG", "C.UTF-8");
        ctx.set_env("TZ", "UTC");
        let names: Vec<_> = ctx.env().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["TERM", "LANG", "TZ"]);
    }

    #[test]
    fn env_replaces_in_place() {
        let mut ctx = ctx();
        ctx.set_env("TERM", "xterm");
        ctx.set_env("LANG", "C");
        ctx.set_env("TERM", "vt100");
        assert_eq!(ctx.env().len(), 2);
        assert_eq!(ctx.env()[0], ("TERM".to_string(), "vt100".to_string()));
        assert_eq!(ctx.env_var("TERM"), Some("vt100"));
        assert_eq!(ctx.env_var("HOME"), None);
    }

    #[test]
    fn password_lifecycle() {
        let mut ctx = ctx();
        assert_eq!(ctx.password(), None);
        ctx.set_password("hunter2".into());
        assert_eq!(ctx.password(), Some("hunter2"));
        ctx.clear_password();
        assert_eq!(ctx.password(), None);
    }

    #[test]
    fn debug_output_redacts_password() {
        let mut ctx = ctx();
        ctx.set_password("hunter2".into());
        let shown = format!("{:?}", ctx);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}
