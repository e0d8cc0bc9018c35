//! Authentication abstractions shared by the daemon and its tests.
//!
//! Two flows exist:
//! - Delegated credentials: a [`CredentialProvider`] drives a prompt
//!   [`Conversation`] which the daemon relays to the remote side
//! - Public-key challenge: a secret encrypted to a key from a [`KeyStore`]
//!   must be echoed back in plaintext

mod challenge;

pub use challenge::{
    decrypt_secret, encrypt_secret, generate_secret, parse_private_key, parse_public_key,
    secrets_match,
};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// How the principal proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Public-key challenge/response.
    PublicKey,
    /// Delegated username/password conversation.
    Password,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey => write!(f, "publickey"),
            AuthMethod::Password => write!(f, "password"),
        }
    }
}

/// Result of one authentication run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The principal was authenticated.
    Accepted { principal: String, method: AuthMethod },
    /// The attempt failed; `retryable` tells whether another flow may follow.
    Rejected { retryable: bool },
    /// The grace period elapsed first.
    TimedOut,
    /// The attempt limit was reached.
    Exhausted,
}

impl AuthOutcome {
    /// Returns true for [`AuthOutcome::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted { .. })
    }

    /// Error describing an unsuccessful outcome, `None` when accepted.
    ///
    /// `max_tries` is reported for [`AuthOutcome::Exhausted`].
    pub fn failure(&self, max_tries: u32) -> Option<Error> {
        match self {
            AuthOutcome::Accepted { .. } => None,
            AuthOutcome::Rejected { .. } => Some(Error::AuthenticationFailed),
            AuthOutcome::TimedOut => Some(Error::Timeout),
            AuthOutcome::Exhausted => Some(Error::Exhausted {
                attempts: max_tries,
            }),
        }
    }
}

/// Kind of prompt a credential provider asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Visible input, typically a user name.
    EchoOn,
    /// Hidden input, typically a password.
    EchoOff,
    /// An error message; no answer expected.
    ErrorMsg,
    /// An informational message; no answer expected.
    TextInfo,
}

/// Channel through which a credential provider talks to the principal.
#[async_trait]
pub trait Conversation: Send {
    /// Show `text` and return the answer.
    ///
    /// Messages that expect no answer return an empty string.
    async fn prompt(&mut self, style: PromptStyle, text: &str) -> Result<String>;
}

/// Error returned by a [`CredentialProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The supplied credentials were wrong; the caller may retry.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The conversation itself failed (transport gone, malformed reply).
    #[error(transparent)]
    Conversation(#[from] Error),

    /// Any other provider failure; not retried.
    #[error("credential provider error: {0}")]
    Other(String),
}

/// Pluggable username/password verifier.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Run one authentication attempt.
    ///
    /// Returns the authenticated principal name.
    async fn authenticate(
        &self,
        user_hint: Option<&str>,
        conv: &mut dyn Conversation,
    ) -> std::result::Result<String, ProviderError>;
}

/// Source of authorized public keys.
pub trait KeyStore: Send + Sync {
    /// PEM-encoded public key that lets `remote_user` log in as `local_user`.
    ///
    /// `Ok(None)` means no key is registered.
    fn lookup(&self, local_user: &str, remote_user: &str) -> Result<Option<Vec<u8>>>;
}

/// Run [`KeyStore::lookup`] on the blocking pool.
///
/// Stores may read from disk.
pub async fn lookup_key(
    store: Arc<dyn KeyStore>,
    local_user: &str,
    remote_user: &str,
) -> Result<Option<Vec<u8>>> {
    let local_user = local_user.to_string();
    let remote_user = remote_user.to_string();
    tokio::task::spawn_blocking(move || store.lookup(&local_user, &remote_user))
        .await
        .map_err(|e| Error::Key {
            message: format!("key lookup task failed: {}", e),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accepted() {
        let outcome = AuthOutcome::Accepted {
            principal: "alice".into(),
            method: AuthMethod::Password,
        };
        assert!(outcome.is_accepted());
        assert!(!AuthOutcome::TimedOut.is_accepted());
        assert!(!AuthOutcome::Rejected { retryable: true }.is_accepted());
    }

    #[test]
    fn failures_map_to_errors() {
        let accepted = AuthOutcome::Accepted {
            principal: "alice".into(),
            method: AuthMethod::PublicKey,
        };
        assert!(accepted.failure(3).is_none());

        let rejected = AuthOutcome::Rejected { retryable: false }.failure(3);
        assert!(matches!(rejected, Some(Error::AuthenticationFailed)));
        assert!(matches!(AuthOutcome::TimedOut.failure(3), Some(Error::Timeout)));
        assert!(matches!(
            AuthOutcome::Exhausted.failure(6),
            Some(Error::Exhausted { attempts: 6 })
        ));
    }

    struct OneKey;

    impl KeyStore for OneKey {
        fn lookup(&self, local_user: &str, remote_user: &str) -> Result<Option<Vec<u8>>> {
            Ok((local_user == "alice" && remote_user == "bob").then(|| b"pem".to_vec()))
        }
    }

    #[tokio::test]
    async fn key_lookup_runs_off_the_runtime() {
        let store: Arc<dyn KeyStore> = Arc::new(OneKey);
        let found = lookup_key(store.clone(), "alice", "bob").await.unwrap();
        assert_eq!(found.as_deref(), Some(&b"pem"[..]));
        assert!(lookup_key(store, "alice", "eve").await.unwrap().is_none());
    }

    #[test]
    fn method_display() {
        assert_eq!(AuthMethod::PublicKey.to_string(), "publickey");
        assert_eq!(AuthMethod::Password.to_string(), "password");
    }

    #[test]
    fn provider_error_from_conversation() {
        let err: ProviderError = Error::ConnectionClosed.into();
        assert!(matches!(err, ProviderError::Conversation(Error::ConnectionClosed)));
        assert_eq!(err.to_string(), "connection closed");
    }
}
