//! In-memory account directory, key store and credential provider.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gosh_core::auth::{Conversation, CredentialProvider, KeyStore, PromptStyle, ProviderError};
use gosh_core::error::Result;
use gosh_core::identity::{Identity, IdentityDirectory};

/// Build an identity with conventional home and shell.
pub fn test_identity(name: &str, uid: u32) -> Identity {
    Identity {
        name: name.to_string(),
        uid,
        gid: uid,
        home: PathBuf::from(if uid == 0 {
            "/root".to_string()
        } else {
            format!("/home/{}", name)
        }),
        shell: PathBuf::from("/bin/bash"),
    }
}

/// Fixed list of accounts.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityDirectory {
    identities: Vec<Identity>,
}

impl StaticIdentityDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account.
    pub fn with(mut self, identity: Identity) -> Self {
        self.identities.push(identity);
        self
    }
}

impl IdentityDirectory for StaticIdentityDirectory {
    fn by_name(&self, name: &str) -> Result<Option<Identity>> {
        Ok(self.identities.iter().find(|i| i.name == name).cloned())
    }

    fn by_uid(&self, uid: u32) -> Result<Option<Identity>> {
        Ok(self.identities.iter().find(|i| i.uid == uid).cloned())
    }
}

/// Key store backed by a map of `(local user, remote user)` to PEM bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    keys: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    lookups: Arc<AtomicU32>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pem` for `remote_user` logging in as `local_user`.
    pub fn with_key(self, local_user: &str, remote_user: &str, pem: impl Into<Vec<u8>>) -> Self {
        self.keys
            .lock()
            .unwrap()
            .insert((local_user.to_string(), remote_user.to_string()), pem.into());
        self
    }

    /// Number of lookups made.
    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl KeyStore for MemoryKeyStore {
    fn lookup(&self, local_user: &str, remote_user: &str) -> Result<Option<Vec<u8>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&(local_user.to_string(), remote_user.to_string()))
            .cloned())
    }
}

/// Credential provider checking a single user/password pair.
///
/// Each attempt asks for the user name (unless a hint is given) with an
/// echo-on prompt, then for the password with an echo-off prompt.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    user: String,
    password: String,
    banner: Option<String>,
    broken: bool,
    attempts: Arc<AtomicU32>,
}

impl ScriptedProvider {
    /// Accept exactly `user` with `password`.
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            banner: None,
            broken: false,
            attempts: Arc::default(),
        }
    }

    /// Send an informational message before every attempt.
    pub fn with_banner(mut self, banner: &str) -> Self {
        self.banner = Some(banner.to_string());
        self
    }

    /// Fail every attempt with a non-credential error.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Number of attempts started.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedProvider {
    async fn authenticate(
        &self,
        user_hint: Option<&str>,
        conv: &mut dyn Conversation,
    ) -> std::result::Result<String, ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(ProviderError::Other("password database unavailable".into()));
        }
        if let Some(banner) = &self.banner {
            conv.prompt(PromptStyle::TextInfo, banner).await?;
        }

        let user = match user_hint {
            Some(hint) => hint.to_string(),
            None => conv.prompt(PromptStyle::EchoOn, "login: ").await?,
        };
        let password = conv.prompt(PromptStyle::EchoOff, "Password: ").await?;

        if user == self.user && password == self.password {
            Ok(user)
        } else {
            conv.prompt(PromptStyle::ErrorMsg, "Login incorrect").await?;
            Err(ProviderError::AuthFailed(user))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
