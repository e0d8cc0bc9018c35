//! Credential provider backed by a password file.
//!
//! Each line is `name:salt:hex(sha256(salt || password))`. Blank lines and
//! lines starting with `#` are ignored. The file is read on every attempt.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use gosh_core::auth::{Conversation, CredentialProvider, PromptStyle, ProviderError, secrets_match};

/// Hex SHA-256 of `salt || password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry {
    salt: String,
    hash: String,
}

/// Verifies user name and password against a password file.
#[derive(Debug, Clone)]
pub struct PasswordFileProvider {
    path: PathBuf,
}

impl PasswordFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn entry(&self, user: &str) -> Result<Option<Entry>, ProviderError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::Other(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, ':');
            let (Some(name), Some(salt), Some(hash)) = (fields.next(), fields.next(), fields.next())
            else {
                warn!(path = %self.path.display(), line = lineno + 1, "Malformed password entry");
                continue;
            };
            if name == user {
                return Ok(Some(Entry {
                    salt: salt.to_string(),
                    hash: hash.to_ascii_lowercase(),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CredentialProvider for PasswordFileProvider {
    async fn authenticate(
        &self,
        user_hint: Option<&str>,
        conv: &mut dyn Conversation,
    ) -> Result<String, ProviderError> {
        let user = match user_hint {
            Some(user) => user.to_string(),
            None => conv.prompt(PromptStyle::EchoOn, "login: ").await?,
        };
        let password = conv.prompt(PromptStyle::EchoOff, "Password: ").await?;

        let entry = self.entry(&user).await?;
        // Unknown users cost the same hash as known ones.
        let (salt, expected) = match &entry {
            Some(entry) => (entry.salt.as_str(), entry.hash.as_str()),
            None => ("", ""),
        };
        let actual = hash_password(salt, &password);

        if entry.is_some() && secrets_match(expected.as_bytes(), actual.as_bytes()) {
            Ok(user)
        } else {
            conv.prompt(PromptStyle::ErrorMsg, "Login incorrect").await?;
            Err(ProviderError::AuthFailed(user))
        }
    }
}
