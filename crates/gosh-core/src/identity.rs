//! Local account lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::FALLBACK_SHELL;
use crate::error::{Error, Result};

/// A local account a session can run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    /// Login shell; empty when the account has none recorded.
    pub shell: PathBuf,
}

impl Identity {
    /// Returns true for the superuser.
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Login shell, falling back to `/bin/sh`.
    pub fn login_shell(&self) -> &Path {
        if self.shell.as_os_str().is_empty() {
            Path::new(FALLBACK_SHELL)
        } else {
            &self.shell
        }
    }
}

/// Directory of local accounts.
pub trait IdentityDirectory: Send + Sync {
    /// Look up an account by name.
    fn by_name(&self, name: &str) -> Result<Option<Identity>>;

    /// Look up an account by numeric id.
    fn by_uid(&self, uid: u32) -> Result<Option<Identity>>;
}

/// Run [`IdentityDirectory::by_name`] on the blocking pool.
///
/// Directories backed by the system account database may block.
pub async fn lookup_identity(
    directory: Arc<dyn IdentityDirectory>,
    name: &str,
) -> Result<Option<Identity>> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || directory.by_name(&name))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}
