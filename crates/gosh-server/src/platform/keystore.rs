//! Public keys stored on disk.
//!
//! A key letting `remote` log in as `local` lives at
//! `<root>/<local>/<remote>.pub`, both names escaped with
//! [`escape_key_name`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use gosh_core::auth::KeyStore;
use gosh_core::constants::PUBLIC_KEY_EXTENSION;
use gosh_core::error::{Error, Result};

/// Key store reading PEM files below a directory.
#[derive(Debug, Clone)]
pub struct FsKeyStore {
    root: PathBuf,
}

impl FsKeyStore {
    /// `root` is the `authorized_keys` directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the key for `remote_user` logging in as `local_user`.
    pub fn key_path(&self, local_user: &str, remote_user: &str) -> PathBuf {
        let mut file = escape_key_name(remote_user);
        file.push('.');
        file.push_str(PUBLIC_KEY_EXTENSION);
        self.root.join(escape_key_name(local_user)).join(file)
    }
}

impl KeyStore for FsKeyStore {
    fn lookup(&self, local_user: &str, remote_user: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(local_user, remote_user);
        match std::fs::read(&path) {
            Ok(pem) => {
                debug!(path = %path.display(), "Found public key");
                Ok(Some(pem))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Key {
                message: format!("cannot read {}: {}", path.display(), e),
            }),
        }
    }
}

/// Make a user name safe as a single path component.
///
/// ASCII letters, digits, `_` and `-` are kept, as is `.` except in first
/// position; every other byte becomes `%XX`.
pub fn escape_key_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(escape_key_name("alice"), "alice");
        assert_eq!(escape_key_name("first.last"), "first.last");
        assert_eq!(escape_key_name("DOMAIN\\bob"), "DOMAIN%5Cbob");
        assert_eq!(escape_key_name("../etc"), "%2E.%2Fetc");
        assert_eq!(escape_key_name(".."), "%2E.");
        assert_eq!(escape_key_name("a/b"), "a%2Fb");
        assert_eq!(escape_key_name("é"), "%C3%A9");
        assert_eq!(escape_key_name(""), "%00");
    }

    #[test]
    fn paths_stay_below_root() {
        let store = FsKeyStore::new("/etc/gosh/authorized_keys");
        assert_eq!(
            store.key_path("alice", "bob"),
            PathBuf::from("/etc/gosh/authorized_keys/alice/bob.pub")
        );
        let sneaky = store.key_path("..", "../../shadow");
        assert!(sneaky.starts_with(store.root()));
        assert_eq!(sneaky.components().count(), store.root().components().count() + 2);
    }

    #[test]
    fn lookup_reads_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("alice")).unwrap();
        std::fs::write(dir.path().join("alice").join("bob.pub"), b"PEM").unwrap();

        assert_eq!(store.lookup("alice", "bob").unwrap(), Some(b"PEM".to_vec()));
        assert_eq!(store.lookup("alice", "carol").unwrap(), None);
        assert_eq!(store.lookup("nobody", "bob").unwrap(), None);
    }

    #[tokio::test]
    async fn disk_lookup_from_async_context() {
        use std::sync::Arc;

        use gosh_core::auth::lookup_key;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("alice")).unwrap();
        std::fs::write(dir.path().join("alice").join("bob.pub"), b"PEM").unwrap();
        let store: Arc<dyn KeyStore> = Arc::new(FsKeyStore::new(dir.path()));

        let found = lookup_key(store.clone(), "alice", "bob").await.unwrap();
        assert_eq!(found, Some(b"PEM".to_vec()));
        assert_eq!(lookup_key(store, "alice", "carol").await.unwrap(), None);
    }

    #[test]
    fn unreadable_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());
        // A directory where the key file should be.
        std::fs::create_dir_all(dir.path().join("alice").join("bob.pub")).unwrap();
        assert!(matches!(store.lookup("alice", "bob"), Err(Error::Key { .. })));
    }
}
