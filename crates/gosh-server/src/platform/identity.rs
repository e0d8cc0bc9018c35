//! Account lookup in the system user database.

use nix::unistd::{Uid, User};

use gosh_core::error::{Error, Result};
use gosh_core::identity::{Identity, IdentityDirectory};

/// Looks accounts up with `getpwnam(3)` / `getpwuid(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentityDirectory;

impl IdentityDirectory for SystemIdentityDirectory {
    fn by_name(&self, name: &str) -> Result<Option<Identity>> {
        if name.is_empty() {
            return Ok(None);
        }
        let user = User::from_name(name).map_err(|e| Error::Process {
            message: format!("user lookup for {:?} failed: {}", name, e),
        })?;
        Ok(user.map(to_identity))
    }

    fn by_uid(&self, uid: u32) -> Result<Option<Identity>> {
        let user = User::from_uid(Uid::from_raw(uid)).map_err(|e| Error::Process {
            message: format!("user lookup for uid {} failed: {}", uid, e),
        })?;
        Ok(user.map(to_identity))
    }
}

fn to_identity(user: User) -> Identity {
    Identity {
        name: user.name,
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
        home: user.dir,
        shell: user.shell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_exists() {
        let root = SystemIdentityDirectory.by_uid(0).unwrap().unwrap();
        assert!(root.is_root());
        assert_eq!(
            SystemIdentityDirectory.by_name(&root.name).unwrap().map(|i| i.uid),
            Some(0)
        );
    }

    #[test]
    fn unknown_names_are_absent() {
        assert_eq!(SystemIdentityDirectory.by_name("").unwrap(), None);
        assert_eq!(
            SystemIdentityDirectory.by_name("gosh-no-such-user").unwrap(),
            None
        );
    }
}
