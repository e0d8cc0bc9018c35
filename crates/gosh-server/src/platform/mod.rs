//! Operating-system implementations of the session collaborators.

mod identity;
mod keystore;
mod passwd;
mod process;
mod pty;

pub use identity::SystemIdentityDirectory;
pub use keystore::{FsKeyStore, escape_key_name};
pub use passwd::{PasswordFileProvider, hash_password};
pub use process::{OsProcess, OsProcessLauncher};
pub use pty::{OsPtyFactory, PtyMaster, PtySlave};
