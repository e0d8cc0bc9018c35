//! gosh-test-utils: Test infrastructure for gosh.
//!
//! Provides:
//! - FakePtyFactory: in-memory pseudo-terminals
//! - FakeLauncher: scripted session processes
//! - TrackedStream: in-memory transport recording its teardown
//! - RemotePeer: scripted remote endpoint for the handshake
//! - StaticIdentityDirectory, MemoryKeyStore, ScriptedProvider
//! - TestKeys: pre-generated RSA keys for deterministic testing
//! - TestCerts: fixed TLS CA and server certificate

mod event_log;
mod fake_auth;
mod fake_process;
mod fake_pty;
mod remote_peer;
mod test_certs;
mod test_keys;
mod tracked_stream;

pub use event_log::{Event, EventLog};
pub use fake_auth::{MemoryKeyStore, ScriptedProvider, StaticIdentityDirectory, test_identity};
pub use fake_process::{FakeBehavior, FakeLauncher, FakeProcess};
pub use fake_pty::{FakeMaster, FakePtyFactory, FakeSlave};
pub use remote_peer::{HandshakeEnd, RemotePeer};
pub use test_certs::TestCerts;
pub use test_keys::TestKeys;
pub use tracked_stream::{TrackedStream, test_peer_addr, tracked_pair};
