//! Protocol and configuration constants for gosh.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// First byte of every packet.
pub const PACKET_MARKER: u8 = b'?';

/// Separates the packet prefix from its payload.
pub const PREFIX_TERMINATOR: u8 = b':';

/// Terminates every packet except a key challenge.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Maximum length of a packet or reply line in bytes.
pub const MAX_LINE_LEN: usize = 4096;

/// Length of the random secret sent in a key challenge.
pub const SECRET_LEN: usize = 32;

/// Environment variable carrying the remote principal's user name.
pub const ENV_REMOTE_USER: &str = "USER";

/// Environment variable carrying the remote host name.
pub const ENV_REMOTE_HOSTNAME: &str = "HOSTNAME";

/// Fallback for [`ENV_REMOTE_HOSTNAME`].
pub const ENV_REMOTE_NAME: &str = "NAME";

/// Environment variable carrying the local user the remote wishes to assume.
pub const ENV_LOCAL_USER: &str = "GOSH_USER";

/// Terminal type variable; always negotiated first.
pub const ENV_TERM: &str = "TERM";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 2222;

/// Default maximum authentication attempts.
pub const DEFAULT_MAX_TRIES: u32 = 6;

/// Default authentication grace period.
pub const DEFAULT_LOGIN_GRACE_TIME: Duration = Duration::from_secs(120);

/// Default maximum concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Default configuration directory.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/gosh";

/// Configuration file name inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "goshd_config.toml";

/// Default TLS certificate.
pub const DEFAULT_CERT_FILE: &str = "/etc/gosh/certificate.pem";

/// Default TLS private key.
pub const DEFAULT_KEY_FILE: &str = "/etc/gosh/key.pem";

/// Directory below the key store holding per-user public keys.
pub const AUTHORIZED_KEYS_DIR: &str = "authorized_keys";

/// Extension of public key files in the key store.
pub const PUBLIC_KEY_EXTENSION: &str = "pub";

/// Default login program.
pub const DEFAULT_LOGIN_PROGRAM: &str = "/bin/login";

/// Shell used when an identity has none recorded.
pub const FALLBACK_SHELL: &str = "/bin/sh";

// =============================================================================
// Session Timing
// =============================================================================

/// Default time allowed for the login program to show a prompt.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum bytes read while waiting for a login program prompt.
pub const MAX_PROMPT_LEN: usize = 1024;

/// Time an interrupted process gets to exit before it is killed.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Time allowed to drain PTY output after the session process exited.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of the forwarding copy buffer.
pub const FORWARD_BUF_SIZE: usize = 4096;
