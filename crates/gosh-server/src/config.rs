//! Daemon configuration file.
//!
//! `goshd_config.toml` lives in the configuration directory. Every key is
//! optional; missing keys take the defaults below.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use gosh_core::constants::{
    AUTHORIZED_KEYS_DIR, CONFIG_FILE_NAME, DEFAULT_CONFIG_DIR, DEFAULT_LOGIN_GRACE_TIME,
    DEFAULT_LOGIN_PROGRAM, DEFAULT_MAX_SESSIONS, DEFAULT_MAX_TRIES, DEFAULT_PORT,
    DEFAULT_PROMPT_TIMEOUT, ENV_TERM,
};
use gosh_core::error::{Error, Result};

use crate::auth::AuthConfig;
use crate::host::SessionConfig;
use crate::listener::ListenerConfig;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerSection,
    pub logging: LoggingSection,
    pub authentication: AuthenticationSection,
    pub session: SessionSection,
}

/// `[Server]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct ServerSection {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/// `[Logging]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct LoggingSection {
    pub log_level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// `[Authentication]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct AuthenticationSection {
    pub max_tries: u32,
    /// Seconds.
    pub login_grace_time: u64,
    /// Root of `authorized_keys/<local user>/<remote user>.pub`.
    pub key_store: PathBuf,
    pub permit_root_login: bool,
    pub max_sessions: usize,
    /// `name:salt:sha256hex(salt || password)` lines.
    pub password_file: PathBuf,
}

impl Default for AuthenticationSection {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            login_grace_time: DEFAULT_LOGIN_GRACE_TIME.as_secs(),
            key_store: PathBuf::from(DEFAULT_CONFIG_DIR),
            permit_root_login: false,
            max_sessions: DEFAULT_MAX_SESSIONS,
            password_file: Path::new(DEFAULT_CONFIG_DIR).join("passwd"),
        }
    }
}

/// `[Session]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct SessionSection {
    pub login_program: PathBuf,
    pub forward_env: Vec<String>,
    /// Seconds.
    pub prompt_timeout: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            login_program: PathBuf::from(DEFAULT_LOGIN_PROGRAM),
            forward_env: vec![ENV_TERM.to_string(), "LANG".to_string()],
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT.as_secs(),
        }
    }
}

impl DaemonConfig {
    /// Load `goshd_config.toml` from `dir`.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config {
                    message: format!("cannot read {}: {}", path.display(), e),
                });
            }
        };

        let config = Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config { message } => Error::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::Config {
                message: message.to_string(),
            })
        };

        if self.authentication.max_tries == 0 {
            return invalid("Authentication.MaxTries must be at least 1");
        }
        if self.authentication.max_sessions == 0 {
            return invalid("Authentication.MaxSessions must be at least 1");
        }
        if self.authentication.login_grace_time == 0 {
            return invalid("Authentication.LoginGraceTime must be at least 1 second");
        }
        if self.session.prompt_timeout == 0 {
            return invalid("Session.PromptTimeout must be at least 1 second");
        }
        if self.session.forward_env.iter().any(|name| {
            name.is_empty() || name.contains(['=', '\n', '\r', '\0'])
        }) {
            return invalid("Session.ForwardEnv contains an invalid variable name");
        }
        Ok(())
    }

    /// Address the listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.address, self.server.port)
    }

    /// Directory holding `authorized_keys`.
    pub fn authorized_keys_dir(&self) -> PathBuf {
        self.authentication.key_store.join(AUTHORIZED_KEYS_DIR)
    }

    /// Authentication engine settings.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            max_tries: self.authentication.max_tries,
            login_grace_time: Duration::from_secs(self.authentication.login_grace_time),
            permit_root_login: self.authentication.permit_root_login,
        }
    }

    /// Session host settings.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            login_program: self.session.login_program.clone(),
            forward_env: self.session.forward_env.clone(),
            prompt_timeout: Duration::from_secs(self.session.prompt_timeout),
        }
    }

    /// Listener settings. The transport handshake shares the login grace time.
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_sessions: self.authentication.max_sessions,
            handshake_timeout: Duration::from_secs(self.authentication.login_grace_time),
        }
    }
}
