//! Daemon CLI implementation.
//!
//! Flags override the matching values of the configuration file.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use gosh_core::constants::{DEFAULT_CERT_FILE, DEFAULT_CONFIG_DIR, DEFAULT_KEY_FILE};
use gosh_core::logging::verbosity_for_level;

use crate::config::DaemonConfig;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for gosh_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => gosh_core::LogFormat::Text,
            CliLogFormat::Json => gosh_core::LogFormat::Json,
        }
    }
}

/// goshd - remote shell daemon.
#[derive(Debug, Parser)]
#[command(name = "goshd", version, about = "goshd - remote shell daemon")]
pub struct Cli {
    /// TLS certificate file (PEM format)
    #[arg(short = 'c', long = "cert", value_name = "FILE", default_value = DEFAULT_CERT_FILE)]
    pub cert_file: PathBuf,

    /// TLS private key file (PEM format)
    #[arg(short = 'k', long = "key", value_name = "FILE", default_value = DEFAULT_KEY_FILE)]
    pub key_file: PathBuf,

    /// Configuration directory holding goshd_config.toml
    #[arg(long = "conf", value_name = "DIR", default_value = DEFAULT_CONFIG_DIR, env = "GOSHD_CONF")]
    pub config_dir: PathBuf,

    /// Address to listen on (overrides Server.Address)
    #[arg(short = 'b', long = "bind")]
    pub bind_addr: Option<IpAddr>,

    /// Port to listen on (overrides Server.Port)
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Apply command-line overrides to `config`.
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(addr) = self.bind_addr {
            config.server.address = addr;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }

    /// Logging verbosity: the configured level raised by each `-v`.
    pub fn verbosity(&self, config: &DaemonConfig) -> u8 {
        verbosity_for_level(&config.logging.log_level).saturating_add(self.verbose)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::net::{Ipv4Addr, SocketAddr};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_values() {
        let cli = Cli::try_parse_from(["goshd"]).unwrap();
        assert_eq!(cli.cert_file, PathBuf::from("/etc/gosh/certificate.pem"));
        assert_eq!(cli.key_file, PathBuf::from("/etc/gosh/key.pem"));
        assert_eq!(cli.bind_addr, None);
        assert_eq!(cli.port, None);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, CliLogFormat::Text);
    }

    #[test]
    fn overrides_apply_to_config() {
        let cli = Cli::try_parse_from(["goshd", "-b", "127.0.0.1", "-p", "2022"]).unwrap();
        let mut config = DaemonConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            config.bind_addr(),
            "127.0.0.1:2022".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = Cli::try_parse_from(["goshd"]).unwrap();
        let mut config = DaemonConfig::default();
        config.server.port = 2200;
        cli.apply(&mut config);
        assert_eq!(config.server.port, 2200);
    }

    #[test]
    fn verbose_flags_raise_configured_level() {
        let cli = Cli::try_parse_from(["goshd", "-vv"]).unwrap();
        let mut config = DaemonConfig::default();
        assert_eq!(cli.verbosity(&config), 4);
        config.logging.log_level = "error".into();
        assert_eq!(cli.verbosity(&config), 2);
    }

    #[test]
    fn parse_files_and_log_options() {
        let cli = Cli::try_parse_from([
            "goshd",
            "--cert",
            "/tmp/cert.pem",
            "--key",
            "/tmp/key.pem",
            "--conf",
            "/tmp/gosh",
            "--log-file",
            "/tmp/goshd.log",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.cert_file, PathBuf::from("/tmp/cert.pem"));
        assert_eq!(cli.key_file, PathBuf::from("/tmp/key.pem"));
        assert_eq!(cli.config_dir, PathBuf::from("/tmp/gosh"));
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/goshd.log")));
        assert_eq!(
            gosh_core::LogFormat::from(cli.log_format),
            gosh_core::LogFormat::Json
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Cli::try_parse_from(["goshd", "-p", "70000"]).is_err());
        assert!(Cli::try_parse_from(["goshd", "-b", "not-an-ip"]).is_err());
        assert!(Cli::try_parse_from(["goshd", "--log-format", "xml"]).is_err());
    }
}
