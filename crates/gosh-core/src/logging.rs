//! Tracing subscriber setup for the daemon.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a configured level name onto a verbosity count.
///
/// Unknown names map to `info`.
pub fn verbosity_for_level(level: &str) -> u8 {
    match level.to_ascii_lowercase().as_str() {
        "error" => 0,
        "warn" | "warning" => 1,
        "info" => 2,
        "debug" => 3,
        "trace" => 4,
        _ => 2,
    }
}

fn level_name(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `verbosity` counts up from 0 (`error`) to 4 (`trace`). Logs go to stderr
/// unless `log_file` is given, in which case they are appended to it.
/// `RUST_LOG` overrides the computed filter when set.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = level_name(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("goshd={level},gosh_core={level},gosh_server={level}")));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
    };
    installed.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = std::env::temp_dir().join("gosh-no-such-dir").join("goshd.log");
        assert!(matches!(
            init_logging(2, Some(&dir), LogFormat::Text),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn level_names_map_to_verbosity() {
        assert_eq!(verbosity_for_level("error"), 0);
        assert_eq!(verbosity_for_level("WARN"), 1);
        assert_eq!(verbosity_for_level("info"), 2);
        assert_eq!(verbosity_for_level("Debug"), 3);
        assert_eq!(verbosity_for_level("trace"), 4);
        assert_eq!(verbosity_for_level("chatty"), 2);
    }

    #[test]
    fn verbosity_roundtrips_through_level_name() {
        for v in 0..=4 {
            assert_eq!(verbosity_for_level(level_name(v)), v);
        }
        assert_eq!(level_name(9), "trace");
    }
}
