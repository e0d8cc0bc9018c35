//! Error types for gosh-core.

use thiserror::Error;

use crate::protocol::Packet;

/// Main error type for gosh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unexpected packet.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Grace period elapsed before authentication finished.
    #[error("authentication timed out")]
    Timeout,

    /// Maximum number of authentication attempts reached.
    #[error("maximum authentication attempts ({attempts}) exceeded")]
    Exhausted { attempts: u32 },

    /// Network side failed; nothing more can be sent.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote side closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Spawning, signalling or reaping the session process failed.
    #[error("process error: {message}")]
    Process { message: String },

    /// Pseudo-terminal allocation or I/O failed.
    #[error("pty error: {message}")]
    Pty { message: String },

    /// Key material could not be loaded or used.
    #[error("key error: {message}")]
    Key { message: String },

    /// Invalid configuration value or file.
    #[error("config error: {message}")]
    Config { message: String },

    /// Invalid state transition.
    #[error("invalid state: cannot move from {from} to {to}")]
    InvalidState { from: String, to: String },
}

impl Error {
    /// Returns true if the connection cannot continue after this error.
    ///
    /// Only a rejected credential is locally recoverable (by retrying up to
    /// the configured limit).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::AuthenticationFailed)
    }

    /// Returns true if this error originates on the network side.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::ConnectionClosed | Error::Io(_)
        )
    }

    /// Packet that reports this error to the remote side before teardown.
    ///
    /// `Timeout` and `Exhausted` are announced by the authentication engine
    /// itself; transport failures cannot be reported at all.
    pub fn reply_packet(&self) -> Option<Packet> {
        match self {
            Error::Protocol { .. }
            | Error::AuthenticationFailed
            | Error::InvalidState { .. }
            | Error::Process { .. }
            | Error::Pty { .. } => Some(Packet::Done(false)),
            _ => None,
        }
    }

    /// Map an I/O error on the network side to a transport error.
    ///
    /// An unexpected EOF means the peer went away.
    pub fn transport(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Convenience result type for gosh operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_protocol() {
        let err = Error::Protocol {
            message: "unrecognized packet".into(),
        };
        assert_eq!(err.to_string(), "protocol error: unrecognized packet");
    }

    #[test]
    fn error_display_exhausted() {
        let err = Error::Exhausted { attempts: 6 };
        assert_eq!(
            err.to_string(),
            "maximum authentication attempts (6) exceeded"
        );
    }

    #[test]
    fn error_display_invalid_state() {
        let err = Error::InvalidState {
            from: "Closed".into(),
            to: "Serving".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state: cannot move from Closed to Serving"
        );
    }

    #[test]
    fn only_rejected_credentials_are_recoverable() {
        assert!(!Error::AuthenticationFailed.is_fatal());
        assert!(Error::Timeout.is_fatal());
        assert!(Error::Exhausted { attempts: 3 }.is_fatal());
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(
            Error::Protocol {
                message: "bad".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn reply_packets() {
        assert_eq!(
            Error::Protocol {
                message: "x".into()
            }
            .reply_packet(),
            Some(Packet::Done(false))
        );
        assert_eq!(
            Error::AuthenticationFailed.reply_packet(),
            Some(Packet::Done(false))
        );
        assert_eq!(Error::Timeout.reply_packet(), None);
        assert_eq!(Error::Exhausted { attempts: 1 }.reply_packet(), None);
        assert_eq!(Error::ConnectionClosed.reply_packet(), None);
    }

    #[test]
    fn unexpected_eof_is_connection_closed() {
        let err = Error::transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(err.is_transport());

        let err = Error::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
