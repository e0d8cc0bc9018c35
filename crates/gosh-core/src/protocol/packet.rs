//! Packet definitions and line encoding.
//!
//! Every packet is a single line `?<code>[<num>]:<payload>\n`. The one
//! exception is [`Packet::KeyChallenge`], which is written as `?K<n>:` with
//! no terminator and is immediately followed by `n` raw ciphertext bytes that
//! this layer never reads.

use std::fmt;

use crate::constants::{LINE_TERMINATOR, PACKET_MARKER, PREFIX_TERMINATOR};
use crate::error::{Error, Result};

/// A handshake packet sent from the daemon to the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Packet {
    /// Relay an echo-on prompt (`?U:<prompt>`).
    UsernameRequest(String),
    /// Relay an echo-off prompt (`?P:<prompt>`).
    PasswordRequest(String),
    /// Ask for the value of an environment variable (`?E:<name>`).
    EnvRequest(String),
    /// Announce `n` bytes of RSA ciphertext (`?K<n>:`).
    KeyChallenge(usize),
    /// Negotiation or authentication finished (`?D1:` / `?D0:`).
    Done(bool),
    /// Authentication grace period elapsed (`?T:`).
    Timeout,
    /// Maximum authentication attempts reached (`?X:`).
    MaxTriesExceeded,
}

/// Wire code of a packet, the letter after `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketCode {
    Username,
    Password,
    Env,
    Key,
    Done,
    Timeout,
    MaxTries,
}

impl PacketCode {
    /// Parse a wire letter.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'U' => Some(PacketCode::Username),
            'P' => Some(PacketCode::Password),
            'E' => Some(PacketCode::Env),
            'K' => Some(PacketCode::Key),
            'D' => Some(PacketCode::Done),
            'T' => Some(PacketCode::Timeout),
            'X' => Some(PacketCode::MaxTries),
            _ => None,
        }
    }

    /// Wire letter.
    pub fn letter(self) -> char {
        match self {
            PacketCode::Username => 'U',
            PacketCode::Password => 'P',
            PacketCode::Env => 'E',
            PacketCode::Key => 'K',
            PacketCode::Done => 'D',
            PacketCode::Timeout => 'T',
            PacketCode::MaxTries => 'X',
        }
    }

    /// Whether packets with this code carry free text after the `:`.
    pub fn has_text_payload(self) -> bool {
        matches!(
            self,
            PacketCode::Username | PacketCode::Password | PacketCode::Env
        )
    }

    /// Whether the packet line ends with `\n`.
    ///
    /// A key challenge is followed by raw bytes instead.
    pub fn is_line_terminated(self) -> bool {
        self != PacketCode::Key
    }
}

/// Parsed `?<code>[<num>]:` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPrefix {
    /// The packet code.
    pub code: PacketCode,
    /// Numeric argument, present for `K` and `D` only.
    pub arg: Option<usize>,
}

impl PacketPrefix {
    /// Parse a prefix including the leading `?` and trailing `:`.
    pub fn parse(prefix: &str) -> Result<Self> {
        let body = prefix
            .strip_prefix(PACKET_MARKER as char)
            .and_then(|rest| rest.strip_suffix(PREFIX_TERMINATOR as char))
            .ok_or_else(|| unrecognized(prefix))?;

        let mut chars = body.chars();
        let letter = chars.next().ok_or_else(|| unrecognized(prefix))?;
        let code = PacketCode::from_letter(letter).ok_or_else(|| unrecognized(prefix))?;
        let digits = chars.as_str();

        let arg = match code {
            PacketCode::Key | PacketCode::Done => {
                // Only the canonical decimal form: no sign, no leading zeros.
                let canonical = !digits.is_empty()
                    && digits.bytes().all(|b| b.is_ascii_digit())
                    && (digits == "0" || !digits.starts_with('0'));
                if !canonical {
                    return Err(unrecognized(prefix));
                }
                Some(digits.parse::<usize>().map_err(|_| unrecognized(prefix))?)
            }
            _ if !digits.is_empty() => return Err(unrecognized(prefix)),
            _ => None,
        };

        if code == PacketCode::Done && !matches!(arg, Some(0) | Some(1)) {
            return Err(unrecognized(prefix));
        }

        Ok(Self { code, arg })
    }
}

impl Packet {
    /// Wire code of this packet.
    pub fn code(&self) -> PacketCode {
        match self {
            Packet::UsernameRequest(_) => PacketCode::Username,
            Packet::PasswordRequest(_) => PacketCode::Password,
            Packet::EnvRequest(_) => PacketCode::Env,
            Packet::KeyChallenge(_) => PacketCode::Key,
            Packet::Done(_) => PacketCode::Done,
            Packet::Timeout => PacketCode::Timeout,
            Packet::MaxTriesExceeded => PacketCode::MaxTries,
        }
    }

    /// Encode to wire bytes.
    ///
    /// Fails if a text payload contains a line terminator, which would split
    /// the packet in two on the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let letter = self.code().letter();
        let line = match self {
            Packet::UsernameRequest(text) | Packet::PasswordRequest(text) | Packet::EnvRequest(text) => {
                if text.contains(['\n', '\r']) {
                    return Err(Error::Protocol {
                        message: format!("payload of ?{}: packet contains a line terminator", letter),
                    });
                }
                format!("?{}:{}\n", letter, text)
            }
            Packet::KeyChallenge(n) => format!("?{}{}:", letter, n),
            Packet::Done(success) => format!("?{}{}:\n", letter, u8::from(*success)),
            Packet::Timeout | Packet::MaxTriesExceeded => format!("?{}:\n", letter),
        };
        Ok(line.into_bytes())
    }

    /// Decode one packet line.
    ///
    /// A single trailing `\n` (optionally preceded by `\r`) is ignored.
    /// Anything that does not match a known packet exactly is rejected.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.strip_suffix(LINE_TERMINATOR as char).unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let colon = line
            .find(PREFIX_TERMINATOR as char)
            .ok_or_else(|| unrecognized(line))?;
        let (prefix, payload) = line.split_at(colon + 1);
        let prefix = PacketPrefix::parse(prefix)?;

        if !prefix.code.has_text_payload() && !payload.is_empty() {
            return Err(unrecognized(line));
        }
        if payload.contains(['\n', '\r']) {
            return Err(unrecognized(line));
        }

        Ok(Self::from_parts(prefix, payload))
    }

    /// Build a packet from an already validated prefix and payload.
    pub(crate) fn from_parts(prefix: PacketPrefix, payload: &str) -> Self {
        match prefix.code {
            PacketCode::Username => Packet::UsernameRequest(payload.to_string()),
            PacketCode::Password => Packet::PasswordRequest(payload.to_string()),
            PacketCode::Env => Packet::EnvRequest(payload.to_string()),
            PacketCode::Key => Packet::KeyChallenge(prefix.arg.unwrap_or_default()),
            PacketCode::Done => Packet::Done(prefix.arg == Some(1)),
            PacketCode::Timeout => Packet::Timeout,
            PacketCode::MaxTries => Packet::MaxTriesExceeded,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::UsernameRequest(_) => write!(f, "?U"),
            Packet::PasswordRequest(_) => write!(f, "?P"),
            Packet::EnvRequest(name) => write!(f, "?E({})", name),
            Packet::KeyChallenge(n) => write!(f, "?K({} bytes)", n),
            Packet::Done(success) => write!(f, "?D({})", success),
            Packet::Timeout => write!(f, "?T"),
            Packet::MaxTriesExceeded => write!(f, "?X"),
        }
    }
}

fn unrecognized(line: &str) -> Error {
    let shown: String = line.chars().take(32).collect();
    Error::Protocol {
        message: format!("unrecognized packet {:?}", shown),
    }
}
