//! Scripted remote endpoint speaking the handshake protocol.
//!
//! Answers environment requests from a map, prompts from a queue and key
//! challenges with an optional private key, recording every packet seen.

use std::collections::{HashMap, VecDeque};

use rsa::RsaPrivateKey;
use tokio::io::{
    AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tracing::debug;

use gosh_core::auth::decrypt_secret;
use gosh_core::constants::SECRET_LEN;
use gosh_core::error::{Error, Result};
use gosh_core::protocol::{Packet, read_line, read_packet, read_raw, write_line, write_raw};

/// How the daemon ended the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEnd {
    /// `?D1:` or `?D0:`.
    Done(bool),
    /// `?T:`.
    TimedOut,
    /// `?X:`.
    Exhausted,
}

/// Remote side of an in-memory connection.
pub struct RemotePeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    env: HashMap<String, String>,
    answers: VecDeque<String>,
    key: Option<RsaPrivateKey>,
    packets: Vec<Packet>,
}

impl RemotePeer {
    /// Wrap the remote end of a connection.
    pub fn new(stream: DuplexStream) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read),
            writer: write,
            env: HashMap::new(),
            answers: VecDeque::new(),
            key: None,
            packets: Vec::new(),
        }
    }

    /// Answer `?E:<name>` with `value`. Unknown names are answered empty.
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    /// Queue answers for `?U:` / `?P:` prompts, in order.
    pub fn with_answers<I, S>(mut self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers.extend(answers.into_iter().map(Into::into));
        self
    }

    /// Answer key challenges by decrypting with `key`.
    pub fn with_key(mut self, key: RsaPrivateKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Packets received so far.
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Names of the `?E:` requests received so far, in order.
    pub fn env_requests(&self) -> Vec<String> {
        self.packets
            .iter()
            .filter_map(|p| match p {
                Packet::EnvRequest(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Read one packet without answering it.
    pub async fn next_packet(&mut self) -> Result<Packet> {
        let packet = read_packet(&mut self.reader).await?;
        self.packets.push(packet.clone());
        Ok(packet)
    }

    /// Answer packets until the daemon ends the handshake.
    pub async fn handshake(&mut self) -> Result<HandshakeEnd> {
        loop {
            let packet = self.next_packet().await?;
            debug!(packet = %packet, "peer received packet");
            match packet {
                Packet::EnvRequest(name) => {
                    let value = self.env.get(&name).cloned().unwrap_or_default();
                    write_line(&mut self.writer, &value).await?;
                }
                Packet::UsernameRequest(_) | Packet::PasswordRequest(_) => {
                    let answer = self.answers.pop_front().unwrap_or_default();
                    write_line(&mut self.writer, &answer).await?;
                }
                Packet::KeyChallenge(len) => {
                    let ciphertext = read_raw(&mut self.reader, len).await?;
                    let reply = self
                        .key
                        .as_ref()
                        .and_then(|key| decrypt_secret(key, &ciphertext).ok())
                        .filter(|secret| secret.len() == SECRET_LEN)
                        .unwrap_or_else(|| vec![0u8; SECRET_LEN]);
                    write_raw(&mut self.writer, &reply).await?;
                }
                Packet::Done(success) => return Ok(HandshakeEnd::Done(success)),
                Packet::Timeout => return Ok(HandshakeEnd::TimedOut),
                Packet::MaxTriesExceeded => return Ok(HandshakeEnd::Exhausted),
            }
        }
    }

    /// Send one reply line.
    pub async fn reply(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.writer, line).await
    }

    /// Read one raw line from the daemon.
    pub async fn read_line(&mut self) -> Result<String> {
        read_line(&mut self.reader).await
    }

    /// Send session bytes.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        write_raw(&mut self.writer, data).await
    }

    /// Read exactly `len` session bytes.
    pub async fn recv_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .await
            .map_err(Error::transport)?;
        Ok(buf)
    }

    /// Read session bytes until the daemon closes the connection.
    pub async fn recv_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.reader
            .read_to_end(&mut out)
            .await
            .map_err(Error::transport)?;
        Ok(out)
    }

    /// Close the sending direction.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Error::transport)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gosh_core::protocol::write_packet;

    #[tokio::test]
    async fn answers_env_and_prompts() {
        let (daemon, remote) = tokio::io::duplex(1024);
        let mut peer = RemotePeer::new(remote)
            .with_env("TERM", "vt100")
            .with_answers(["alice"]);

        let daemon_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(daemon);
            let mut read = BufReader::new(read);
            write_packet(&mut write, &Packet::EnvRequest("TERM".into())).await.unwrap();
            let term = read_line(&mut read).await.unwrap();
            write_packet(&mut write, &Packet::EnvRequest("LANG".into())).await.unwrap();
            let lang = read_line(&mut read).await.unwrap();
            write_packet(&mut write, &Packet::UsernameRequest("login: ".into())).await.unwrap();
            let user = read_line(&mut read).await.unwrap();
            write_packet(&mut write, &Packet::Done(true)).await.unwrap();
            (term, lang, user)
        });

        assert_eq!(peer.handshake().await.unwrap(), HandshakeEnd::Done(true));
        let (term, lang, user) = daemon_task.await.unwrap();
        assert_eq!(term, "vt100");
        assert_eq!(lang, "");
        assert_eq!(user, "alice");
        assert_eq!(peer.env_requests(), vec!["TERM", "LANG"]);
    }
}
