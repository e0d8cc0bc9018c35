//! Delegated-credential flow.
//!
//! A [`CredentialProvider`] drives the prompts; each one is relayed to the
//! remote side as a `?U:` or `?P:` packet and answered with one line.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use gosh_core::auth::{AuthMethod, AuthOutcome, Conversation, CredentialProvider, PromptStyle, ProviderError};
use gosh_core::error::Result;
use gosh_core::protocol::{Packet, read_line, write_packet};
use gosh_core::session::SessionContext;

/// Conversation relaying prompts over the connection.
pub(crate) struct WireConversation<'a, S> {
    stream: &'a mut S,
    user: Option<String>,
    password: Option<String>,
}

impl<'a, S> WireConversation<'a, S> {
    pub(crate) fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            user: None,
            password: None,
        }
    }

    /// Last echo-on and echo-off answers.
    pub(crate) fn into_answers(self) -> (Option<String>, Option<String>) {
        (self.user, self.password)
    }
}

#[async_trait]
impl<'a, S> Conversation for WireConversation<'a, S>
where
    S: AsyncBufRead + AsyncWrite + Unpin + Send,
{
    async fn prompt(&mut self, style: PromptStyle, text: &str) -> Result<String> {
        // Prompts travel as a single packet line.
        let text = text.replace(['\r', '\n'], " ");
        let packet = match style {
            PromptStyle::EchoOn => Packet::UsernameRequest(text),
            PromptStyle::EchoOff => Packet::PasswordRequest(text),
            PromptStyle::ErrorMsg => {
                warn!(message = %text, "Credential provider reported an error");
                return Ok(String::new());
            }
            PromptStyle::TextInfo => {
                debug!(message = %text, "Credential provider info");
                return Ok(String::new());
            }
        };

        write_packet(self.stream, &packet).await?;
        let answer = read_line(self.stream).await?.trim().to_string();

        match style {
            PromptStyle::EchoOn => self.user = Some(answer.clone()),
            _ => self.password = Some(answer.clone()),
        }
        Ok(answer)
    }
}

/// Run the provider until it accepts, the attempt limit is reached, or it
/// fails for a reason other than bad credentials.
///
/// Emits `?X:` when the limit is reached.
pub(crate) async fn run<S>(
    stream: &mut S,
    provider: &dyn CredentialProvider,
    ctx: &mut SessionContext,
    max_tries: u32,
) -> Result<AuthOutcome>
where
    S: AsyncBufRead + AsyncWrite + Unpin + Send,
{
    let hint = (!ctx.local_user.is_empty()).then(|| ctx.local_user.clone());
    let mut attempts = 0u32;

    loop {
        let mut conv = WireConversation::new(stream);
        let result = provider.authenticate(hint.as_deref(), &mut conv).await;
        let (user, password) = conv.into_answers();
        if let Some(user) = user {
            ctx.local_user = user;
        }
        if let Some(password) = password {
            ctx.set_password(password);
        }

        match result {
            Ok(principal) => {
                info!(peer = %ctx.peer, user = %principal, "Password authentication succeeded");
                return Ok(AuthOutcome::Accepted {
                    principal,
                    method: AuthMethod::Password,
                });
            }
            Err(ProviderError::AuthFailed(user)) => {
                attempts += 1;
                info!(
                    peer = %ctx.peer,
                    user = %user,
                    attempt = attempts,
                    max_tries,
                    "Password authentication failed"
                );
                if attempts >= max_tries {
                    write_packet(stream, &Packet::MaxTriesExceeded).await?;
                    return Ok(AuthOutcome::Exhausted);
                }
            }
            Err(ProviderError::Conversation(e)) => return Err(e),
            Err(ProviderError::Other(message)) => {
                warn!(peer = %ctx.peer, error = %message, "Credential provider failed");
                return Ok(AuthOutcome::Rejected { retryable: false });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosh_core::Error;
    use gosh_test_utils::{RemotePeer, ScriptedProvider, test_peer_addr};
    use tokio::io::{BufReader, DuplexStream};

    fn pipe() -> (BufReader<DuplexStream>, RemotePeer) {
        let (daemon, remote) = tokio::io::duplex(1024);
        (BufReader::new(daemon), RemotePeer::new(remote))
    }

    #[tokio::test]
    async fn conversation_relays_prompts_and_records_answers() {
        let (mut stream, mut peer) = pipe();
        let remote = tokio::spawn(async move {
            assert_eq!(
                peer.next_packet().await.unwrap(),
                Packet::UsernameRequest("login: ".into())
            );
            peer.reply("alice\r").await.unwrap();
            assert_eq!(
                peer.next_packet().await.unwrap(),
                Packet::PasswordRequest("Password: ".into())
            );
            peer.reply("  secret ").await.unwrap();
        });

        let mut conv = WireConversation::new(&mut stream);
        assert_eq!(conv.prompt(PromptStyle::EchoOn, "login: ").await.unwrap(), "alice");
        assert_eq!(conv.prompt(PromptStyle::TextInfo, "hello").await.unwrap(), "");
        assert_eq!(conv.prompt(PromptStyle::EchoOff, "Password: ").await.unwrap(), "secret");
        assert_eq!(
            conv.into_answers(),
            (Some("alice".to_string()), Some("secret".to_string()))
        );
        remote.await.unwrap();
    }

    #[tokio::test]
    async fn prompt_newlines_are_flattened() {
        let (mut stream, mut peer) = pipe();
        let remote = tokio::spawn(async move {
            let packet = peer.next_packet().await.unwrap();
            peer.reply("pw").await.unwrap();
            packet
        });

        let mut conv = WireConversation::new(&mut stream);
        let answer = conv
            .prompt(PromptStyle::EchoOff, "Password for\nalice: ")
            .await
            .unwrap();
        assert_eq!(answer, "pw");
        assert_eq!(
            remote.await.unwrap(),
            Packet::PasswordRequest("Password for alice: ".into())
        );
    }

    #[tokio::test]
    async fn closed_transport_aborts() {
        let (mut stream, peer) = pipe();
        drop(peer);
        let mut ctx = SessionContext::new(test_peer_addr());
        let provider = ScriptedProvider::new("alice", "pw");
        let err = run(&mut stream, &provider, &mut ctx, 3).await.unwrap_err();
        assert!(err.is_transport() || matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let (mut stream, _peer) = pipe();
        let mut ctx = SessionContext::new(test_peer_addr());
        let provider = ScriptedProvider::new("alice", "pw").broken();
        let outcome = run(&mut stream, &provider, &mut ctx, 3).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected { retryable: false });
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let (mut stream, peer) = pipe();
        let remote = tokio::spawn(async move {
            let mut peer = peer.with_answers(["alice", "bad", "alice", "worse"]);
            let end = peer.handshake().await.unwrap();
            (end, peer.packets().len())
        });

        let mut ctx = SessionContext::new(test_peer_addr());
        let provider = ScriptedProvider::new("alice", "pw");
        let outcome = run(&mut stream, &provider, &mut ctx, 2).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Exhausted);
        assert_eq!(provider.attempts(), 2);

        let (end, packets) = remote.await.unwrap();
        assert_eq!(end, gosh_test_utils::HandshakeEnd::Exhausted);
        assert_eq!(packets, 5);
    }

    #[tokio::test]
    async fn hint_skips_user_prompt_and_answers_are_recorded() {
        let (mut stream, peer) = pipe();
        let remote = tokio::spawn(async move {
            let mut peer = peer.with_answers(["pw"]);
            let packet = peer.next_packet().await.unwrap();
            peer.reply("pw").await.unwrap();
            packet
        });

        let mut ctx = SessionContext::new(test_peer_addr());
        ctx.local_user = "alice".into();
        let provider = ScriptedProvider::new("alice", "pw");

        let outcome = run(&mut stream, &provider, &mut ctx, 3).await.unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(ctx.local_user, "alice");
        assert_eq!(ctx.password(), Some("pw"));
        assert_eq!(
            remote.await.unwrap(),
            Packet::PasswordRequest("Password: ".into())
        );
    }
}
