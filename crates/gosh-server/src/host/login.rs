//! Answers a login program's own prompts with already gathered credentials.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use gosh_core::constants::MAX_PROMPT_LEN;
use gosh_core::error::{Error, Result};

const LOGIN_PROMPT: &str = "login:";
const PASSWORD_PROMPT: &str = "Password:";

/// Answer `login:` with `user` and, when given, `Password:` with `password`.
pub async fn bridge_login<M>(
    master: &mut M,
    user: &str,
    password: Option<&str>,
    wait: Duration,
) -> Result<()>
where
    M: AsyncRead + AsyncWrite + Unpin,
{
    expect_prompt(master, LOGIN_PROMPT, wait).await?;
    answer(master, user).await?;
    debug!(user = %user, "Answered login prompt");

    if let Some(password) = password {
        expect_prompt(master, PASSWORD_PROMPT, wait).await?;
        answer(master, password).await?;
        debug!("Answered password prompt");
    }
    Ok(())
}

/// Read up to the next `:` and require it to end with `expected`.
async fn expect_prompt<M>(master: &mut M, expected: &str, wait: Duration) -> Result<()>
where
    M: AsyncRead + Unpin,
{
    let prompt = timeout(wait, read_prompt(master))
        .await
        .map_err(|_| Error::Process {
            message: format!("no {:?} prompt within {}s", expected, wait.as_secs()),
        })??;

    if prompt.trim_end().ends_with(expected) {
        Ok(())
    } else {
        let start = prompt.char_indices().rev().nth(31).map_or(0, |(i, _)| i);
        let shown = &prompt[start..];
        Err(Error::Process {
            message: format!("expected {:?} prompt, got {:?}", expected, shown),
        })
    }
}

async fn read_prompt<M>(master: &mut M) -> Result<String>
where
    M: AsyncRead + Unpin,
{
    let mut prompt = Vec::new();
    loop {
        let byte = match master.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::Process {
                    message: "login program closed the terminal".to_string(),
                });
            }
            Err(e) => {
                return Err(Error::Pty {
                    message: format!("reading login prompt: {}", e),
                });
            }
        };
        prompt.push(byte);
        if byte == b':' {
            return Ok(String::from_utf8_lossy(&prompt).into_owned());
        }
        if prompt.len() >= MAX_PROMPT_LEN {
            return Err(Error::Process {
                message: format!("no prompt within {} bytes", MAX_PROMPT_LEN),
            });
        }
    }
}

async fn answer<M>(master: &mut M, text: &str) -> Result<()>
where
    M: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.push(b'\n');
    master.write_all(&line).await.map_err(|e| Error::Pty {
        message: format!("answering login prompt: {}", e),
    })?;
    master.flush().await.map_err(|e| Error::Pty {
        message: format!("answering login prompt: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn answers_both_prompts() {
        let (mut master, mut term) = tokio::io::duplex(1024);
        term.write_all(b"\r\nhost login: ").await.unwrap();

        let program = tokio::spawn(async move {
            let mut buf = [0u8; 6];
            term.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"alice\n");
            term.write_all(b"Password: ").await.unwrap();
            let mut buf = [0u8; 3];
            term.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pw\n");
            term
        });

        bridge_login(&mut master, "alice", Some("pw"), WAIT).await.unwrap();
        let _term = program.await.unwrap();

        // The space after the last colon is left for the session.
        let mut rest = [0u8; 1];
        master.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b" ");
    }

    #[tokio::test]
    async fn user_only_when_no_password() {
        let (mut master, mut term) = tokio::io::duplex(1024);
        term.write_all(b"login: ").await.unwrap();
        bridge_login(&mut master, "alice", None, WAIT).await.unwrap();

        let mut buf = [0u8; 6];
        term.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"alice\n");
    }

    #[tokio::test]
    async fn unexpected_prompt_is_rejected() {
        let (mut master, mut term) = tokio::io::duplex(1024);
        term.write_all(b"Enter code:").await.unwrap();
        let err = bridge_login(&mut master, "alice", None, WAIT).await.unwrap_err();
        assert!(matches!(err, Error::Process { .. }));
    }

    #[tokio::test]
    async fn closed_terminal_is_rejected() {
        let (mut master, term) = tokio::io::duplex(1024);
        drop(term);
        let err = bridge_login(&mut master, "alice", None, WAIT).await.unwrap_err();
        assert!(matches!(err, Error::Process { .. }));
    }

    #[tokio::test]
    async fn endless_banner_is_bounded() {
        let (mut master, mut term) = tokio::io::duplex(4 * MAX_PROMPT_LEN);
        term.write_all(&vec![b'x'; 2 * MAX_PROMPT_LEN]).await.unwrap();
        let err = bridge_login(&mut master, "alice", None, WAIT).await.unwrap_err();
        assert!(matches!(err, Error::Process { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_program_times_out() {
        let (mut master, _term) = tokio::io::duplex(1024);
        let err = bridge_login(&mut master, "alice", None, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("login:"));
    }
}
