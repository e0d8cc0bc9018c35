//! Session context negotiation.
//!
//! Environment values are requested one at a time with `?E:<name>`; the
//! next request is only sent once the previous reply line was read.

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::debug;

use gosh_core::constants::{
    ENV_LOCAL_USER, ENV_REMOTE_HOSTNAME, ENV_REMOTE_NAME, ENV_REMOTE_USER, ENV_TERM,
};
use gosh_core::error::Result;
use gosh_core::protocol::{Packet, read_line, write_packet};
use gosh_core::session::SessionContext;

/// Ask for the value of `name`; the reply is trimmed.
pub async fn request_env<S>(stream: &mut S, name: &str) -> Result<String>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    write_packet(stream, &Packet::EnvRequest(name.to_string())).await?;
    let value = read_line(stream).await?;
    Ok(value.trim().to_string())
}

/// Builds the session context from the remote side's environment.
#[derive(Debug, Clone)]
pub struct Negotiator {
    forward_env: Vec<String>,
}

impl Negotiator {
    /// `forward_env` lists variables copied into the session environment.
    pub fn new(forward_env: &[String]) -> Self {
        let mut ordered: Vec<String> = Vec::with_capacity(forward_env.len() + 1);
        if forward_env.iter().any(|n| n == ENV_TERM) {
            ordered.push(ENV_TERM.to_string());
        }
        for name in forward_env {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }
        Self { forward_env: ordered }
    }

    /// Forwarded variables in request order.
    pub fn forward_env(&self) -> &[String] {
        &self.forward_env
    }

    /// Run the exchange and fill `ctx`.
    ///
    /// Does not send `?D`; that follows authentication.
    pub async fn negotiate<S>(&self, stream: &mut S, ctx: &mut SessionContext) -> Result<()>
    where
        S: AsyncBufRead + AsyncWrite + Unpin,
    {
        for name in &self.forward_env {
            let value = request_env(stream, name).await?;
            if !value.is_empty() {
                ctx.set_env(name.as_str(), value);
            }
        }

        ctx.remote_user = request_env(stream, ENV_REMOTE_USER).await?;

        let mut host = request_env(stream, ENV_REMOTE_HOSTNAME).await?;
        if host.is_empty() {
            host = request_env(stream, ENV_REMOTE_NAME).await?;
        }
        if host.is_empty() {
            host = ctx.peer.ip().to_string();
        }
        ctx.remote_host = host;

        ctx.local_user = request_env(stream, ENV_LOCAL_USER).await?;

        debug!(
            peer = %ctx.peer,
            remote_user = %ctx.remote_user,
            remote_host = %ctx.remote_host,
            local_user = %ctx.local_user,
            env_count = ctx.env().len(),
            "Negotiated session context"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosh_core::Error;
    use gosh_test_utils::{RemotePeer, test_peer_addr};
    use tokio::io::BufReader;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn term_goes_first_and_duplicates_collapse() {
        let negotiator = Negotiator::new(&names(&["LANG", "TERM", "LANG", "TZ"]));
        assert_eq!(negotiator.forward_env(), names(&["TERM", "LANG", "TZ"]).as_slice());
    }

    #[tokio::test]
    async fn requests_block_on_each_reply() {
        let (daemon, remote) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(daemon);

        let task = tokio::spawn(async move {
            let term = request_env(&mut stream, "TERM").await?;
            let user = request_env(&mut stream, "USER").await?;
            Ok::<_, Error>((term, user))
        });

        let mut peer = RemotePeer::new(remote);
        assert_eq!(peer.next_packet().await.unwrap(), Packet::EnvRequest("TERM".into()));

        // Nothing else may arrive before the first reply.
        let early = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            peer.next_packet(),
        )
        .await;
        assert!(early.is_err());

        peer.reply(" xterm ").await.unwrap();
        assert_eq!(peer.next_packet().await.unwrap(), Packet::EnvRequest("USER".into()));
        peer.reply("bob").await.unwrap();

        let (term, user) = task.await.unwrap().unwrap();
        assert_eq!(term, "xterm");
        assert_eq!(user, "bob");
        assert_eq!(peer.env_requests(), vec!["TERM", "USER"]);
    }

    #[tokio::test]
    async fn full_exchange_fills_context() {
        let (daemon, remote) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(daemon);
        let mut peer = RemotePeer::new(remote)
            .with_env("TERM", "vt220")
            .with_env("USER", "bob")
            .with_env("NAME", "workstation")
            .with_env("GOSH_USER", "alice");
        let remote = tokio::spawn(async move {
            let _ = peer.handshake().await;
            peer.env_requests()
        });

        let mut ctx = SessionContext::new(test_peer_addr());
        Negotiator::new(&names(&["TERM", "LANG"]))
            .negotiate(&mut stream, &mut ctx)
            .await
            .unwrap();
        drop(stream);

        assert_eq!(ctx.env_var("TERM"), Some("vt220"));
        assert_eq!(ctx.env_var("LANG"), None);
        assert_eq!(ctx.remote_user, "bob");
        assert_eq!(ctx.remote_host, "workstation");
        assert_eq!(ctx.local_user, "alice");
        assert_eq!(
            remote.await.unwrap(),
            vec!["TERM", "LANG", "USER", "HOSTNAME", "NAME", "GOSH_USER"]
        );
    }

    #[tokio::test]
    async fn host_falls_back_to_peer_address() {
        let (daemon, remote) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(daemon);
        let mut peer = RemotePeer::new(remote);
        let remote = tokio::spawn(async move {
            let _ = peer.handshake().await;
        });

        let mut ctx = SessionContext::new(test_peer_addr());
        Negotiator::new(&[]).negotiate(&mut stream, &mut ctx).await.unwrap();
        drop(stream);
        remote.await.unwrap();

        assert_eq!(ctx.remote_host, "192.0.2.7");
        assert!(ctx.local_user.is_empty());
    }

    #[tokio::test]
    async fn hang_up_mid_exchange_is_an_error() {
        let (daemon, remote) = tokio::io::duplex(1024);
        drop(remote);
        let mut stream = BufReader::new(daemon);
        let mut ctx = SessionContext::new(test_peer_addr());
        let err = Negotiator::new(&names(&["TERM"]))
            .negotiate(&mut stream, &mut ctx)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
