//! TCP listener.
//!
//! Accepts connections and serves each one on its own task. The number of
//! concurrent sessions is bounded; once the limit is reached new
//! connections wait in the kernel backlog.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use gosh_core::error::{Error, Result};
use gosh_core::platform::{ProcessLauncher, PtyFactory};

use crate::host::SessionHost;
use crate::transport::TransportFactory;

/// Listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Time allowed for the transport handshake of a new connection.
    pub handshake_timeout: Duration,
}

/// Accepts connections and hands them to a [`SessionHost`].
pub struct Listener<F, P, L> {
    listener: TcpListener,
    local_addr: SocketAddr,
    transports: Arc<F>,
    host: Arc<SessionHost<P, L>>,
    sessions: Arc<Semaphore>,
    handshake_timeout: Duration,
}

impl<F, P, L> Listener<F, P, L>
where
    F: TransportFactory,
    P: PtyFactory,
    L: ProcessLauncher<P::Slave>,
{
    /// Bind to `addr`.
    pub async fn bind(
        addr: SocketAddr,
        config: ListenerConfig,
        transports: F,
        host: SessionHost<P, L>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        Ok(Self {
            listener,
            local_addr,
            transports: Arc::new(transports),
            host: Arc::new(host),
            sessions: Arc::new(Semaphore::new(config.max_sessions.max(1))),
            handshake_timeout: config.handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Sessions already running are left to finish on their own tasks.
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!(addr = %self.local_addr, "Server listening");
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = self.sessions.clone().acquire_owned() => permit.map_err(|_| Error::Transport {
                    message: "session limiter closed".to_string(),
                })?,
            };

            let accepted = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((tcp, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    tokio::spawn(handle_connection(
                        tcp,
                        peer,
                        Arc::clone(&self.transports),
                        Arc::clone(&self.host),
                        self.handshake_timeout,
                        permit,
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                }
            }
        }

        info!(addr = %self.local_addr, "Server stopped accepting connections");
        Ok(())
    }
}

async fn handle_connection<F, P, L>(
    tcp: TcpStream,
    peer: SocketAddr,
    transports: Arc<F>,
    host: Arc<SessionHost<P, L>>,
    handshake_timeout: Duration,
    _permit: OwnedSemaphorePermit,
) where
    F: TransportFactory,
    P: PtyFactory,
    L: ProcessLauncher<P::Slave>,
{
    let _ = tcp.set_nodelay(true);

    let transport = match timeout(handshake_timeout, transports.accept(tcp, peer)).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "Transport handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "Transport handshake timed out");
            return;
        }
    };

    match host.serve(transport, peer).await {
        Ok(summary) => info!(
            peer = %peer,
            user = summary.user.as_deref().unwrap_or(""),
            exit = ?summary.exit,
            inbound_bytes = summary.stats.inbound_bytes,
            outbound_bytes = summary.stats.outbound_bytes,
            "Connection finished"
        ),
        Err(e) if e.is_transport() => {
            debug!(peer = %peer, error = %e, "Connection dropped");
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "Connection handler error");
        }
    }
}
