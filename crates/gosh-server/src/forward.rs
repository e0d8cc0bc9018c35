//! Bidirectional forwarding between the transport and the PTY master.
//!
//! Two tasks copy raw bytes, one per direction. Each direction ends on its
//! own at EOF or on the first error. [`Forwarder::stop`] hands both
//! endpoints back so the owner performs the closes itself.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

use gosh_core::constants::FORWARD_BUF_SIZE;
use gosh_core::error::{Error, Result};

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Transport to PTY.
    pub inbound_bytes: u64,
    /// PTY to transport.
    pub outbound_bytes: u64,
}

struct Pump<R, W> {
    reader: R,
    writer: W,
    bytes: u64,
}

/// Running forwarding tasks.
pub struct Forwarder<T, M> {
    shutdown: watch::Sender<bool>,
    inbound: JoinHandle<Pump<ReadHalf<T>, WriteHalf<M>>>,
    outbound: JoinHandle<Pump<ReadHalf<M>, WriteHalf<T>>>,
    inbound_done: Option<oneshot::Receiver<()>>,
}

impl<T, M> Forwarder<T, M>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    M: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start forwarding between `transport` and `master`.
    pub fn start(transport: T, master: M) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (transport_read, transport_write) = tokio::io::split(transport);
        let (master_read, master_write) = tokio::io::split(master);
        let (done_tx, done_rx) = oneshot::channel();

        let inbound_rx = shutdown_rx.clone();
        let inbound = tokio::spawn(async move {
            let pump = pump(transport_read, master_write, inbound_rx, "inbound").await;
            let _ = done_tx.send(());
            pump
        });
        let outbound = tokio::spawn(pump(master_read, transport_write, shutdown_rx, "outbound"));

        Self {
            shutdown,
            inbound,
            outbound,
            inbound_done: Some(done_rx),
        }
    }

    /// Resolves once when the transport-to-PTY direction has ended.
    ///
    /// Cancel safe. After it resolved, further calls never complete.
    pub async fn inbound_closed(&mut self) {
        match self.inbound_done.as_mut() {
            Some(done) => {
                let _ = done.await;
                self.inbound_done = None;
            }
            None => std::future::pending().await,
        }
    }

    /// Stop both directions and return the endpoints.
    ///
    /// PTY output still in flight gets up to `drain` to reach the
    /// transport first.
    pub async fn stop(self, drain: Duration) -> Result<(T, M, ForwardStats)> {
        let Forwarder {
            shutdown,
            inbound,
            mut outbound,
            ..
        } = self;

        let drained = timeout(drain, &mut outbound).await.ok();
        if drained.is_none() {
            debug!(drain_ms = drain.as_millis() as u64, "PTY output not drained in time");
        }
        let _ = shutdown.send(true);

        let outbound = match drained {
            Some(joined) => joined,
            None => outbound.await,
        }
        .map_err(task_failed)?;
        let inbound = inbound.await.map_err(task_failed)?;

        let stats = ForwardStats {
            inbound_bytes: inbound.bytes,
            outbound_bytes: outbound.bytes,
        };
        let transport = inbound.reader.unsplit(outbound.writer);
        let master = outbound.reader.unsplit(inbound.writer);
        debug!(
            inbound_bytes = stats.inbound_bytes,
            outbound_bytes = stats.outbound_bytes,
            "Forwarding stopped"
        );
        Ok((transport, master, stats))
    }
}

fn task_failed(e: tokio::task::JoinError) -> Error {
    Error::Transport {
        message: format!("forwarding task failed: {}", e),
    }
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
    direction: &'static str,
) -> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; FORWARD_BUF_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    debug!(direction, "Forwarding source reached EOF");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(direction, error = %e, "Forwarding read failed");
                    break;
                }
            },
        };

        let write = async {
            writer.write_all(&buf[..n]).await?;
            writer.flush().await
        };
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            result = write => {
                if let Err(e) = result {
                    debug!(direction, error = %e, "Forwarding write failed");
                    break;
                }
            }
        }

        bytes += n as u64;
        trace!(direction, len = n, "Forwarded");
    }

    Pump {
        reader,
        writer,
        bytes,
    }
}
