//! In-memory transport that records its own teardown.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::event_log::{Event, EventLog};

/// Capacity of each direction of a tracked transport.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Daemon side of an in-memory connection.
#[derive(Debug)]
pub struct TrackedStream {
    inner: DuplexStream,
    log: EventLog,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.log.record(Event::TransportShutdown);
        }
        result
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.log.record(Event::TransportClosed);
    }
}

/// Create a connected pair: the daemon side and the remote side.
pub fn tracked_pair(log: EventLog) -> (TrackedStream, DuplexStream) {
    let (daemon, remote) = tokio::io::duplex(PIPE_CAPACITY);
    (TrackedStream { inner: daemon, log }, remote)
}

/// Peer address used for in-memory connections.
pub fn test_peer_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)), 50123)
}

// =============================================================================
// Tests
// =============================================================================
