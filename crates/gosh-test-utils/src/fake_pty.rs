//! Fake PTY for testing without a real terminal.
//!
//! A pair is an in-memory duplex pipe: bytes written to the master come out
//! of the slave and vice versa. Dropping the slave makes master reads return
//! EOF once buffered output is consumed, which is how a real master behaves
//! after the session process exits.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use gosh_core::error::{Error, Result};
use gosh_core::platform::{PtyFactory, PtyPair};

use crate::event_log::{Event, EventLog};

/// Capacity of each direction of a fake PTY.
const PIPE_CAPACITY: usize = 16 * 1024;

/// Master side of a fake PTY.
#[derive(Debug)]
pub struct FakeMaster {
    inner: DuplexStream,
    log: EventLog,
}

impl AsyncRead for FakeMaster {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeMaster {
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
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Drop for FakeMaster {
    fn drop(&mut self) {
        self.log.record(Event::PtyClosed);
    }
}

/// Slave side of a fake PTY; the "process" end.
#[derive(Debug)]
pub struct FakeSlave {
    /// Stream the fake process reads input from and writes output to.
    pub stream: DuplexStream,
    /// Device name reported for the pair.
    pub name: String,
}

#[derive(Debug, Default)]
struct FactoryState {
    opened: AtomicUsize,
    fail: AtomicBool,
}

/// Factory producing in-memory PTY pairs.
#[derive(Debug, Clone, Default)]
pub struct FakePtyFactory {
    state: Arc<FactoryState>,
    log: EventLog,
}

impl FakePtyFactory {
    /// Create a factory recording into `log`.
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Arc::default(),
            log,
        }
    }

    /// Make every subsequent `open` fail.
    pub fn fail_open(&self) {
        self.state.fail.store(true, Ordering::SeqCst);
    }

    /// Number of pairs opened.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }
}

impl PtyFactory for FakePtyFactory {
    type Master = FakeMaster;
    type Slave = FakeSlave;

    fn open(&self) -> Result<PtyPair<FakeMaster, FakeSlave>> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(Error::Pty {
                message: "out of pseudo-terminals".to_string(),
            });
        }

        let n = self.state.opened.fetch_add(1, Ordering::SeqCst);
        let (master, slave) = tokio::io::duplex(PIPE_CAPACITY);
        let slave_name = format!("/dev/pts/fake{}", n);
        self.log.record(Event::PtyOpened);

        Ok(PtyPair {
            master: FakeMaster {
                inner: master,
                log: self.log.clone(),
            },
            slave: FakeSlave {
                stream: slave,
                name: slave_name.clone(),
            },
            slave_name,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn master_and_slave_are_connected() {
        let factory = FakePtyFactory::default();
        let mut pair = factory.open().unwrap();

        pair.master.write_all(b"ls\n").await.unwrap();
        let mut buf = [0u8; 3];
        pair.slave.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ls\n");

        pair.slave.stream.write_all(b"file\n").await.unwrap();
        let mut buf = [0u8; 5];
        pair.master.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"file\n");
        assert_eq!(factory.opened(), 1);
    }

    #[tokio::test]
    async fn dropping_slave_gives_master_eof_after_buffered_output() {
        let factory = FakePtyFactory::default();
        let PtyPair {
            mut master, slave, ..
        } = factory.open().unwrap();

        let mut stream = slave.stream;
        stream.write_all(b"bye").await.unwrap();
        drop(stream);

        let mut out = Vec::new();
        master.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"bye");
    }

    #[test]
    fn master_drop_is_logged() {
        let log = EventLog::new();
        let factory = FakePtyFactory::new(log.clone());
        let pair = factory.open().unwrap();
        drop(pair);
        assert_eq!(log.events(), vec![Event::PtyOpened, Event::PtyClosed]);
    }

    #[test]
    fn open_can_fail() {
        let factory = FakePtyFactory::default();
        factory.fail_open();
        assert!(matches!(factory.open(), Err(Error::Pty { .. })));
    }
}
