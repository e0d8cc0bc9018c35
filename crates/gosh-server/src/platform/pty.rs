//! PTY allocation.
//!
//! Uses the `nix` crate for Unix PTY support and `AsyncFd` for integration
//! with tokio's reactor.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use nix::pty::{OpenptyResult, Winsize, openpty};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use gosh_core::error::{Error, Result};
use gosh_core::platform::{PtyFactory, PtyPair};

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Opens PTYs with `openpty(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsPtyFactory;

impl PtyFactory for OsPtyFactory {
    type Master = PtyMaster;
    type Slave = PtySlave;

    fn open(&self) -> Result<PtyPair<PtyMaster, PtySlave>> {
        let winsize = Winsize {
            ws_row: DEFAULT_ROWS,
            ws_col: DEFAULT_COLS,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(&winsize, None).map_err(|e| Error::Pty {
            message: format!("failed to open pty: {}", e),
        })?;

        let slave_name = device_name(slave.as_raw_fd());
        set_nonblocking(master.as_raw_fd())?;
        let master = AsyncFd::new(File::from(master)).map_err(|e| Error::Pty {
            message: format!("failed to create AsyncFd: {}", e),
        })?;
        debug!(tty = %slave_name, "Opened PTY");

        Ok(PtyPair {
            master: PtyMaster { inner: master },
            slave: PtySlave { fd: slave },
            slave_name,
        })
    }
}

/// Daemon side of a PTY.
///
/// EIO on read means every slave descriptor is closed and is reported as
/// EOF.
#[derive(Debug)]
pub struct PtyMaster {
    inner: AsyncFd<File>,
}

impl AsyncRead for PtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => {
                    debug!("PTY read returned EIO (slave closed)");
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for PtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Process side of a PTY.
#[derive(Debug)]
pub struct PtySlave {
    fd: OwnedFd,
}

impl PtySlave {
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }
}

fn device_name(fd: RawFd) -> String {
    std::fs::read_link(format!("/proc/self/fd/{}", fd))
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| format!("pty fd {}", fd))
}

/// Set a file descriptor to non-blocking mode.
fn set_nonblocking(fd: RawFd) -> Result<()> {
    use nix::fcntl::{FcntlArg, OFlag, fcntl};

    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| Error::Pty {
        message: format!("fcntl F_GETFL failed: {}", e),
    })?;

    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;

    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| Error::Pty {
        message: format!("fcntl F_SETFL failed: {}", e),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn slave_output_reaches_master_and_close_is_eof() {
        // May fail in sandboxes without /dev/ptmx.
        let pair = match OsPtyFactory.open() {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("PTY open failed (may be expected in CI): {}", e);
                return;
            }
        };
        let PtyPair {
            mut master, slave, ..
        } = pair;

        let mut slave = File::from(slave.into_owned_fd());
        slave.write_all(b"hi\n").unwrap();

        let mut out = [0u8; 4];
        master.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"hi\r\n");

        drop(slave);
        let mut rest = Vec::new();
        master.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn master_input_reaches_slave() {
        let Ok(pair) = OsPtyFactory.open() else {
            return;
        };
        let PtyPair {
            mut master, slave, ..
        } = pair;

        master.write_all(b"abc\n").await.unwrap();
        let mut slave = File::from(slave.into_owned_fd());
        let mut line = [0u8; 4];
        slave.read_exact(&mut line).unwrap();
        assert_eq!(&line, b"abc\n");
    }
}
