//! Stream helpers for reading and writing packets and reply lines.
//!
//! Readers must be buffered ([`AsyncBufRead`]) so that a packet line can be
//! consumed exactly up to its terminator, leaving any following raw bytes
//! (a key challenge ciphertext, or session data) in the buffer.
//!
//! All I/O failures are mapped to [`Error::Transport`] or
//! [`Error::ConnectionClosed`].

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::constants::{LINE_TERMINATOR, MAX_LINE_LEN, PREFIX_TERMINATOR};
use crate::error::{Error, Result};
use crate::protocol::packet::{Packet, PacketPrefix};

/// Longest possible `?<code><digits>:` prefix.
const MAX_PREFIX_LEN: usize = 24;

/// Read bytes up to and including `delim`, failing past `max` bytes.
///
/// EOF before the delimiter is reported as [`Error::ConnectionClosed`].
pub async fn read_until_bounded<R>(reader: &mut R, delim: u8, max: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut out = Vec::new();
    loop {
        let available = reader.fill_buf().await.map_err(Error::transport)?;
        if available.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        let (found, used) = match available.iter().position(|&b| b == delim) {
            Some(i) => (true, i + 1),
            None => (false, available.len()),
        };
        if out.len() + used > max {
            return Err(Error::Protocol {
                message: format!("line exceeds {} bytes", max),
            });
        }
        out.extend_from_slice(&available[..used]);
        reader.consume(used);

        if found {
            return Ok(out);
        }
    }
}

/// Read one reply line.
///
/// The terminator (and a preceding `\r`) is removed; callers trim further
/// as needed.
pub async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = read_until_bounded(reader, LINE_TERMINATOR, MAX_LINE_LEN).await?;
    raw.pop();
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| Error::Protocol {
        message: "reply line is not valid UTF-8".to_string(),
    })
}

/// Write one reply line followed by `\n`.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if line.contains('\n') {
        return Err(Error::Protocol {
            message: "reply line contains a line terminator".to_string(),
        });
    }
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(LINE_TERMINATOR);
    write_raw(writer, &buf).await
}

/// Read one packet.
///
/// For a key challenge only the `?K<n>:` prefix is consumed; the `n`
/// ciphertext bytes stay in the reader.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncBufRead + Unpin,
{
    let prefix_bytes = read_until_bounded(reader, PREFIX_TERMINATOR, MAX_PREFIX_LEN).await?;
    let prefix_text = std::str::from_utf8(&prefix_bytes).map_err(|_| Error::Protocol {
        message: "packet prefix is not valid UTF-8".to_string(),
    })?;
    let prefix = PacketPrefix::parse(prefix_text)?;

    if !prefix.code.is_line_terminated() {
        let packet = Packet::from_parts(prefix, "");
        trace!(packet = %packet, "received packet");
        return Ok(packet);
    }

    let rest = read_until_bounded(
        reader,
        LINE_TERMINATOR,
        MAX_LINE_LEN.saturating_sub(prefix_bytes.len()),
    )
    .await?;
    let rest = std::str::from_utf8(&rest).map_err(|_| Error::Protocol {
        message: "packet payload is not valid UTF-8".to_string(),
    })?;

    let mut line = String::with_capacity(prefix_text.len() + rest.len());
    line.push_str(prefix_text);
    line.push_str(rest);
    let packet = Packet::decode(&line)?;
    trace!(packet = %packet, "received packet");
    Ok(packet)
}

/// Encode and write one packet, then flush.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    write_raw(writer, &bytes).await?;
    trace!(packet = %packet, "sent packet");
    Ok(())
}

/// Read exactly `len` raw bytes.
pub async fn read_raw<R>(reader: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    if len > MAX_LINE_LEN {
        return Err(Error::Protocol {
            message: format!("raw block of {} bytes exceeds {}", len, MAX_LINE_LEN),
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(Error::transport)?;
    Ok(buf)
}

/// Write raw bytes and flush.
pub async fn write_raw<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await.map_err(Error::transport)?;
    writer.flush().await.map_err(Error::transport)
}
