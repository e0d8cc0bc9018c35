//! Handshake wire protocol.
//!
//! This module provides:
//! - Packet definitions with strict line encoding
//! - Async helpers for reading and writing packets, reply lines and raw bytes

mod codec;
mod packet;

#[cfg(test)]
mod proptest;

pub use codec::{
    read_line, read_packet, read_raw, read_until_bounded, write_line, write_packet, write_raw,
};
pub use packet::{Packet, PacketCode, PacketPrefix};
