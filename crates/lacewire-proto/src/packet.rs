//! Packet composition and parsing.
//!
//! Wire layout, ordered, with fields conditional on the header bits:
//!
//! ```text
//! recipient_id(1) · length(1, total) · header(1)
//!   · recipient_bus_id(4)  if MODE
//!   · sender_bus_id(4)     if MODE & SENDER_INFO
//!   · sender_id(1)         if SENDER_INFO
//!   · payload(variable) · crc(1)
//! ```
//!
//! `length` counts the whole packet, overhead included. The parser reads only
//! the fields indicated by the header bits of the inbound bytes, never the
//! receiver's own configuration: sender and receiver configurations may
//! legitimately differ during an addressing handshake.

use std::ops::Range;

use crate::{
    crc8,
    errors::{ProtocolError, Result},
    header::{overhead, HeaderFlags},
    ids::{BusId, LOCALHOST, NOT_ASSIGNED},
};

/// Maximum total packet length in bytes, overhead included. Packets that
/// would meet or exceed it are rejected at composition time, never silently
/// truncated.
pub const MAX_LENGTH: usize = 50;

/// Parsed metadata of a packet.
///
/// The engine overwrites its copy on every successfully received packet;
/// applications read it from the receive callback. Fields not present on the
/// wire keep their defaults (`NOT_ASSIGNED` sender, localhost bus ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    /// Raw header byte of the packet.
    pub header: HeaderFlags,
    /// Device id the packet was addressed to.
    pub receiver_id: u8,
    /// Bus id the packet was addressed to (shared mode only).
    pub receiver_bus_id: BusId,
    /// Device id of the sender, when sender info is included.
    pub sender_id: u8,
    /// Bus id of the sender (shared mode with sender info only).
    pub sender_bus_id: BusId,
}

impl Default for PacketInfo {
    fn default() -> Self {
        Self {
            header: HeaderFlags::empty(),
            receiver_id: NOT_ASSIGNED,
            receiver_bus_id: LOCALHOST,
            sender_id: NOT_ASSIGNED,
            sender_bus_id: LOCALHOST,
        }
    }
}

/// Composes a packet into `out`, returning the total length written.
///
/// `recipient_bus` and the sender fields are only written when the
/// corresponding header bits are set. The CRC over every byte but itself is
/// appended last.
///
/// # Errors
///
/// [`ProtocolError::ContentTooLong`] when `overhead + payload.len()` meets or
/// exceeds [`MAX_LENGTH`]; nothing is written to `out` in that case.
pub fn compose(
    recipient: u8,
    recipient_bus: &BusId,
    sender: u8,
    sender_bus: &BusId,
    flags: HeaderFlags,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let overhead = overhead(flags) as usize;
    let total = overhead + payload.len();
    if total >= MAX_LENGTH || total > out.len() {
        return Err(ProtocolError::ContentTooLong { length: total, max: MAX_LENGTH });
    }

    out[0] = recipient;
    out[1] = total as u8;
    out[2] = flags.to_byte();
    if flags.contains(HeaderFlags::MODE) {
        out[3..7].copy_from_slice(recipient_bus);
        if flags.contains(HeaderFlags::SENDER_INFO) {
            out[7..11].copy_from_slice(sender_bus);
            out[11] = sender;
        }
    } else if flags.contains(HeaderFlags::SENDER_INFO) {
        out[3] = sender;
    }

    out[overhead - 1..total - 1].copy_from_slice(payload);
    out[total - 1] = crc8::compute(&out[..total - 1]);
    Ok(total)
}

/// Parses packet metadata out of received bytes.
///
/// Reads only the fields the inbound header announces. Does not verify the
/// CRC; receivers roll the CRC incrementally as bytes arrive.
///
/// # Errors
///
/// [`ProtocolError::FrameTooShort`] if the buffer cannot hold the overhead
/// its own header bits announce.
pub fn parse(bytes: &[u8]) -> Result<PacketInfo> {
    if bytes.len() < 3 {
        return Err(ProtocolError::FrameTooShort { expected: 3, actual: bytes.len() });
    }
    let flags = HeaderFlags::from_byte(bytes[2]);
    let overhead = overhead(flags) as usize;
    if bytes.len() < overhead {
        return Err(ProtocolError::FrameTooShort { expected: overhead, actual: bytes.len() });
    }

    let mut info = PacketInfo { header: flags, receiver_id: bytes[0], ..PacketInfo::default() };
    if flags.contains(HeaderFlags::MODE) {
        info.receiver_bus_id.copy_from_slice(&bytes[3..7]);
        if flags.contains(HeaderFlags::SENDER_INFO) {
            info.sender_bus_id.copy_from_slice(&bytes[7..11]);
            info.sender_id = bytes[11];
        }
    } else if flags.contains(HeaderFlags::SENDER_INFO) {
        info.sender_id = bytes[3];
    }
    Ok(info)
}

/// Byte range the payload occupies inside a packet of `total_len` bytes.
#[must_use]
pub fn payload_range(flags: HeaderFlags, total_len: usize) -> Range<usize> {
    overhead(flags) as usize - 1..total_len - 1
}
