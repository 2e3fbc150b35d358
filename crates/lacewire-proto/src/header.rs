//! Per-packet header bits.
//!
//! The header is one byte of flags, and it drives the wire overhead of the
//! packet: the two mode bits decide which optional fields are present, so
//! composer and parser must agree on [`overhead`] exactly. A mismatch
//! desynchronizes every subsequent field offset.

use bitflags::bitflags;

bitflags! {
    /// Packet header flags (8 bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// Shared-medium mode: the recipient bus id is present.
        const MODE = 0b0000_0001;

        /// Sender info included: the sender id (and, in shared mode, the
        /// sender bus id) is present.
        const SENDER_INFO = 0b0000_0010;

        /// A synchronous acknowledge is requested from the recipient.
        const ACK_REQUEST = 0b0000_0100;

        /// Packet belongs to the addressing protocol and is consumed by the
        /// engine, never handed to the application.
        const ADDRESS = 0b0000_1000;
    }
}

impl HeaderFlags {
    /// Flag parsing is infallible: every byte value is a valid set of flags,
    /// unknown bits are preserved but never checked.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    /// Raw byte value as it travels on the wire.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.bits()
    }
}

impl Default for HeaderFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fixed per-packet overhead implied by a header, in bytes.
///
/// Overhead counts everything that is not payload: recipient id, length,
/// header, the optional bus-id and sender fields, and the trailing CRC.
/// It is a pure function of the `MODE` and `SENDER_INFO` bits only.
#[must_use]
pub const fn overhead(flags: HeaderFlags) -> u8 {
    match (flags.contains(HeaderFlags::MODE), flags.contains(HeaderFlags::SENDER_INFO)) {
        (true, true) => 13,  // + recipient bus(4) + sender bus(4) + sender id(1)
        (true, false) => 8,  // + recipient bus(4)
        (false, true) => 5,  // + sender id(1)
        (false, false) => 4, // recipient(1) + length(1) + header(1) + crc(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let flags = HeaderFlags::MODE | HeaderFlags::ACK_REQUEST;
        assert_eq!(HeaderFlags::from_byte(flags.to_byte()), flags);
    }

    #[test]
    fn unknown_bits_are_preserved() {
        let flags = HeaderFlags::from_byte(0xF0);
        assert_eq!(flags.to_byte(), 0xF0);
        assert!(!flags.contains(HeaderFlags::MODE));
    }

    #[test]
    fn overhead_table() {
        assert_eq!(overhead(HeaderFlags::empty()), 4);
        assert_eq!(overhead(HeaderFlags::SENDER_INFO), 5);
        assert_eq!(overhead(HeaderFlags::MODE), 8);
        assert_eq!(overhead(HeaderFlags::MODE | HeaderFlags::SENDER_INFO), 13);
    }

    #[test]
    fn overhead_ignores_other_bits() {
        let base = HeaderFlags::MODE | HeaderFlags::SENDER_INFO;
        let noisy = base | HeaderFlags::ACK_REQUEST | HeaderFlags::ADDRESS;
        assert_eq!(overhead(base), overhead(noisy));
    }
}
