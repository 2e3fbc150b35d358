//! Error types for the lacewire wire format.

use thiserror::Error;

/// Errors raised while composing or parsing packets.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload plus overhead meets or exceeds the maximum packet length.
    /// Rejected at composition time; nothing is written.
    #[error("content too long: {length} bytes exceeds maximum {max}")]
    ContentTooLong {
        /// Total length the packet would have had
        length: usize,
        /// Maximum allowed packet length
        max: usize,
    },

    /// Buffer is shorter than the overhead its own header announces.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum size required by the header bits
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },
}

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
