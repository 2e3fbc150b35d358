//! Reported error kinds and engine callbacks.
//!
//! All errors reach the caller through a single error sink taking a kind and
//! a contextual byte. None of them are fatal: the engine always returns to a
//! consistent, continuable state. Transient conditions (`Busy`, `Fail`,
//! `Nak`) are return codes, not errors, and never reach the sink.

use lacewire_proto::PacketInfo;

/// Error kinds reported through the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Payload plus overhead exceeds the maximum packet length. Rejected at
    /// composition; nothing was sent. Context byte: attempted total length.
    ContentTooLong,
    /// No free slot in the send queue. Context byte: queue capacity.
    PacketsBufferFull,
    /// A queued packet exhausted its attempt ceiling. Reported once per
    /// occurrence; the slot is then freed or reset as on success. Context
    /// byte: recipient device id.
    ConnectionLost,
    /// The addressing protocol exhausted its retry/collision budget; the
    /// device remains unassigned. Context byte: the addressing opcode
    /// involved.
    IdAcquisitionFail,
}

/// Receive callback: `(payload, packet_info)`.
///
/// Invoked for every valid application packet. Addressing packets are
/// consumed internally and never reach it.
pub type Receiver = Box<dyn FnMut(&[u8], &PacketInfo)>;

/// Error sink: `(kind, context_byte)`.
pub type ErrorSink = Box<dyn FnMut(ErrorKind, u8)>;

/// Default receive callback: drops the packet.
///
/// Defaults are explicit per-instance values, not process-wide handlers, so
/// engines on different buses cannot cross-contaminate.
pub(crate) fn dummy_receiver() -> Receiver {
    Box::new(|_payload, _info| {})
}

/// Default error sink: swallows the report.
pub(crate) fn dummy_error_sink() -> ErrorSink {
    Box::new(|_kind, _context| {})
}
