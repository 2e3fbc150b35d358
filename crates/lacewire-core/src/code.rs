//! Transient return codes.

/// Outcome of a transmission attempt or a receive attempt.
///
/// These are return codes, not reported errors: the caller interprets them
/// (retry on `Busy`, ignore a packet addressed elsewhere, and so on). None of
/// them ever reaches the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Delivered and, where requested, acknowledged.
    Ack,
    /// The recipient saw the frame but rejected it (CRC mismatch).
    Nak,
    /// The medium is occupied, or the frame is addressed to another device
    /// or bus. Not an error; try again later or on another strategy.
    Busy,
    /// Nothing there: no byte arrived, no response, or the frame was
    /// malformed beyond recovery.
    Fail,
}

impl Code {
    /// True for outcomes that count as a delivery failure worth a retry.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Nak | Self::Busy | Self::Fail)
    }
}
