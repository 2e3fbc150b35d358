//! One-byte operation codes for the dynamic addressing protocol.
//!
//! Addressing packets carry the `ADDRESS` header bit and one of these codes
//! as their first payload byte. They are consumed by the protocol engine and
//! never reach the application receive callback.

/// Addressing operations.
///
/// The numeric values are part of the wire contract. Codes outside this set
/// inside an `ADDRESS` packet are ignored by receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressingOp {
    /// Multi-master probe: "is this id taken?". A missing response means the
    /// id is free.
    Acquire = 199,
    /// Slave requests an id from the master, carrying its RID.
    Request = 200,
    /// Master grants an id (RID + assigned id); also used by the slave to
    /// confirm adoption back to the master.
    Confirm = 201,
    /// Revokes an assignment (RID + id); sent by the master to recall an id
    /// or by a slave voluntarily releasing its own.
    Negate = 203,
    /// Master roll-call asking assigned devices to announce themselves.
    List = 204,
    /// Device answer to a roll-call (RID + id).
    Refresh = 205,
}

impl AddressingOp {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Total conversion from a wire byte; `None` for unknown codes.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            199 => Some(Self::Acquire),
            200 => Some(Self::Request),
            201 => Some(Self::Confirm),
            203 => Some(Self::Negate),
            204 => Some(Self::List),
            205 => Some(Self::Refresh),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for op in [
            AddressingOp::Acquire,
            AddressingOp::Request,
            AddressingOp::Confirm,
            AddressingOp::Negate,
            AddressingOp::List,
            AddressingOp::Refresh,
        ] {
            assert_eq!(AddressingOp::from_u8(op.to_u8()), Some(op));
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(AddressingOp::from_u8(0), None);
        assert_eq!(AddressingOp::from_u8(202), None);
        assert_eq!(AddressingOp::from_u8(255), None);
    }
}
