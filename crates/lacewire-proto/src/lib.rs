//! Wire format for the lacewire bus protocol.
//!
//! Lacewire is a multi-master communication bus: many devices share a
//! half-duplex medium (a single wire, a serial link, a radio channel) and
//! exchange addressed, CRC-protected, optionally acknowledged packets. This
//! crate defines the byte-level contract and nothing else:
//!
//! - [`ids`]: device id namespace and 4-byte bus ids
//! - [`header`]: per-packet flag bits and the overhead they imply
//! - [`crc8`]: the rolling 8-bit CRC every packet carries
//! - [`packet`]: compose/parse of the variable-overhead packet layout
//! - [`opcodes`]: one-byte codes used by the dynamic addressing protocol
//!
//! Compatibility across implementations requires bit-identical header
//! semantics and CRC parameters; both are fixed here and must not be
//! renegotiated at runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod crc8;
pub mod errors;
pub mod header;
pub mod ids;
pub mod opcodes;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use header::{overhead, HeaderFlags};
pub use ids::{BusId, BROADCAST, LOCALHOST, MASTER_ID, NOT_ASSIGNED};
pub use opcodes::AddressingOp;
pub use packet::{compose, parse, payload_range, PacketInfo, MAX_LENGTH};
