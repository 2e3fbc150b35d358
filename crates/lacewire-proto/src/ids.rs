//! Device and bus identifiers.
//!
//! Device ids are a single byte. The namespace is partitioned: three values
//! are reserved, the rest (`1..=253`) are ordinary assignable ids. Uniqueness
//! within a bus is an invariant the addressing protocol exists to establish;
//! it is not otherwise checked.

/// Well-known id of the addressing authority on a master-slave bus.
pub const MASTER_ID: u8 = 0;

/// Packets addressed here are delivered to every device and never
/// acknowledged.
pub const BROADCAST: u8 = 254;

/// Sentinel meaning "no device id assigned yet".
pub const NOT_ASSIGNED: u8 = 255;

/// Four-byte identifier distinguishing independent logical buses that share
/// one physical medium.
pub type BusId = [u8; 4];

/// The default bus id. A local (non-shared) bus always uses it, and it is
/// omitted from the wire format to save overhead.
pub const LOCALHOST: BusId = [0, 0, 0, 0];

/// Returns true for ids a device may actually hold (`1..=253`).
#[must_use]
pub const fn is_assignable(id: u8) -> bool {
    id != MASTER_ID && id != BROADCAST && id != NOT_ASSIGNED
}
