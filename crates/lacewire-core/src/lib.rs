//! Protocol engine for the lacewire bus.
//!
//! This crate contains the state machines that turn a byte-level transport
//! into a reliable, addressed, multi-master bus: the fixed-capacity send
//! queue, the retry/back-off delivery loop, the receive validation state
//! machine, and the dynamic addressing protocols.
//!
//! It is decoupled from I/O and from the system clock:
//!
//! - all medium access goes through the [`strategy::Strategy`] trait
//!   (byte send/receive, channel sense, synchronous ACK/NAK exchange);
//! - time and randomness go through the [`env::Environment`] trait, so a
//!   harness can drive the engine on a virtual clock with a seeded RNG.
//!
//! The scheduling model is single-threaded cooperative: all progress happens
//! inside [`bus::Bus::update`] and [`bus::Bus::receive`] calls the caller
//! makes repeatedly. The only suspension points are the bounded waits of the
//! transport primitives and the back-off delays, all wall-clock bounded.
//!
//! # Modules
//!
//! - [`bus`]: the engine (dispatch/update/receive, configuration, callbacks)
//! - [`queue`]: fixed-capacity outbound slot table
//! - [`addressing`]: device-id acquisition protocols
//! - [`strategy`]: transport abstraction
//! - [`env`]: time and randomness abstraction
//! - [`code`]: transient return codes
//! - [`error`]: reported error kinds and callback types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod addressing;
pub mod bus;
pub mod code;
pub mod env;
pub mod error;
pub mod queue;
pub mod strategy;

#[cfg(test)]
mod testutil;

pub use bus::{Bus, CommunicationMode};
pub use code::Code;
pub use env::{Environment, SystemEnv};
pub use error::ErrorKind;
pub use queue::{Handle, MAX_SLOTS};
pub use strategy::Strategy;
