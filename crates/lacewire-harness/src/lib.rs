//! Deterministic simulation harness for lacewire protocol testing.
//!
//! This crate provides in-memory implementations of the `Strategy` and
//! `Environment` traits, enabling deterministic, reproducible testing of
//! the lacewire engine under collisions, corruption, frame loss and a
//! jammed channel, all on a virtual microsecond clock with a seeded RNG.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sim_env;
mod sim_medium;

pub use sim_env::{SimClock, SimEnv};
pub use sim_medium::{acking_devices, Attempt, Responder, SimMedium, SimStrategy};
