//! Time and randomness abstraction.
//!
//! The engine never reads the system clock or system entropy directly; it
//! goes through [`Environment`] so that a test harness can substitute a
//! virtual microsecond clock and a seeded RNG and reproduce any run exactly.
//!
//! # Invariants
//!
//! - `micros()` is monotonic modulo `u32` wrap; elapsed time is always
//!   computed with `wrapping_sub`, matching the fixed-width microsecond
//!   arithmetic of the wire timings.
//! - `delay_micros()` is the only way the engine blocks; a virtual
//!   implementation advances its clock instead of sleeping.

use std::time::Instant;

use rand::{rngs::SmallRng, RngCore, SeedableRng};

/// Provides the engine with a microsecond clock and random bytes.
pub trait Environment {
    /// Current time in microseconds. Wraps around every ~71 minutes; all
    /// comparisons in the engine use wrapping arithmetic.
    fn micros(&self) -> u32;

    /// Blocks for the given number of microseconds (or advances virtual
    /// time by that amount).
    fn delay_micros(&mut self, us: u32);

    /// Fills `dest` with random bytes.
    fn random_bytes(&mut self, dest: &mut [u8]);

    /// A random `u32`, convenience over [`Environment::random_bytes`].
    fn random_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// A uniformly distributed value in `0..bound`; 0 when `bound` is 0.
    fn random_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            0
        } else {
            self.random_u32() % bound
        }
    }
}

/// Production environment: real clock, RNG seeded from OS entropy.
pub struct SystemEnv {
    origin: Instant,
    rng: SmallRng,
}

impl SystemEnv {
    /// Creates an environment with its clock origin at construction time.
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now(), rng: SmallRng::from_entropy() }
    }
}

impl Default for SystemEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SystemEnv {
    fn micros(&self) -> u32 {
        self.origin.elapsed().as_micros() as u32
    }

    fn delay_micros(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(u64::from(us)));
    }

    fn random_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }
}
