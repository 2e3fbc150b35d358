//! Virtual-time Environment implementation for deterministic testing.

use std::{cell::Cell, rc::Rc};

use lacewire_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Shared virtual microsecond clock.
///
/// Every clone observes the same time. The clock only moves when something
/// advances it: the engine's delays, the medium's transmission and receive
/// windows, or the test body itself. A whole simulated second completes in
/// microseconds of wall time.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u32>>);

impl SimClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in microseconds.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.0.get()
    }

    /// Moves virtual time forward. Wraps like the engine's timestamps do.
    pub fn advance(&self, us: u32) {
        self.0.set(self.0.get().wrapping_add(us));
    }
}

/// Simulation environment: virtual clock plus a seeded RNG.
///
/// Each bus in a simulation gets its own `SimEnv` (with its own seed, so
/// devices draw distinct random ids) while all of them share one
/// [`SimClock`]. Identical seeds reproduce identical runs byte for byte.
pub struct SimEnv {
    clock: SimClock,
    rng: ChaCha20Rng,
}

impl SimEnv {
    /// An environment on `clock` with a deterministic RNG.
    #[must_use]
    pub fn new(clock: SimClock, seed: u64) -> Self {
        Self { clock, rng: ChaCha20Rng::seed_from_u64(seed) }
    }
}

impl Environment for SimEnv {
    fn micros(&self) -> u32 {
        self.clock.now()
    }

    fn delay_micros(&mut self, us: u32) {
        self.clock.advance(us);
    }

    fn random_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }
}
