//! In-memory strategy and virtual-clock environment for unit tests.

use std::{
    cell::Cell,
    collections::VecDeque,
    rc::Rc,
};

use rand::{rngs::SmallRng, RngCore, SeedableRng};

use crate::{code::Code, env::Environment, strategy::Strategy};

/// Shared virtual microsecond clock.
#[derive(Clone)]
pub(crate) struct TestClock(Rc<Cell<u32>>);

impl TestClock {
    pub fn now(&self) -> u32 {
        self.0.get()
    }

    pub fn advance(&self, us: u32) {
        self.0.set(self.0.get().wrapping_add(us));
    }
}

/// Scripted in-memory strategy.
///
/// Bytes put on the wire accumulate in `sent`; reads drain `inbox`.
/// `receive_response` pops `script` first, then falls back to
/// `auto_response`, then to `Fail` (silence). Waits advance the shared
/// clock so bounded loops driven by virtual time terminate.
pub(crate) struct TestStrategy {
    clock: TestClock,
    pub inbox: VecDeque<u8>,
    pub sent: Vec<u8>,
    pub script: VecDeque<Code>,
    pub auto_response: Option<Code>,
    pub responses_sent: Vec<Code>,
    pub jammed: bool,
}

/// Byte-wait cost of an empty inbox poll, in virtual microseconds.
const RECEIVE_WINDOW: u32 = 100;
/// Wait cost of listening for a synchronous response.
const RESPONSE_WINDOW: u32 = 200;

impl Strategy for TestStrategy {
    fn can_start(&mut self) -> bool {
        !self.jammed
    }

    fn send_byte(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn receive_byte(&mut self) -> Option<u8> {
        match self.inbox.pop_front() {
            Some(byte) => Some(byte),
            None => {
                self.clock.advance(RECEIVE_WINDOW);
                None
            }
        }
    }

    fn send_response(&mut self, response: Code) {
        self.responses_sent.push(response);
    }

    fn receive_response(&mut self) -> Code {
        self.clock.advance(RESPONSE_WINDOW);
        self.script
            .pop_front()
            .or(self.auto_response)
            .unwrap_or(Code::Fail)
    }
}

/// Virtual-time environment with a deterministic RNG.
pub(crate) struct TestEnv {
    clock: TestClock,
    rng: SmallRng,
}

impl Environment for TestEnv {
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

/// A strategy and environment sharing one virtual clock, plus a handle to
/// drive that clock from the test body.
pub(crate) fn test_pair() -> (TestStrategy, TestEnv, TestClock) {
    let clock = TestClock(Rc::new(Cell::new(0)));
    let strategy = TestStrategy {
        clock: clock.clone(),
        inbox: VecDeque::new(),
        sent: Vec::new(),
        script: VecDeque::new(),
        auto_response: None,
        responses_sent: Vec::new(),
        jammed: false,
    };
    let env = TestEnv { clock: clock.clone(), rng: SmallRng::seed_from_u64(0xBADC0FFE) };
    (strategy, env, clock)
}
