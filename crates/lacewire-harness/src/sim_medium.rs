//! In-memory shared medium implementing the byte-level `Strategy`.
//!
//! All endpoints attached to one [`SimMedium`] see each other's frames, the
//! way devices on a single wire do. A frame transmitted by one endpoint is
//! delivered into every other endpoint's inbox as it completes, and every
//! transmission is recorded with its virtual timestamp for assertions about
//! retry timing.
//!
//! # Synchronous responses
//!
//! The ACK/NAK that follows a frame is sub-frame-time on a real medium, so
//! the simulation resolves it immediately after the transmission:
//!
//! 1. a response another endpoint already put on the wire (via
//!    `send_response`) is consumed first;
//! 2. otherwise the medium's *responder* closure, standing in for remote
//!    receiver hardware that the test does not tick explicitly, is asked;
//! 3. otherwise the channel is silent and the transmitter times out.
//!
//! # Fault injection
//!
//! [`SimMedium::jam`] keeps the channel busy, [`SimMedium::corrupt_next`]
//! flips a bit in the next frame, [`SimMedium::drop_next`] loses whole
//! frames. All faults are deterministic; there is no random loss knob, a
//! test decides exactly what goes wrong and when.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use lacewire_core::{Code, Strategy};
use lacewire_proto::crc8;

use crate::sim_env::SimClock;

/// Virtual microseconds one byte occupies the wire.
const BYTE_TIME: u32 = 90;
/// Virtual cost of polling an empty inbox.
const RECEIVE_WINDOW: u32 = 100;
/// Virtual cost of listening for a synchronous response.
const RESPONSE_WINDOW: u32 = 200;

/// Stand-in for receiver hardware answering a transmitted frame: maps the
/// frame as it appeared on the wire to the synchronous response code.
pub type Responder = Box<dyn FnMut(&[u8]) -> Code>;

/// One recorded transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Virtual time at which the frame completed.
    pub time: u32,
    /// Index of the transmitting endpoint, in attach order.
    pub sender: usize,
    /// Frame bytes as transmitted (before fault injection).
    pub frame: Vec<u8>,
}

struct MediumState {
    clock: SimClock,
    inboxes: Vec<VecDeque<u8>>,
    /// Accumulating transmissions, one buffer per endpoint.
    outgoing: Vec<Vec<u8>>,
    /// Last frame each endpoint put on the wire, for the responder.
    last_sent: Vec<Option<Vec<u8>>>,
    log: Vec<Attempt>,
    pending_response: Option<Code>,
    responder: Option<Responder>,
    jammed: bool,
    corrupt_next: bool,
    drop_next: u32,
}

impl MediumState {
    /// Completes the frame endpoint `index` has been transmitting.
    fn commit(&mut self, index: usize) {
        let frame = std::mem::take(&mut self.outgoing[index]);
        self.clock.advance(frame.len() as u32 * BYTE_TIME);
        self.log.push(Attempt {
            time: self.clock.now(),
            sender: index,
            frame: frame.clone(),
        });
        // A new transmission invalidates any response still on the wire.
        self.pending_response = None;

        if self.drop_next > 0 {
            self.drop_next -= 1;
            self.last_sent[index] = None;
            return;
        }
        let mut frame = frame;
        if self.corrupt_next {
            self.corrupt_next = false;
            let last_payload = frame.len() - 2;
            frame[last_payload] ^= 0x01;
        }
        for (other, inbox) in self.inboxes.iter_mut().enumerate() {
            if other != index {
                inbox.extend(&frame);
            }
        }
        self.last_sent[index] = Some(frame);
    }
}

/// A shared wire connecting every endpoint created from it.
pub struct SimMedium {
    state: Rc<RefCell<MediumState>>,
}

impl SimMedium {
    /// An empty medium whose transmissions are timestamped on `clock`.
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self {
            state: Rc::new(RefCell::new(MediumState {
                clock,
                inboxes: Vec::new(),
                outgoing: Vec::new(),
                last_sent: Vec::new(),
                log: Vec::new(),
                pending_response: None,
                responder: None,
                jammed: false,
                corrupt_next: false,
                drop_next: 0,
            })),
        }
    }

    /// Attaches a new endpoint to the wire.
    #[must_use]
    pub fn endpoint(&self) -> SimStrategy {
        let mut state = self.state.borrow_mut();
        state.inboxes.push(VecDeque::new());
        state.outgoing.push(Vec::new());
        state.last_sent.push(None);
        SimStrategy { state: Rc::clone(&self.state), index: state.inboxes.len() - 1 }
    }

    /// Installs the responder answering synchronous response windows.
    pub fn set_responder(&self, responder: Responder) {
        self.state.borrow_mut().responder = Some(responder);
    }

    /// Jams or releases the channel: while jammed, channel sensing reports
    /// busy and half-duplex transmissions cannot start.
    pub fn jam(&self, jammed: bool) {
        self.state.borrow_mut().jammed = jammed;
    }

    /// Flips one bit in the next transmitted frame.
    pub fn corrupt_next(&self) {
        self.state.borrow_mut().corrupt_next = true;
    }

    /// Loses the next `count` frames entirely: no delivery, no response.
    pub fn drop_next(&self, count: u32) {
        self.state.borrow_mut().drop_next = count;
    }

    /// Every transmission so far, in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.borrow().log.clone()
    }
}

/// One endpoint's byte-level access to a [`SimMedium`].
pub struct SimStrategy {
    state: Rc<RefCell<MediumState>>,
    index: usize,
}

impl Strategy for SimStrategy {
    fn can_start(&mut self) -> bool {
        !self.state.borrow().jammed
    }

    fn send_byte(&mut self, byte: u8) {
        let mut state = self.state.borrow_mut();
        let index = self.index;
        state.outgoing[index].push(byte);
        // The second frame byte announces the total length; the frame is on
        // the wire once that many bytes have been written.
        let transmitted = state.outgoing[index].len();
        if transmitted >= 2 && transmitted == state.outgoing[index][1] as usize {
            state.commit(index);
        }
    }

    fn receive_byte(&mut self) -> Option<u8> {
        let mut state = self.state.borrow_mut();
        match state.inboxes[self.index].pop_front() {
            Some(byte) => Some(byte),
            None => {
                state.clock.advance(RECEIVE_WINDOW);
                None
            }
        }
    }

    fn send_response(&mut self, response: Code) {
        self.state.borrow_mut().pending_response = Some(response);
    }

    fn receive_response(&mut self) -> Code {
        let (pending, frame, mut responder) = {
            let mut state = self.state.borrow_mut();
            state.clock.advance(RESPONSE_WINDOW);
            (
                state.pending_response.take(),
                state.last_sent[self.index].take(),
                state.responder.take(),
            )
        };
        // The responder runs outside the borrow so it may inspect the medium.
        let code = if let Some(code) = pending {
            code
        } else if let (Some(frame), Some(respond)) = (frame.as_ref(), responder.as_mut()) {
            respond(frame)
        } else {
            Code::Fail
        };
        if let Some(respond) = responder {
            self.state.borrow_mut().responder = Some(respond);
        }
        code
    }
}

/// A responder emulating well-behaved devices holding the given ids: frames
/// addressed to one of them are acknowledged when intact and rejected when
/// corrupted; everything else meets silence.
#[must_use]
pub fn acking_devices(ids: &[u8]) -> Responder {
    let ids = ids.to_vec();
    Box::new(move |frame| {
        if frame.first().is_some_and(|id| ids.contains(id)) {
            if crc8::compute(frame) == 0 {
                Code::Ack
            } else {
                Code::Nak
            }
        } else {
            Code::Fail
        }
    })
}
