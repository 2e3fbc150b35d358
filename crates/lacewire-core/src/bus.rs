//! The protocol engine.
//!
//! A [`Bus`] owns one strategy (medium access), one environment (time and
//! randomness), a fixed-capacity send queue and the two application
//! callbacks. All protocol progress happens inside [`Bus::update`] and
//! [`Bus::receive`], called repeatedly by a single logical thread; there is
//! no preemption and no background task.
//!
//! Within one tick, slots are serviced in table order; no fairness guarantee
//! exists beyond that. A caller cancels a periodic send solely by removing
//! its slot.

use lacewire_proto::{
    compose, crc8, parse, payload_range, HeaderFlags, PacketInfo, ProtocolError,
    BROADCAST, MAX_LENGTH, NOT_ASSIGNED,
};
use lacewire_proto::{BusId, LOCALHOST};

use crate::{
    code::Code,
    env::Environment,
    error::{dummy_error_sink, dummy_receiver, ErrorKind, ErrorSink, Receiver},
    queue::{Handle, SendQueue, SlotState, MAX_SLOTS},
    strategy::Strategy,
};

/// Retry ceiling for one packet; exceeding it reports `ConnectionLost`.
pub const MAX_ATTEMPTS: u8 = 125;

/// Upper bound of the random jitter inserted after a contended attempt, in
/// microseconds.
pub const COLLISION_MAX_DELAY: u32 = 48;

/// Wall-clock budget of a blocking send: the cubic back-off of the final
/// permitted attempt (`MAX_ATTEMPTS`³ microseconds).
pub const MAX_BACK_OFF: u32 = (MAX_ATTEMPTS as u32).pow(3);

/// Communication mode of the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationMode {
    /// Bidirectional: transmissions sense the channel and wait for the
    /// synchronous response when one is requested.
    HalfDuplex,
    /// Monodirectional: never senses the channel, never waits for or sends
    /// acknowledgments.
    Simplex,
}

/// One lacewire bus endpoint.
pub struct Bus<S, E> {
    strategy: S,
    env: E,
    device_id: u8,
    bus_id: BusId,
    acknowledge: bool,
    shared: bool,
    sender_info: bool,
    router: bool,
    auto_delete: bool,
    mode: CommunicationMode,
    queue: SendQueue,
    /// Receive buffer, also reused as scratch by blocking sends.
    data: [u8; MAX_LENGTH],
    last_packet_info: PacketInfo,
    pub(crate) rid: u32,
    pub(crate) last_refresh: Option<u32>,
    receiver: Receiver,
    error_sink: ErrorSink,
}

impl<S: Strategy, E: Environment> Bus<S, E> {
    /// A bus with no id yet; call [`Bus::begin`] to acquire one dynamically.
    pub fn new(strategy: S, env: E) -> Self {
        Self::with_bus(strategy, env, LOCALHOST, NOT_ASSIGNED)
    }

    /// A local bus with a statically assigned device id.
    pub fn with_id(strategy: S, env: E, device_id: u8) -> Self {
        Self::with_bus(strategy, env, LOCALHOST, device_id)
    }

    /// A bus endpoint on a possibly shared medium. A non-localhost bus id
    /// switches the endpoint to shared mode.
    pub fn with_bus(strategy: S, env: E, bus_id: BusId, device_id: u8) -> Self {
        Self {
            strategy,
            env,
            device_id,
            bus_id,
            acknowledge: true,
            shared: bus_id != LOCALHOST,
            sender_info: true,
            router: false,
            auto_delete: true,
            mode: CommunicationMode::HalfDuplex,
            queue: SendQueue::new(),
            data: [0; MAX_LENGTH],
            last_packet_info: PacketInfo::default(),
            rid: 0,
            last_refresh: None,
            receiver: dummy_receiver(),
            error_sink: dummy_error_sink(),
        }
    }

    /// Header byte for outgoing packets under the current configuration.
    #[must_use]
    pub fn header_flags(&self) -> HeaderFlags {
        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::MODE, self.shared);
        flags.set(HeaderFlags::SENDER_INFO, self.sender_info);
        flags.set(HeaderFlags::ACK_REQUEST, self.acknowledge);
        flags
    }

    /// Composes a packet into the first free slot and schedules it.
    ///
    /// `timing` is the repeat interval in microseconds; 0 means fire-once.
    /// Pass `None` for `flags` to use the configured header.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::PacketsBufferFull`] when every slot is occupied,
    /// [`ErrorKind::ContentTooLong`] when the packet would exceed
    /// [`MAX_LENGTH`]. Both are also reported to the error sink.
    pub fn dispatch(
        &mut self,
        recipient: u8,
        bus_id: BusId,
        payload: &[u8],
        timing: u32,
        flags: Option<HeaderFlags>,
    ) -> Result<Handle, ErrorKind> {
        let flags = flags.unwrap_or_else(|| self.header_flags());
        let Some(handle) = self.queue.first_free() else {
            (self.error_sink)(ErrorKind::PacketsBufferFull, MAX_SLOTS as u8);
            return Err(ErrorKind::PacketsBufferFull);
        };

        let composed = compose(
            recipient,
            &bus_id,
            self.device_id,
            &self.bus_id,
            flags,
            payload,
            &mut self.queue.slots[handle].content,
        );
        match composed {
            Ok(total) => {
                let slot = &mut self.queue.slots[handle];
                slot.length = total as u8;
                slot.state = SlotState::ToBeSent;
                slot.registration = self.env.micros();
                slot.timing = timing;
                slot.attempts = 0;
                tracing::debug!(handle, recipient, total, "packet dispatched");
                Ok(handle)
            }
            Err(ProtocolError::ContentTooLong { length, .. }) => {
                (self.error_sink)(ErrorKind::ContentTooLong, length as u8);
                Err(ErrorKind::ContentTooLong)
            }
            Err(_) => Err(ErrorKind::ContentTooLong),
        }
    }

    /// Queues a fire-once packet on the local bus.
    pub fn send(&mut self, recipient: u8, payload: &[u8]) -> Result<Handle, ErrorKind> {
        self.dispatch(recipient, self.bus_id, payload, 0, None)
    }

    /// Queues a fire-once packet for a device on another bus.
    pub fn send_to_bus(
        &mut self,
        recipient: u8,
        bus_id: BusId,
        payload: &[u8],
    ) -> Result<Handle, ErrorKind> {
        self.dispatch(recipient, bus_id, payload, 0, None)
    }

    /// Queues a packet re-sent every `timing` microseconds until removed.
    pub fn send_repeatedly(
        &mut self,
        recipient: u8,
        payload: &[u8],
        timing: u32,
    ) -> Result<Handle, ErrorKind> {
        self.dispatch(recipient, self.bus_id, payload, timing, None)
    }

    /// Periodic variant of [`Bus::send_to_bus`].
    pub fn send_repeatedly_to_bus(
        &mut self,
        recipient: u8,
        bus_id: BusId,
        payload: &[u8],
        timing: u32,
    ) -> Result<Handle, ErrorKind> {
        self.dispatch(recipient, bus_id, payload, timing, None)
    }

    /// Queues a response to the sender of the last received packet.
    ///
    /// Returns `None` when that packet carried no usable sender (broadcast
    /// or sender info absent) or when dispatch failed; dispatch failures
    /// still reach the error sink.
    pub fn reply(&mut self, payload: &[u8]) -> Option<Handle> {
        let info = self.last_packet_info;
        if info.sender_id == BROADCAST || info.sender_id == NOT_ASSIGNED {
            return None;
        }
        self.dispatch(info.sender_id, info.sender_bus_id, payload, 0, None).ok()
    }

    /// Frees a slot immediately, whatever its state.
    pub fn remove(&mut self, handle: Handle) {
        self.queue.remove(handle);
    }

    /// Frees every slot, or only those addressed to `recipient`.
    pub fn remove_all(&mut self, recipient: Option<u8>) {
        self.queue.remove_all(recipient);
    }

    /// Occupied slots, optionally filtered to one recipient. Useful for
    /// flow control before dispatching more.
    #[must_use]
    pub fn count(&self, recipient: Option<u8>) -> u8 {
        self.queue.count(recipient)
    }

    /// One scheduling tick over the send queue.
    ///
    /// Every occupied slot whose back-off has elapsed gets one transmission
    /// attempt. Returns the number of slots still occupied afterwards.
    pub fn update(&mut self) -> u8 {
        let mut remaining: u8 = 0;
        for handle in 0..MAX_SLOTS {
            match self.queue.slots[handle].state {
                SlotState::Free => continue,
                SlotState::Delivered => {
                    remaining += 1;
                    continue;
                }
                SlotState::ToBeSent => remaining += 1,
            }

            let (registration, timing, attempts, length) = {
                let slot = &self.queue.slots[handle];
                (slot.registration, slot.timing, slot.attempts, slot.length as usize)
            };
            let back_off = u32::from(attempts).pow(3);
            let now = self.env.micros();
            if now.wrapping_sub(registration) <= timing.wrapping_add(back_off) {
                continue;
            }

            let simplex = self.mode == CommunicationMode::Simplex;
            let outcome =
                transmit(&mut self.strategy, simplex, &self.queue.slots[handle].content[..length]);

            if !outcome.is_failure() {
                if self.settle_slot(handle) {
                    remaining -= 1;
                }
                continue;
            }

            // A clean Fail means nobody answered; everything else suggests
            // contention, so jitter before the slot becomes eligible again.
            if outcome != Code::Fail {
                let jitter = self.env.random_below(COLLISION_MAX_DELAY);
                self.env.delay_micros(jitter);
            }

            self.queue.slots[handle].attempts += 1;
            if self.queue.slots[handle].attempts > MAX_ATTEMPTS {
                let recipient = self.queue.slots[handle].content[0];
                tracing::warn!(handle, recipient, "attempt ceiling exceeded, giving up");
                (self.error_sink)(ErrorKind::ConnectionLost, recipient);
                if self.settle_slot(handle) {
                    remaining -= 1;
                }
            }
        }
        remaining
    }

    /// Terminates a slot's retry cycle after success or ceiling exhaustion.
    /// Returns true when the slot was actually freed.
    fn settle_slot(&mut self, handle: Handle) -> bool {
        if self.queue.slots[handle].timing == 0 {
            if self.auto_delete {
                self.queue.remove(handle);
                return true;
            }
            self.queue.slots[handle].state = SlotState::Delivered;
        } else {
            let now = self.env.micros();
            let slot = &mut self.queue.slots[handle];
            slot.attempts = 0;
            slot.registration = now;
            slot.state = SlotState::ToBeSent;
        }
        false
    }

    /// Reads exactly one packet attempt from the strategy.
    ///
    /// Returns `Busy` when the frame is addressed to another device or bus
    /// (not an error: the caller may try another strategy), `Fail` on
    /// timeout or malformed length, `Nak` on CRC mismatch, `Ack` on
    /// delivery. Addressing packets are consumed internally and never reach
    /// the receive callback.
    pub fn receive(&mut self) -> Code {
        let mut crc: u8 = 0;
        self.data[1] = MAX_LENGTH as u8;
        let mut index = 0;
        while index < self.data[1] as usize {
            let Some(byte) = self.strategy.receive_byte() else {
                return Code::Fail;
            };
            self.data[index] = byte;

            if index == 0 && byte != self.device_id && byte != BROADCAST && !self.router {
                return Code::Busy;
            }
            if index == 1 && (usize::from(byte) < 4 || usize::from(byte) > MAX_LENGTH) {
                return Code::Fail;
            }
            if index == 2 {
                let shared_frame = HeaderFlags::from_byte(byte).contains(HeaderFlags::MODE);
                if shared_frame != self.shared && !self.router {
                    return Code::Busy;
                }
            }
            // Id equality is not enough on a shared medium: id 1 on bus 1
            // must not take a packet for id 1 on bus 2. Checked byte by byte
            // as the bus id arrives.
            if (3..7).contains(&index)
                && self.shared
                && !self.router
                && HeaderFlags::from_byte(self.data[2]).contains(HeaderFlags::MODE)
                && self.bus_id[index - 3] != byte
            {
                return Code::Busy;
            }

            crc = crc8::roll(byte, crc);
            index += 1;
        }

        let total = self.data[1] as usize;
        let flags = HeaderFlags::from_byte(self.data[2]);

        if flags.contains(HeaderFlags::ACK_REQUEST)
            && self.data[0] != BROADCAST
            && self.mode != CommunicationMode::Simplex
            && !self.router
        {
            let bus_match = !self.shared
                || (flags.contains(HeaderFlags::MODE) && self.data[3..7] == self.bus_id);
            if bus_match {
                self.strategy.send_response(if crc == 0 { Code::Ack } else { Code::Nak });
            }
        }

        if crc != 0 {
            return Code::Nak;
        }

        let Ok(info) = parse(&self.data[..total]) else {
            return Code::Fail;
        };
        self.last_packet_info = info;

        if !self.handle_addressing() {
            let range = payload_range(flags, total);
            (self.receiver)(&self.data[range], &self.last_packet_info);
        }
        Code::Ack
    }

    /// Loops [`Bus::receive`] until a packet is accepted or `duration`
    /// microseconds elapse; returns the last non-success code otherwise.
    pub fn receive_for(&mut self, duration: u32) -> Code {
        let started = self.env.micros();
        let mut outcome = Code::Fail;
        while self.env.micros().wrapping_sub(started) <= duration {
            outcome = self.receive();
            if outcome == Code::Ack {
                return outcome;
            }
        }
        outcome
    }

    /// Sends one packet without queue semantics, retrying internally with
    /// cubic back-off until ACK, the attempt ceiling, or the default
    /// wall-clock budget ([`MAX_BACK_OFF`]).
    pub fn send_packet_blocking(
        &mut self,
        recipient: u8,
        bus_id: BusId,
        payload: &[u8],
        flags: HeaderFlags,
    ) -> Code {
        self.send_packet_blocking_for(recipient, bus_id, payload, flags, MAX_BACK_OFF)
    }

    /// [`Bus::send_packet_blocking`] with an explicit wall-clock budget in
    /// microseconds.
    pub fn send_packet_blocking_for(
        &mut self,
        recipient: u8,
        bus_id: BusId,
        payload: &[u8],
        flags: HeaderFlags,
        budget: u32,
    ) -> Code {
        let composed = compose(
            recipient,
            &bus_id,
            self.device_id,
            &self.bus_id,
            flags,
            payload,
            &mut self.data,
        );
        let total = match composed {
            Ok(total) => total,
            Err(ProtocolError::ContentTooLong { length, .. }) => {
                (self.error_sink)(ErrorKind::ContentTooLong, length as u8);
                return Code::Fail;
            }
            Err(_) => return Code::Fail,
        };

        let simplex = self.mode == CommunicationMode::Simplex;
        let mut outcome = Code::Fail;
        let mut attempts: u32 = 0;
        let started = self.env.micros();
        while attempts <= u32::from(MAX_ATTEMPTS)
            && self.env.micros().wrapping_sub(started) < budget
        {
            outcome = transmit(&mut self.strategy, simplex, &self.data[..total]);
            if outcome == Code::Ack {
                return outcome;
            }
            attempts += 1;
            if outcome != Code::Fail {
                let jitter = self.env.random_below(COLLISION_MAX_DELAY);
                self.env.delay_micros(jitter);
            }
            let target = attempts.pow(3);
            let elapsed = self.env.micros().wrapping_sub(started);
            if target > elapsed {
                self.env.delay_micros(target - elapsed);
            }
        }
        outcome
    }

    /// Sends a synchronous acknowledge by hand. Routers, which never
    /// auto-acknowledge, use this for recipients whose route they know.
    pub fn send_acknowledge(&mut self) {
        self.strategy.send_response(Code::Ack);
    }

    // Configuration ----------------------------------------------------

    /// Request (and send back) synchronous acknowledgements.
    pub fn set_acknowledge(&mut self, state: bool) {
        self.acknowledge = state;
    }

    /// Treat the medium as shared between buses: bus ids go on the wire.
    pub fn set_shared_network(&mut self, state: bool) {
        self.shared = state;
    }

    /// Include the sender id (and bus id, in shared mode) in packets, which
    /// is what makes [`Bus::reply`] possible on the other side.
    pub fn include_sender_info(&mut self, state: bool) {
        self.sender_info = state;
    }

    /// Accept every packet regardless of addressing, for forwarding layers.
    pub fn set_router(&mut self, state: bool) {
        self.router = state;
    }

    /// Half-duplex or simplex operation.
    pub fn set_communication_mode(&mut self, mode: CommunicationMode) {
        self.mode = mode;
    }

    /// Automatically free slots on delivery or ceiling exhaustion. When
    /// disabled, delivered slots stay in the table for inspection and must
    /// be removed by the caller.
    pub fn set_packet_auto_deletion(&mut self, state: bool) {
        self.auto_delete = state;
    }

    /// Statically assigns the device id (watch out for collisions).
    pub fn set_id(&mut self, device_id: u8) {
        self.device_id = device_id;
    }

    /// Moves the endpoint to another logical bus. A non-localhost bus id
    /// switches the endpoint to shared mode, and back.
    pub fn set_bus_id(&mut self, bus_id: BusId) {
        self.bus_id = bus_id;
        self.shared = bus_id != LOCALHOST;
    }

    /// Current device id.
    #[must_use]
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Bus id of this endpoint.
    #[must_use]
    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }

    /// Random device identifier used by the addressing handshakes.
    #[must_use]
    pub fn rid(&self) -> u32 {
        self.rid
    }

    /// Metadata of the last packet received.
    #[must_use]
    pub fn last_packet_info(&self) -> &PacketInfo {
        &self.last_packet_info
    }

    /// Installs the receive callback.
    pub fn set_receiver(&mut self, receiver: Receiver) {
        self.receiver = receiver;
    }

    /// Installs the error sink.
    pub fn set_error_sink(&mut self, sink: ErrorSink) {
        self.error_sink = sink;
    }

    /// The underlying strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Mutable access to the underlying strategy.
    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    pub(crate) fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub(crate) fn is_router(&self) -> bool {
        self.router
    }

    /// Length of the packet currently in the receive buffer.
    pub(crate) fn received_len(&self) -> usize {
        self.data[1] as usize
    }

    pub(crate) fn received_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn report(&mut self, kind: ErrorKind, context: u8) {
        (self.error_sink)(kind, context);
    }
}

/// One transmission attempt of a composed frame.
fn transmit<S: Strategy>(strategy: &mut S, simplex: bool, frame: &[u8]) -> Code {
    if !simplex && !strategy.can_start() {
        return Code::Busy;
    }
    strategy.send_bytes(frame);
    let flags = HeaderFlags::from_byte(frame[2]);
    if frame[0] == BROADCAST || !flags.contains(HeaderFlags::ACK_REQUEST) || simplex {
        return Code::Ack;
    }
    strategy.receive_response()
}
