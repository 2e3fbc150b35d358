//! Dynamic device-id acquisition.
//!
//! Two protocols share the `ADDRESS` header bit and the opcode namespace:
//!
//! - **Master-slave**: the device asks a master (device id
//!   [`MASTER_ID`](lacewire_proto::MASTER_ID)) for an id, identified by a
//!   random 32-bit RID. The master grants with `Confirm`, recalls with
//!   `Negate`, and polls the bus with `List`.
//! - **Multi-master**: no master answers, so the device scans for an id
//!   nobody acknowledges, claims it, listens for competing claims, then
//!   re-probes its own id to detect a race.
//!
//! Both leave the device at [`NOT_ASSIGNED`] and report
//! [`ErrorKind::IdAcquisitionFail`] when their retry budgets run out; the
//! engine stays fully usable for reception and re-acquisition.

use lacewire_proto::{
    ids::is_assignable, payload_range, AddressingOp, HeaderFlags, MASTER_ID, MAX_LENGTH,
    NOT_ASSIGNED,
};

use crate::{bus::Bus, code::Code, env::Environment, error::ErrorKind, strategy::Strategy};

/// Random settle/listen window of the multi-master claim, in microseconds.
pub const ACQUIRE_ID_DELAY: u32 = 1_250;

/// Duration of one multi-master free-id scan, in microseconds.
pub const ID_SCAN_TIME: u32 = 75_000;

/// Claim iterations before multi-master acquisition gives up.
pub const MAX_ACQUIRE_ID_COLLISIONS: u8 = 10;

/// Minimum silence between two roll-call answers, in microseconds.
pub const ADDRESSING_TIMEOUT: u32 = 4_000_000;

/// Upper bound of the random start-up delay of [`Bus::begin`], in
/// microseconds.
pub const INITIAL_DELAY: u32 = 1_000;

/// Wall-clock budget of one id probe. A probe that stays unanswered this
/// long marks the id free.
const PROBE_BUDGET: u32 = ACQUIRE_ID_DELAY;

impl<S: Strategy, E: Environment> Bus<S, E> {
    /// Starts the endpoint: waits a random fraction of [`INITIAL_DELAY`] to
    /// de-synchronize simultaneous power-ups, then acquires an id if none is
    /// assigned yet.
    pub fn begin(&mut self) {
        let settle = self.env_mut().random_below(INITIAL_DELAY);
        self.env_mut().delay_micros(settle);
        if self.device_id() == NOT_ASSIGNED {
            self.acquire_id();
        }
    }

    /// Draws a fresh random RID for the addressing handshakes.
    pub fn generate_rid(&mut self) {
        self.rid = self.env_mut().random_u32();
    }

    /// Acquires a device id, preferring a master when one answers and
    /// falling back to the multi-master scan otherwise.
    pub fn acquire_id(&mut self) {
        self.generate_rid();
        if !self.acquire_id_master_slave() {
            self.acquire_id_multi_master();
        }
    }

    /// Requests an id from the bus master. Returns true when the master
    /// acknowledged the request; the grant itself arrives later as a
    /// `Confirm` packet handled by [`Bus::receive`].
    pub fn acquire_id_master_slave(&mut self) -> bool {
        let rid = self.rid.to_be_bytes();
        let request =
            [AddressingOp::Request.to_u8(), rid[0], rid[1], rid[2], rid[3]];
        let flags = self.addressing_flags();
        let bus_id = self.bus_id();
        self.send_packet_blocking(MASTER_ID, bus_id, &request, flags) == Code::Ack
    }

    /// Scan-and-claim acquisition for masterless buses.
    ///
    /// Each iteration: settle for a random window, scan ids from a random
    /// starting point until a probe goes unanswered, claim that id, listen
    /// for concurrent claims, then probe the claimed id once more. An
    /// acknowledged re-probe means another device claimed it in the same
    /// window; the iteration restarts. After
    /// [`MAX_ACQUIRE_ID_COLLISIONS`] iterations the device stays at
    /// [`NOT_ASSIGNED`] and `IdAcquisitionFail` is reported.
    pub fn acquire_id_multi_master(&mut self) {
        let flags = self.addressing_flags();
        let bus_id = self.bus_id();
        let probe = [AddressingOp::Acquire.to_u8()];

        for _ in 0..MAX_ACQUIRE_ID_COLLISIONS {
            let floor = ACQUIRE_ID_DELAY / 4;
            let settle = floor + self.env_mut().random_below(ACQUIRE_ID_DELAY - floor);
            self.env_mut().delay_micros(settle);
            self.set_id(NOT_ASSIGNED);

            let mut candidate = (self.env_mut().random_u32() % 256) as u8;
            let mut claimed = None;
            let started = self.env_mut().micros();
            while self.env_mut().micros().wrapping_sub(started) < ID_SCAN_TIME {
                candidate = candidate.wrapping_add(1);
                if !is_assignable(candidate) {
                    continue;
                }
                let outcome = self.send_packet_blocking_for(
                    candidate, bus_id, &probe, flags, PROBE_BUDGET,
                );
                if outcome == Code::Fail {
                    claimed = Some(candidate);
                    break;
                }
            }
            // An exhausted scan counts as a collision iteration.
            let Some(id) = claimed else { continue };

            self.set_id(id);
            let listen = floor + self.env_mut().random_below(ACQUIRE_ID_DELAY - floor);
            self.receive_for(listen);

            if self.send_packet_blocking_for(id, bus_id, &probe, flags, PROBE_BUDGET)
                != Code::Ack
            {
                tracing::debug!(id, "multi-master id claim finalized");
                return;
            }
            // Someone else answered for our id: concurrent claim, try again.
        }

        self.set_id(NOT_ASSIGNED);
        tracing::warn!("multi-master acquisition exhausted its collision budget");
        self.report(ErrorKind::IdAcquisitionFail, AddressingOp::Acquire.to_u8());
    }

    /// Voluntarily releases the current id back to the master. Returns true
    /// when the master acknowledged; the device is then unassigned.
    pub fn discard_device_id(&mut self) -> bool {
        let rid = self.rid.to_be_bytes();
        let release = [
            AddressingOp::Negate.to_u8(),
            rid[0],
            rid[1],
            rid[2],
            rid[3],
            self.device_id(),
        ];
        let flags = self.addressing_flags();
        let bus_id = self.bus_id();
        if self.send_packet_blocking(MASTER_ID, bus_id, &release, flags) == Code::Ack {
            self.set_id(NOT_ASSIGNED);
            true
        } else {
            false
        }
    }

    /// Consumes a received addressing packet. Returns false when the packet
    /// is not an addressing packet and should reach the receive callback.
    pub(crate) fn handle_addressing(&mut self) -> bool {
        let flags = self.last_packet_info().header;
        if !flags.contains(HeaderFlags::ADDRESS) {
            return false;
        }
        // Routers forward addressing traffic; masters run their own side of
        // the protocol above the engine.
        if self.is_router() || self.device_id() == MASTER_ID {
            return false;
        }

        let (payload, len) = self.copy_payload();
        let payload = &payload[..len];
        let Some(op) = payload.first().copied().and_then(AddressingOp::from_u8) else {
            return true;
        };
        let rid = self.rid.to_be_bytes();

        match op {
            AddressingOp::Confirm if len >= 6 && payload[1..5] == rid => {
                let granted = payload[5];
                self.adopt_granted_id(granted);
            }
            AddressingOp::Negate
                if len >= 6 && payload[1..5] == rid && payload[5] == self.device_id() =>
            {
                tracing::debug!(id = self.device_id(), "assignment negated by master");
                self.set_id(NOT_ASSIGNED);
                self.acquire_id();
            }
            AddressingOp::List if self.device_id() != NOT_ASSIGNED => {
                self.answer_roll_call();
            }
            // Acquire probes are answered by the acknowledgement layer;
            // Request/Refresh/unmatched packets are for other devices.
            _ => {}
        }
        true
    }

    /// Adopts a granted id and confirms the adoption back to the master,
    /// reverting to unassigned when the confirmation goes unacknowledged.
    fn adopt_granted_id(&mut self, granted: u8) {
        self.set_id(granted);
        let rid = self.rid.to_be_bytes();
        let confirm =
            [AddressingOp::Confirm.to_u8(), rid[0], rid[1], rid[2], rid[3], granted];
        let flags = self.addressing_flags();
        let bus_id = self.bus_id();
        if self.send_packet_blocking(MASTER_ID, bus_id, &confirm, flags) == Code::Ack {
            tracing::debug!(id = granted, "device id adopted");
        } else {
            self.set_id(NOT_ASSIGNED);
            self.report(ErrorKind::IdAcquisitionFail, AddressingOp::Confirm.to_u8());
        }
    }

    /// Queues a `Refresh` answer to a master roll-call, at most once per
    /// [`ADDRESSING_TIMEOUT`] (plus slack for master-side processing).
    fn answer_roll_call(&mut self) {
        let now = self.env_mut().micros();
        if let Some(last) = self.last_refresh {
            if now.wrapping_sub(last) <= ADDRESSING_TIMEOUT + ADDRESSING_TIMEOUT / 8 {
                return;
            }
        }
        self.last_refresh = Some(now);
        let rid = self.rid.to_be_bytes();
        let answer = [
            AddressingOp::Refresh.to_u8(),
            rid[0],
            rid[1],
            rid[2],
            rid[3],
            self.device_id(),
        ];
        let flags = self.addressing_flags();
        let bus_id = self.bus_id();
        let _ = self.dispatch(MASTER_ID, bus_id, &answer, 0, Some(flags));
    }

    fn addressing_flags(&self) -> HeaderFlags {
        self.header_flags() | HeaderFlags::ADDRESS | HeaderFlags::ACK_REQUEST
    }

    /// Copies the payload of the packet in the receive buffer to the stack;
    /// addressing replies reuse that buffer for composition.
    fn copy_payload(&self) -> ([u8; MAX_LENGTH], usize) {
        let flags = self.last_packet_info().header;
        let range = payload_range(flags, self.received_len());
        let mut payload = [0u8; MAX_LENGTH];
        let len = range.len();
        payload[..len].copy_from_slice(&self.received_bytes()[range]);
        (payload, len)
    }
}
