//! Fixed-capacity outbound slot table.
//!
//! The send queue is an arena of pre-allocated slots indexed by handle,
//! never a growable collection: the memory budget is fixed at compile time,
//! matching constrained targets. Slots are created by `dispatch`, mutated
//! only by the `update` tick, and returned to `Free` on success, explicit
//! removal, or attempt-ceiling exhaustion.

use lacewire_proto::MAX_LENGTH;

/// Number of outbound slots. A full table rejects dispatches with
/// `PacketsBufferFull` until a slot frees up.
pub const MAX_SLOTS: usize = 5;

/// Index of a slot in the table, returned by `dispatch` and accepted by
/// `remove`.
pub type Handle = usize;

/// Slot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SlotState {
    /// Unoccupied, available for dispatch.
    #[default]
    Free,
    /// Composed and scheduled; serviced by the next eligible update tick.
    ToBeSent,
    /// Delivered but retained because auto-deletion is disabled; the caller
    /// inspects and removes it.
    Delivered,
}

/// One outbound packet and its retry bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub state: SlotState,
    /// Composed packet bytes; `content[0]` is the recipient id.
    pub content: [u8; MAX_LENGTH],
    pub length: u8,
    /// Registration or last-reset time, in environment microseconds.
    pub registration: u32,
    /// Repeat interval in microseconds; 0 means fire-once.
    pub timing: u32,
    pub attempts: u8,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: SlotState::Free,
            content: [0; MAX_LENGTH],
            length: 0,
            registration: 0,
            timing: 0,
            attempts: 0,
        }
    }
}

/// The slot table.
#[derive(Debug, Default)]
pub(crate) struct SendQueue {
    pub slots: [Slot; MAX_SLOTS],
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// First free slot, if any.
    pub fn first_free(&self) -> Option<Handle> {
        self.slots.iter().position(|slot| slot.state == SlotState::Free)
    }

    /// Returns a slot to `Free` immediately, regardless of in-flight state.
    pub fn remove(&mut self, handle: Handle) {
        self.slots[handle] = Slot::default();
    }

    /// Frees every occupied slot, or only those addressed to `recipient`.
    pub fn remove_all(&mut self, recipient: Option<u8>) {
        for handle in 0..MAX_SLOTS {
            let slot = &self.slots[handle];
            if slot.state == SlotState::Free {
                continue;
            }
            if recipient.is_none() || recipient == Some(slot.content[0]) {
                self.remove(handle);
            }
        }
    }

    /// Number of occupied slots, optionally filtered by recipient id.
    pub fn count(&self, recipient: Option<u8>) -> u8 {
        self.slots
            .iter()
            .filter(|slot| slot.state != SlotState::Free)
            .filter(|slot| recipient.is_none() || recipient == Some(slot.content[0]))
            .count() as u8
    }
}
