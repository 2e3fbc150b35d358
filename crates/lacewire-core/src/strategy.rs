//! Transport abstraction ("strategy").
//!
//! A strategy is the bit-level encoding of bytes onto a physical medium:
//! timing-based bit-banging on a wire, a UART, oversampled radio, anything
//! half-duplex. The engine consumes only the five operations below and knows
//! nothing about the encoding.
//!
//! Every waiting operation is bounded by the strategy's own timing; none may
//! block indefinitely. Channel sensing is an approximation, never a
//! guarantee: actual collisions are detected after the fact through CRC
//! failure and handled with back-off.

use crate::code::Code;

/// Byte-level access to the shared medium.
pub trait Strategy {
    /// Senses the channel; returns true when a transmission can start now.
    fn can_start(&mut self) -> bool;

    /// Puts one byte on the medium.
    fn send_byte(&mut self, byte: u8);

    /// Waits, bounded, for one byte from the medium. `None` when nothing
    /// arrived within the strategy's receive window.
    fn receive_byte(&mut self) -> Option<u8>;

    /// Sends a synchronous response code (ACK or NAK) to the transmitter of
    /// the frame just received.
    fn send_response(&mut self, response: Code);

    /// Waits, bounded by one byte-transmission-and-acknowledge window, for
    /// the synchronous response to a frame just sent. [`Code::Fail`] when
    /// nothing arrived.
    fn receive_response(&mut self) -> Code;

    /// Puts a whole frame on the medium, byte by byte.
    fn send_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_byte(byte);
        }
    }
}
