//! Rolling 8-bit CRC.
//!
//! Table-less, bit-reflected, polynomial feedback `0x8C`, initial value 0.
//! The CRC is computed over every transmitted byte except the trailing CRC
//! byte itself; a receiver that rolls the CRC byte in as well ends at zero
//! for a correct frame. The polynomial/initial-value pair is the
//! compatibility contract between implementations.

/// Polynomial feedback value (bit-reflected 0x31).
pub const POLYNOMIAL: u8 = 0x8C;

/// Rolls one byte into a running CRC.
#[must_use]
pub const fn roll(byte: u8, mut crc: u8) -> u8 {
    let mut input = byte;
    let mut i = 0;
    while i < 8 {
        let mix = (crc ^ input) & 0x01;
        crc >>= 1;
        if mix != 0 {
            crc ^= POLYNOMIAL;
        }
        input >>= 1;
        i += 1;
    }
    crc
}

/// Computes the CRC of a whole buffer, starting from zero.
#[must_use]
pub fn compute(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &byte| roll(byte, crc))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_buffer_is_zero() {
        assert_eq!(compute(&[]), 0);
    }

    #[test]
    fn known_vectors() {
        // CRC-8/MAXIM check value.
        assert_eq!(compute(b"123456789"), 0xA1);
    }

    #[test]
    fn incremental_matches_whole_buffer() {
        let data = [0x0C, 0x06, 0x02, 0x0B, 0x40];
        let rolled = data.iter().fold(0, |crc, &b| roll(b, crc));
        assert_eq!(rolled, compute(&data));
    }

    #[test]
    fn appending_own_crc_yields_zero() {
        let mut frame = b"lacewire".to_vec();
        frame.push(compute(&frame));
        assert_eq!(compute(&frame), 0);
    }

    proptest! {
        #[test]
        fn single_bit_flip_changes_crc(data in prop::collection::vec(any::<u8>(), 1..48),
                                       bit in 0usize..8, index in any::<prop::sample::Index>()) {
            let original = compute(&data);
            let mut flipped = data.clone();
            let at = index.index(flipped.len());
            flipped[at] ^= 1 << bit;
            prop_assert_ne!(compute(&flipped), original);
        }

        #[test]
        fn crc_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..48)) {
            prop_assert_eq!(compute(&data), compute(&data));
        }
    }
}
