//! 128-bit per-connection flag set.
//!
//! Stored as four `u32` words so it maps directly onto the 16-byte ack bitmap
//! of the header frame: bit `j` of word `w` belongs to connection `32 * w + j`,
//! words are serialized little endian.

use crate::consts::MAX_CONNECTIONS;

const WORDS: usize = MAX_CONNECTIONS / 32;

/// One bit per connection slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ConnectionBits {
    words: [u32; WORDS],
}

impl ConnectionBits {
    /// Size of the serialized form in bytes.
    pub const BYTES: usize = WORDS * 4;

    /// All bits clear.
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    fn locate(slot: u8) -> Option<(usize, u32)> {
        let slot = usize::from(slot);
        if slot >= MAX_CONNECTIONS {
            return None;
        }
        Some((slot / 32, 1 << (slot % 32)))
    }

    /// Value of the bit for `slot`; `false` for slots outside the set.
    pub fn get(&self, slot: u8) -> bool {
        match Self::locate(slot) {
            Some((w, mask)) => self.words[w] & mask != 0,
            None => false,
        }
    }

    /// Sets the bit for `slot` to `value`. Slots outside the set are ignored.
    pub fn set(&mut self, slot: u8, value: bool) {
        if let Some((w, mask)) = Self::locate(slot) {
            if value {
                self.words[w] |= mask;
            } else {
                self.words[w] &= !mask;
            }
        }
    }

    /// Inverts the bit for `slot`.
    pub fn toggle(&mut self, slot: u8) {
        if let Some((w, mask)) = Self::locate(slot) {
            self.words[w] ^= mask;
        }
    }

    /// Lowest slot below `limit` whose bit is clear.
    pub fn first_clear(&self, limit: u8) -> Option<u8> {
        (0..limit.min(MAX_CONNECTIONS as u8)).find(|&slot| !self.get(slot))
    }

    /// Number of set bits.
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Iterates the slots whose bit is set, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_CONNECTIONS as u8).filter(move |&slot| self.get(slot))
    }

    /// `true` when `self` and `other` hold the same value on every bit set in `mask`.
    pub fn agrees_on(&self, other: &Self, mask: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .zip(mask.words.iter())
            .all(|((a, b), m)| (a ^ b) & m == 0)
    }

    /// Sets every bit in `mask` to `value`, leaving the others untouched.
    pub fn assign_masked(&mut self, mask: &Self, value: bool) {
        for (w, m) in self.words.iter_mut().zip(mask.words.iter()) {
            if value {
                *w |= m;
            } else {
                *w &= !m;
            }
        }
    }

    /// Serializes the set as four little-endian words.
    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        for (chunk, w) in out.chunks_exact_mut(4).zip(self.words.iter()) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Parses the wire form produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8; Self::BYTES]) -> Self {
        let mut words = [0u32; WORDS];
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { words }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_toggle() {
        let mut bits = ConnectionBits::new();
        bits.set(0, true);
        bits.set(127, true);
        bits.toggle(40);
        assert!(bits.get(0) && bits.get(40) && bits.get(127));
        assert!(!bits.get(1));
        bits.toggle(40);
        assert!(!bits.get(40));
        assert_eq!(bits.count(), 2);
    }

    #[test]
    fn test_out_of_range_slots_are_ignored() {
        let mut bits = ConnectionBits::new();
        bits.set(200, true);
        bits.toggle(128);
        assert_eq!(bits, ConnectionBits::new());
        assert!(!bits.get(255));
    }

    #[test]
    fn test_first_clear_respects_limit() {
        let mut bits = ConnectionBits::new();
        for slot in 0..4 {
            bits.set(slot, true);
        }
        assert_eq!(bits.first_clear(8), Some(4));
        assert_eq!(bits.first_clear(4), None);
    }

    #[test]
    fn test_wire_layout_is_little_endian_words() {
        let mut bits = ConnectionBits::new();
        bits.set(0, true);
        bits.set(9, true);
        bits.set(32, true);
        bits.set(127, true);
        let bytes = bits.to_bytes();
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(bytes[15], 0x80);
        assert_eq!(ConnectionBits::from_bytes(&bytes), bits);
    }

    #[test]
    fn test_agrees_on_only_checks_masked_bits() {
        let mut a = ConnectionBits::new();
        let mut b = ConnectionBits::new();
        let mut mask = ConnectionBits::new();
        mask.set(3, true);
        a.set(5, true);
        assert!(a.agrees_on(&b, &mask));
        b.set(3, true);
        assert!(!a.agrees_on(&b, &mask));
        a.assign_masked(&mask, true);
        assert!(a.agrees_on(&b, &mask));
        assert!(a.get(5));
    }

    #[test]
    fn test_iter_is_ordered() {
        let mut bits = ConnectionBits::new();
        for slot in [90, 7, 31, 32] {
            bits.set(slot, true);
        }
        let mut it = bits.iter();
        assert_eq!(it.next(), Some(7));
        assert_eq!(it.next(), Some(31));
        assert_eq!(it.next(), Some(32));
        assert_eq!(it.next(), Some(90));
        assert_eq!(it.next(), None);
    }
}
