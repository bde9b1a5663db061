//! Sync word derivation from a device unique ID.

use crate::consts::DISCOVERY_SYNC_WORD;

pub(crate) fn crc_ccitt_update(crc: u16, data: &u8) -> u16 {
    let mut d = *data as u16;
    d ^= lo8(crc);
    d ^= d << 4;
    d = (d as u8) as u16; // Ensure d is treated as a u8 for the next operations

    ((d << 8) | hi8(crc)) ^ (((d >> 4) as u8) as u16) ^ (d << 3)
}

pub(crate) fn lo8(x: u16) -> u16 {
    x & 0xff
}

pub(crate) fn hi8(x: u16) -> u16 {
    x >> 8
}

fn crc_ccitt(seed: u16, bytes: &[u8]) -> u16 {
    bytes.iter().fold(seed, crc_ccitt_update)
}

/// Derives the 32-bit sync word of a master from its unique device ID.
///
/// The ID is folded with two CRC-CCITT passes (forward and reversed) into
/// the high and low half of the word. Bytes `0x00` and `0xff` are avoided
/// because long runs of identical bits are poor sync patterns, and the
/// result never equals [`DISCOVERY_SYNC_WORD`].
///
/// # Example
/// ```rust
/// let word = geode::derive_sync_word(&[0x20, 0x39, 0x4e, 0x11, 0x05, 0x50]);
/// assert_ne!(word, geode::consts::DISCOVERY_SYNC_WORD);
/// ```
pub fn derive_sync_word(uid: &[u8]) -> u32 {
    let hi = crc_ccitt(0xffff, uid);
    let mut lo: u16 = 0x1d0f;
    for b in uid.iter().rev() {
        lo = crc_ccitt_update(lo, b);
    }
    let mut bytes = ((u32::from(hi) << 16) | u32::from(lo)).to_be_bytes();
    for b in bytes.iter_mut() {
        if *b == 0x00 || *b == 0xff {
            *b ^= 0x5a;
        }
    }
    let word = u32::from_be_bytes(bytes);
    if word == DISCOVERY_SYNC_WORD {
        word ^ 0x0101_0101
    } else {
        word
    }
}
