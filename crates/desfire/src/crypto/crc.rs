//! CRC32 as the card computes it
//!
//! The card uses the IEEE polynomial with an all-ones preset but no final
//! inversion (JAMCRC), serialised little-endian.

use crc32fast::Hasher;

/// CRC32 of the concatenation of `parts`
pub fn crc32(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    !hasher.finalize()
}

/// CRC32 of the concatenation of `parts`, in wire byte order
pub fn crc32_le(parts: &[&[u8]]) -> [u8; 4] {
    crc32(parts).to_le_bytes()
}
