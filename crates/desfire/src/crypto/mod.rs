//! Cryptographic building blocks for the secure channel
//!
//! Keys with the card's CBC chaining, CMAC and the CRC32 variant used inside
//! enciphered frames.

pub mod cmac;
pub mod crc;
pub mod key;

pub use cmac::{Cmac, CmacBuffer, TRUNCATED_MAC_LEN};
pub use crc::{crc32, crc32_le};
pub use key::{CbcDirection, CipherKey, CipherOp, KeyVariant, MAX_BLOCK_SIZE, MAX_KEY_SIZE};
