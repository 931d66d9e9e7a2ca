//! Key change
//!
//! The new key travels enciphered with the session key. When a key other than
//! the authenticated one is changed, the card also needs proof of the current
//! value of that key, so the new key is XOR-ed with it and a second CRC over
//! the plain new key lets the card check the result.

use nexum_desfire_core::{CardTransport, Command, opcode};
use rand::RngCore;
use tracing::{debug, instrument, trace};
use zeroize::Zeroizing;

use crate::{
    Desfire, Error, Result,
    crypto::{CbcDirection, CipherKey, CipherOp, KeyVariant, crc32_le, key::xor_in_place},
    messenger::Protection,
};

/// Cryptogram lengths tried in order before rounding up to the block size
const CRYPTOGRAM_LENGTHS: [usize; 3] = [24, 32, 40];

/// Plain cryptogram for a key change, before padding
///
/// `slot_byte` is the slot as sent on the wire, including key type bits at
/// card level. `current_key` is given when the target is not the
/// authenticated slot.
pub fn key_change_cryptogram(
    slot_byte: u8,
    new_key: &CipherKey,
    current_key: Option<&CipherKey>,
) -> Zeroizing<Vec<u8>> {
    let mut cryptogram = Zeroizing::new(Vec::with_capacity(CRYPTOGRAM_LENGTHS[2]));
    cryptogram.extend_from_slice(new_key.key_bytes());

    if let Some(current) = current_key {
        xor_in_place(&mut cryptogram, current.key_bytes());
    }

    if new_key.variant() == KeyVariant::Aes128 {
        cryptogram.push(new_key.version());
    }

    let crc = crc32_le(&[&[opcode::CHANGE_KEY, slot_byte], &cryptogram]);
    cryptogram.extend_from_slice(&crc);

    if current_key.is_some() {
        cryptogram.extend_from_slice(&crc32_le(&[new_key.key_bytes()]));
    }
    cryptogram
}

/// Length the cryptogram is padded to before enciphering
pub const fn padded_cryptogram_len(len: usize, block_size: usize) -> usize {
    let mut padded = CRYPTOGRAM_LENGTHS[0];
    if len > CRYPTOGRAM_LENGTHS[0] {
        padded = CRYPTOGRAM_LENGTHS[1];
    }
    if len > CRYPTOGRAM_LENGTHS[1] {
        padded = CRYPTOGRAM_LENGTHS[2];
    }
    padded.div_ceil(block_size) * block_size
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// Change the key in `slot` of the selected application
    ///
    /// `current_key` is required when `slot` is not the authenticated slot.
    /// Changing the authenticated key ends the session; authenticate again
    /// with the new key afterwards.
    #[instrument(level = "debug", skip(self, new_key, current_key), fields(variant = %new_key.variant()))]
    pub fn change_key(
        &mut self,
        slot: u8,
        new_key: &CipherKey,
        current_key: Option<&CipherKey>,
    ) -> Result<()> {
        let session = self.messenger.session();
        let authenticated_slot = session.authenticated_slot().ok_or(Error::NotAuthenticated)?;
        let same_slot = slot == authenticated_slot;

        let current_key = if same_slot {
            None
        } else {
            Some(current_key.ok_or(Error::MissingCurrentKey(slot))?)
        };

        let mut slot_byte = slot;
        if session.selected_application().is_picc() {
            slot_byte |= new_key.variant().key_type_code();
        }

        let mut cryptogram = key_change_cryptogram(slot_byte, new_key, current_key);
        let key = self.messenger.session_mut().key_mut().ok_or(Error::NotAuthenticated)?;
        let padded = padded_cryptogram_len(cryptogram.len(), key.block_size());
        cryptogram.resize(padded, 0);

        trace!(iv = %hex::encode(key.iv()), len = padded, "Enciphering key cryptogram");
        key.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut cryptogram)?;

        let mut params = Vec::with_capacity(1 + padded);
        params.push(slot_byte);
        params.extend_from_slice(&cryptogram);

        // the card answers a change of its own session key without a MAC
        if same_slot {
            self.messenger.session_mut().invalidate();
        }

        self.messenger.exchange_single(
            Command::new(opcode::CHANGE_KEY).with_params(params),
            Protection::receive_mac(),
            0,
        )?;
        debug!(slot, same_slot, "Key changed");
        Ok(())
    }
}
