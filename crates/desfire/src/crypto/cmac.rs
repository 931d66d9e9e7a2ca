//! CMAC over the card's CBC chaining
//!
//! With a zero IV this is plain CMAC (NIST SP 800-38B). Inside a session the
//! IV is whatever the previous exchange left behind, so the MAC chains across
//! commands. The full tag is the IV after the pass; only its first eight
//! bytes travel on the wire.

use crate::{
    Error, Result,
    crypto::key::{CbcDirection, CipherKey, CipherOp, MAX_BLOCK_SIZE, xor_in_place},
};

/// Length of the MAC appended to responses
pub const TRUNCATED_MAC_LEN: usize = 8;

/// A full CMAC tag, one block long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmac {
    bytes: [u8; MAX_BLOCK_SIZE],
    len: usize,
}

impl Cmac {
    /// The whole tag
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The first eight bytes, as carried by the card
    pub fn truncated(&self) -> [u8; TRUNCATED_MAC_LEN] {
        let mut out = [0u8; TRUNCATED_MAC_LEN];
        out.copy_from_slice(&self.bytes[..TRUNCATED_MAC_LEN]);
        out
    }
}

/// Shift a block left by one bit, folding `r` in if the top bit fell out
fn shift_subkey(block: &mut [u8], r: u8) {
    let mut carry = 0;
    for byte in block.iter_mut().rev() {
        let out = *byte >> 7;
        *byte = (*byte << 1) | carry;
        carry = out;
    }
    if carry == 1 {
        if let Some(last) = block.last_mut() {
            *last ^= r;
        }
    }
}

impl CipherKey {
    /// Derive both CMAC subkeys from the current key material
    ///
    /// Leaves the IV at zero.
    pub(crate) fn derive_cmac_subkeys(&mut self) -> Result<()> {
        let bs = self.block_size();
        let r = if bs == 8 { 0x1B } else { 0x87 };

        self.clear_iv();
        let mut l = [0u8; MAX_BLOCK_SIZE];
        self.cbc_transform(CbcDirection::Receive, CipherOp::Encipher, &mut l[..bs])?;
        self.clear_iv();

        shift_subkey(&mut l[..bs], r);
        self.cmac_subkey1 = l;
        shift_subkey(&mut l[..bs], r);
        self.cmac_subkey2 = l;
        Ok(())
    }

    /// First CMAC subkey
    pub fn cmac_subkey1(&self) -> &[u8] {
        &self.cmac_subkey1[..self.block_size()]
    }

    /// Second CMAC subkey
    pub fn cmac_subkey2(&self) -> &[u8] {
        &self.cmac_subkey2[..self.block_size()]
    }

    /// CMAC `message` starting from the current IV, which becomes the tag
    pub fn calculate_cmac(&mut self, message: &[u8]) -> Result<Cmac> {
        let bs = self.block_size();
        let aligned = !message.is_empty() && message.len() % bs == 0;

        let mut buf = message.to_vec();
        if !aligned {
            buf.push(0x80);
            buf.resize(self.padded_len(buf.len()), 0);
        }

        let tail = buf.len() - bs;
        let subkey = if aligned {
            self.cmac_subkey1
        } else {
            self.cmac_subkey2
        };
        xor_in_place(&mut buf[tail..], &subkey[..bs]);

        self.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut buf)?;

        let mut bytes = [0u8; MAX_BLOCK_SIZE];
        bytes[..bs].copy_from_slice(self.iv());
        Ok(Cmac { bytes, len: bs })
    }
}

/// Fixed-capacity buffer collecting the bytes a response MAC covers
#[derive(Debug, Clone)]
pub struct CmacBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl CmacBuffer {
    /// Create an empty buffer holding at most `capacity` bytes, padding included
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Drop everything collected so far
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append bytes, failing if the capacity would be exceeded
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let required = self.data.len() + bytes.len();
        if required > self.capacity {
            return Err(Error::BufferFull {
                capacity: self.capacity,
                required,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Collected bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of collected bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// MAC the collected bytes with `key`
    ///
    /// Fails with [`Error::BufferFull`] when the padded message would not fit.
    pub fn compute(&self, key: &mut CipherKey) -> Result<Cmac> {
        let len = self.data.len();
        let required = if len != 0 && len % key.block_size() == 0 {
            len
        } else {
            key.padded_len(len + 1)
        };
        if required > self.capacity {
            return Err(Error::BufferFull {
                capacity: self.capacity,
                required,
            });
        }
        key.calculate_cmac(&self.data)
    }
}
