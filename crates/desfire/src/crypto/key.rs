//! Cipher keys and the card's CBC chaining mode
//!
//! A [`CipherKey`] bundles the key material with the running IV and the two
//! CMAC subkeys. The card chains blocks in a way that differs from textbook
//! CBC when receiving: the block operation runs first and the XOR with the
//! previous IV second, with the next IV being the original input block. The
//! cascade used for the triple DES variants is EDE in both directions.

use std::fmt;

use aes::Aes128;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use des::{Des, TdesEde2, TdesEde3};
use nexum_desfire_core::opcode;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// Largest key the card stores (3K3DES)
pub const MAX_KEY_SIZE: usize = 24;
/// Largest cipher block (AES)
pub const MAX_BLOCK_SIZE: usize = 16;

/// Key algorithm and strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum KeyVariant {
    /// Single DES, 8 byte key
    #[display("DES")]
    SimpleDes,
    /// Two key triple DES, 16 byte key
    #[display("2K3DES")]
    TwoKeyTripleDes,
    /// Three key triple DES, 24 byte key
    #[display("3K3DES")]
    ThreeKeyTripleDes,
    /// AES-128, 16 byte key
    #[display("AES")]
    Aes128,
}

impl KeyVariant {
    /// Length of the key material the variant takes
    pub const fn key_size(self) -> usize {
        match self {
            Self::SimpleDes => 8,
            Self::TwoKeyTripleDes | Self::Aes128 => 16,
            Self::ThreeKeyTripleDes => 24,
        }
    }

    /// Cipher block size
    pub const fn block_size(self) -> usize {
        match self {
            Self::Aes128 => 16,
            _ => 8,
        }
    }

    /// Length of each authentication random
    ///
    /// Equal to the block size except for three key triple DES, whose
    /// session key draws on sixteen bytes of each random.
    pub const fn random_size(self) -> usize {
        match self {
            Self::ThreeKeyTripleDes | Self::Aes128 => 16,
            _ => 8,
        }
    }

    /// Key type bits OR-ed into the slot or key count on the wire
    pub const fn key_type_code(self) -> u8 {
        match self {
            Self::SimpleDes | Self::TwoKeyTripleDes => 0x00,
            Self::ThreeKeyTripleDes => 0x40,
            Self::Aes128 => 0x80,
        }
    }

    /// Whether the variant belongs to the DES family
    pub const fn is_des(self) -> bool {
        !matches!(self, Self::Aes128)
    }

    /// Authentication command used for keys of this variant
    pub const fn authenticate_opcode(self) -> u8 {
        match self {
            Self::Aes128 => opcode::AUTHENTICATE_AES,
            _ => opcode::AUTHENTICATE_ISO,
        }
    }
}

/// Which side of the link a CBC pass runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbcDirection {
    /// XOR with the IV, then the block operation; the IV becomes the output
    Send,
    /// Block operation, then XOR with the IV; the IV becomes the input
    Receive,
}

/// Which block operation a CBC pass applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOp {
    /// Forward cipher
    Encipher,
    /// Inverse cipher
    Decipher,
}

#[derive(Clone)]
enum Primitive {
    Des(Des),
    TdesEde2(TdesEde2),
    TdesEde3(TdesEde3),
    Aes(Aes128),
}

impl Primitive {
    fn new(variant: KeyVariant, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidKeySize {
            variant,
            expected: variant.key_size(),
            actual: key.len(),
        };
        Ok(match variant {
            KeyVariant::SimpleDes => Self::Des(Des::new_from_slice(key).map_err(invalid)?),
            KeyVariant::TwoKeyTripleDes => {
                Self::TdesEde2(TdesEde2::new_from_slice(key).map_err(invalid)?)
            }
            KeyVariant::ThreeKeyTripleDes => {
                Self::TdesEde3(TdesEde3::new_from_slice(key).map_err(invalid)?)
            }
            KeyVariant::Aes128 => Self::Aes(Aes128::new_from_slice(key).map_err(invalid)?),
        })
    }

    /// `block` must be exactly one cipher block long
    fn apply(&self, op: CipherOp, block: &mut [u8]) {
        match self {
            Self::Des(c) => run(c, op, block),
            Self::TdesEde2(c) => run(c, op, block),
            Self::TdesEde3(c) => run(c, op, block),
            Self::Aes(c) => run(c, op, block),
        }
    }
}

fn run<C: BlockEncrypt + BlockDecrypt>(cipher: &C, op: CipherOp, block: &mut [u8]) {
    let block = GenericArray::from_mut_slice(block);
    match op {
        CipherOp::Encipher => cipher.encrypt_block(block),
        CipherOp::Decipher => cipher.decrypt_block(block),
    }
}

/// Key material with its chaining state
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    /// Stored key bytes; single DES keys are kept as K1 || K1
    key: [u8; MAX_KEY_SIZE],
    key_len: usize,
    #[zeroize(skip)]
    variant: KeyVariant,
    version: u8,
    iv: [u8; MAX_BLOCK_SIZE],
    pub(crate) cmac_subkey1: [u8; MAX_BLOCK_SIZE],
    pub(crate) cmac_subkey2: [u8; MAX_BLOCK_SIZE],
    #[zeroize(skip)]
    primitive: Primitive,
}

impl CipherKey {
    /// Create a key, reset its IV and derive its CMAC subkeys
    ///
    /// For the DES family the version is stored in the parity bits of the
    /// first eight key bytes (most significant bit in byte 0) and the parity
    /// bits of the remaining bytes are cleared. The cipher ignores these bits.
    pub fn new(variant: KeyVariant, key: &[u8], version: u8) -> Result<Self> {
        let (stored, key_len) = Self::prepare(variant, key, version)?;
        let primitive = Primitive::new(variant, &stored[..variant.key_size()])?;
        let mut this = Self {
            key: stored,
            key_len,
            variant,
            version,
            iv: [0; MAX_BLOCK_SIZE],
            cmac_subkey1: [0; MAX_BLOCK_SIZE],
            cmac_subkey2: [0; MAX_BLOCK_SIZE],
            primitive,
        };
        this.derive_cmac_subkeys()?;
        Ok(this)
    }

    /// An all-zero key, the factory default for every slot
    pub fn zeroed(variant: KeyVariant) -> Result<Self> {
        Self::new(variant, &[0; MAX_KEY_SIZE][..variant.key_size()], 0)
    }

    /// Replace the key material, resetting the IV and the CMAC subkeys
    pub fn set_key(&mut self, variant: KeyVariant, key: &[u8], version: u8) -> Result<()> {
        *self = Self::new(variant, key, version)?;
        Ok(())
    }

    fn prepare(variant: KeyVariant, key: &[u8], version: u8) -> Result<([u8; MAX_KEY_SIZE], usize)> {
        if key.len() != variant.key_size() {
            return Err(Error::InvalidKeySize {
                variant,
                expected: variant.key_size(),
                actual: key.len(),
            });
        }

        let mut stored = [0u8; MAX_KEY_SIZE];
        stored[..key.len()].copy_from_slice(key);

        if variant.is_des() {
            for (i, byte) in stored[..key.len()].iter_mut().enumerate() {
                *byte &= 0xFE;
                if i < 8 {
                    *byte |= (version >> (7 - i)) & 0x01;
                }
            }
        }

        let key_len = match variant {
            KeyVariant::SimpleDes => {
                stored.copy_within(0..8, 8);
                16
            }
            _ => key.len(),
        };
        Ok((stored, key_len))
    }

    /// Key variant
    pub const fn variant(&self) -> KeyVariant {
        self.variant
    }

    /// Key version tag
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Cipher block size
    pub const fn block_size(&self) -> usize {
        self.variant.block_size()
    }

    /// Stored key bytes, at least 16 long (single DES keys are doubled)
    pub fn key_bytes(&self) -> &[u8] {
        &self.key[..self.key_len]
    }

    /// Current IV
    pub fn iv(&self) -> &[u8] {
        &self.iv[..self.block_size()]
    }

    /// Reset the IV to zero
    pub fn clear_iv(&mut self) {
        self.iv.fill(0);
    }

    /// Round `len` up to a whole number of blocks
    pub const fn padded_len(&self, len: usize) -> usize {
        len.div_ceil(self.block_size()) * self.block_size()
    }

    /// Encipher one block in place
    pub fn encrypt_block(&self, block: &mut [u8]) -> Result<()> {
        self.check_block(block)?;
        self.primitive.apply(CipherOp::Encipher, block);
        Ok(())
    }

    /// Decipher one block in place
    pub fn decrypt_block(&self, block: &mut [u8]) -> Result<()> {
        self.check_block(block)?;
        self.primitive.apply(CipherOp::Decipher, block);
        Ok(())
    }

    const fn check_block(&self, block: &[u8]) -> Result<()> {
        if block.len() != self.block_size() {
            return Err(Error::InvalidBlockSize {
                block_size: self.block_size(),
                actual: block.len(),
            });
        }
        Ok(())
    }

    /// Run the card's CBC chaining over `data` in place, updating the IV
    ///
    /// `data` must be a positive multiple of the block size.
    pub fn cbc_transform(
        &mut self,
        direction: CbcDirection,
        op: CipherOp,
        data: &mut [u8],
    ) -> Result<()> {
        let bs = self.block_size();
        if data.is_empty() || data.len() % bs != 0 {
            return Err(Error::InvalidBlockSize {
                block_size: bs,
                actual: data.len(),
            });
        }

        for block in data.chunks_exact_mut(bs) {
            match direction {
                CbcDirection::Send => {
                    xor_in_place(block, &self.iv[..bs]);
                    self.primitive.apply(op, block);
                    self.iv[..bs].copy_from_slice(block);
                }
                CbcDirection::Receive => {
                    let mut input = [0u8; MAX_BLOCK_SIZE];
                    input[..bs].copy_from_slice(block);
                    self.primitive.apply(op, block);
                    xor_in_place(block, &self.iv[..bs]);
                    self.iv[..bs].copy_from_slice(&input[..bs]);
                    input.zeroize();
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("variant", &self.variant)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// XOR `other` into `block`
pub(crate) fn xor_in_place(block: &mut [u8], other: &[u8]) {
    for (a, b) in block.iter_mut().zip(other) {
        *a ^= *b;
    }
}

/// Rotate left by one byte
pub(crate) fn rotate_left(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out.rotate_left(1);
    }
    out
}

/// Rotate right by one byte
#[cfg(test)]
pub(crate) fn rotate_right(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out.rotate_right(1);
    }
    out
}
