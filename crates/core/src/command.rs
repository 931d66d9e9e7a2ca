//! Native command frames
//!
//! A native command is laid out as `[opcode][header..][params..]`. The header is
//! always sent in clear, while the parameter block is the part a secure session
//! may extend with a CRC, pad and encipher.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Maximum number of bytes in a single frame exchanged with the card
pub const MAX_FRAME_SIZE: usize = 60;

/// Native command codes
pub mod opcode {
    /// ISO authentication (DES, 2K3DES and 3K3DES keys)
    pub const AUTHENTICATE_ISO: u8 = 0x1A;
    /// AES authentication
    pub const AUTHENTICATE_AES: u8 = 0xAA;
    /// Continuation of a multi-frame exchange
    pub const ADDITIONAL_FRAME: u8 = 0xAF;

    /// Change a key
    pub const CHANGE_KEY: u8 = 0xC4;
    /// Read the version of a key
    pub const GET_KEY_VERSION: u8 = 0x64;
    /// Read the key settings of the selected application
    pub const GET_KEY_SETTINGS: u8 = 0x45;
    /// Change the key settings of the selected application
    pub const CHANGE_KEY_SETTINGS: u8 = 0x54;

    /// Read hardware/software/production information
    pub const GET_VERSION: u8 = 0x60;
    /// Erase all applications and files
    pub const FORMAT_PICC: u8 = 0xFC;
    /// Card configuration
    pub const SET_CONFIGURATION: u8 = 0x5C;
    /// Read the real UID when random ID is enabled
    pub const GET_CARD_UID: u8 = 0x51;
    /// Remaining free user memory
    pub const FREE_MEMORY: u8 = 0x6E;

    /// List application identifiers
    pub const GET_APPLICATION_IDS: u8 = 0x6A;
    /// Create an application
    pub const CREATE_APPLICATION: u8 = 0xCA;
    /// Delete an application
    pub const DELETE_APPLICATION: u8 = 0xDA;
    /// Select an application
    pub const SELECT_APPLICATION: u8 = 0x5A;

    /// List file identifiers of the selected application
    pub const GET_FILE_IDS: u8 = 0x6F;
    /// Read the settings of a file
    pub const GET_FILE_SETTINGS: u8 = 0xF5;
    /// Create a standard data file
    pub const CREATE_STD_DATA_FILE: u8 = 0xCD;
    /// Delete a file
    pub const DELETE_FILE: u8 = 0xDF;
    /// Read from a data file
    pub const READ_DATA: u8 = 0xBD;
    /// Write to a data file
    pub const WRITE_DATA: u8 = 0x3D;
    /// Read a value file
    pub const GET_VALUE: u8 = 0x6C;
}

/// A native command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    header: Vec<u8>,
    params: Vec<u8>,
}

impl Command {
    /// Create a new command with no header and no parameters
    pub const fn new(opcode: u8) -> Self {
        Self {
            opcode,
            header: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Create an additional frame request
    pub const fn additional_frame() -> Self {
        Self::new(opcode::ADDITIONAL_FRAME)
    }

    /// Set the clear header bytes
    pub fn with_header(mut self, header: impl AsRef<[u8]>) -> Self {
        self.header = header.as_ref().to_vec();
        self
    }

    /// Set the parameter bytes
    pub fn with_params(mut self, params: impl AsRef<[u8]>) -> Self {
        self.params = params.as_ref().to_vec();
        self
    }

    /// Get the command code
    pub const fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Get the header bytes
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Get the parameter bytes
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Replace the parameter bytes (used once they have been protected)
    pub fn set_params(&mut self, params: Vec<u8>) {
        self.params = params;
    }

    /// Whether this command continues a multi-frame exchange
    pub const fn is_additional_frame(&self) -> bool {
        self.opcode == opcode::ADDITIONAL_FRAME
    }

    /// Total length of the encoded frame
    pub fn len(&self) -> usize {
        1 + self.header.len() + self.params.len()
    }

    /// A command always carries at least its opcode
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Opcode followed by the header, the part a MAC or CRC always covers
    pub fn prefix(&self) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(1 + self.header.len());
        prefix.push(self.opcode);
        prefix.extend_from_slice(&self.header);
        prefix
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u8(self.opcode);
        buf.put_slice(&self.header);
        buf.put_slice(&self.params);
        buf.freeze()
    }

    /// Encode to wire bytes, refusing frames longer than `limit`
    pub fn to_bytes_checked(&self, limit: usize) -> Result<Bytes, FrameError> {
        if self.len() > limit {
            return Err(FrameError::too_large(limit, self.len()));
        }
        Ok(self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_encode_with_header() {
        let cmd = Command::new(opcode::SET_CONFIGURATION)
            .with_header([0x00])
            .with_params([0x02]);
        assert_eq!(cmd.len(), 3);
        assert_eq!(cmd.prefix(), vec![0x5C, 0x00]);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("5C0002"));
    }

    #[test]
    fn test_additional_frame() {
        let cmd = Command::additional_frame();
        assert!(cmd.is_additional_frame());
        assert_eq!(cmd.to_bytes().as_ref(), hex!("AF"));
    }

    #[test]
    fn test_frame_limit() {
        let cmd = Command::new(opcode::WRITE_DATA).with_params([0u8; 60]);
        assert_eq!(
            cmd.to_bytes_checked(MAX_FRAME_SIZE),
            Err(FrameError::TooLarge {
                limit: 60,
                actual: 61
            })
        );
        assert!(cmd.to_bytes_checked(64).is_ok());
    }
}
