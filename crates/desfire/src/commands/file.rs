//! File settings, standard data files and value files
//!
//! Data is moved in bounded chunks so that each frame carries its own MAC.
//! Following a long read through additional frames instead would require the
//! MAC buffer to hold the whole file.

use nexum_desfire_core::{CardTransport, Command, Status, opcode};
use rand::RngCore;
use tracing::{debug, instrument, trace};

use crate::{Desfire, Error, Result, messenger::Protection};

/// Files an application holds at most
pub const MAX_FILES: usize = 32;

/// Largest value encodable in the 24-bit size and offset fields
const MAX_U24: u32 = 0x00FF_FFFF;

/// Who may perform a file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessRight {
    /// Authentication with this key slot (0 to 13)
    Key(u8),
    /// Anybody, without authentication
    Free,
    /// Nobody
    Never,
}

impl AccessRight {
    /// Decode a 4-bit access nibble
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0E => Self::Free,
            0x0F => Self::Never,
            slot => Self::Key(slot),
        }
    }

    /// Encode as a 4-bit access nibble
    pub const fn to_nibble(self) -> u8 {
        match self {
            Self::Key(slot) => slot & 0x0F,
            Self::Free => 0x0E,
            Self::Never => 0x0F,
        }
    }
}

/// Access rights of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilePermissions {
    /// Reading
    pub read: AccessRight,
    /// Writing
    pub write: AccessRight,
    /// Reading and writing
    pub read_write: AccessRight,
    /// Changing these permissions
    pub change: AccessRight,
}

impl FilePermissions {
    /// Same right for every operation
    pub const fn uniform(right: AccessRight) -> Self {
        Self {
            read: right,
            write: right,
            read_write: right,
            change: right,
        }
    }

    /// Pack into the 16-bit wire form
    pub const fn pack(&self) -> u16 {
        ((self.read.to_nibble() as u16) << 12)
            | ((self.write.to_nibble() as u16) << 8)
            | ((self.read_write.to_nibble() as u16) << 4)
            | self.change.to_nibble() as u16
    }

    /// Unpack from the 16-bit wire form
    pub const fn unpack(packed: u16) -> Self {
        Self {
            read: AccessRight::from_nibble((packed >> 12) as u8),
            write: AccessRight::from_nibble((packed >> 8) as u8),
            read_write: AccessRight::from_nibble((packed >> 4) as u8),
            change: AccessRight::from_nibble(packed as u8),
        }
    }
}

/// Kind of file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Plain data
    StandardData,
    /// Data with transactional backup
    BackupData,
    /// 32-bit value with limits
    Value,
    /// Records appended until full
    LinearRecord,
    /// Records overwriting the oldest when full
    CyclicRecord,
}

impl TryFrom<u8> for FileType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::StandardData,
            1 => Self::BackupData,
            2 => Self::Value,
            3 => Self::LinearRecord,
            4 => Self::CyclicRecord,
            _ => return Err(Error::InvalidResponse("unknown file type")),
        })
    }
}

/// How file data travels between host and card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommunicationMode {
    /// Plain data
    #[default]
    Plain,
    /// Plain data followed by a MAC
    Mac,
    /// Enciphered data
    Encrypted,
}

impl CommunicationMode {
    /// Decode the mode byte; bit 1 alone also means plain
    pub const fn from_byte(byte: u8) -> Self {
        match byte & 0x03 {
            0x01 => Self::Mac,
            0x03 => Self::Encrypted,
            _ => Self::Plain,
        }
    }

    /// Wire encoding
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Plain => 0x00,
            Self::Mac => 0x01,
            Self::Encrypted => 0x03,
        }
    }
}

/// Settings specific to the file type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDetails {
    /// Standard or backup data file
    Data {
        /// File size in bytes
        size: u32,
    },
    /// Value file
    Value {
        /// Lowest allowed value
        lower_limit: u32,
        /// Highest allowed value
        upper_limit: u32,
        /// Limited credit amount
        limited_credit: u32,
        /// Whether limited credit is enabled
        limited_credit_enabled: bool,
    },
    /// Linear or cyclic record file
    Record {
        /// Size of one record
        record_size: u32,
        /// Records the file can hold
        max_records: u32,
        /// Records currently held
        current_records: u32,
    },
}

/// Settings of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSettings {
    /// Kind of file
    pub file_type: FileType,
    /// Communication mode for the file's data
    pub communication_mode: CommunicationMode,
    /// Access rights
    pub permissions: FilePermissions,
    /// Type specific settings
    pub details: FileDetails,
}

impl FileSettings {
    /// Largest settings answer (value files)
    pub const MAX_LEN: usize = 17;

    /// Parse a settings answer
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (&[kind, mode, p0, p1], rest) = split_array::<4>(data)?;
        let file_type = FileType::try_from(kind)?;

        let details = match file_type {
            FileType::StandardData | FileType::BackupData => {
                let (size, _) = split_array::<3>(rest)?;
                FileDetails::Data { size: u24(size) }
            }
            FileType::Value => {
                let (lower, rest) = split_array::<4>(rest)?;
                let (upper, rest) = split_array::<4>(rest)?;
                let (credit, rest) = split_array::<4>(rest)?;
                let (enabled, _) = split_array::<1>(rest)?;
                FileDetails::Value {
                    lower_limit: u32::from_le_bytes(*lower),
                    upper_limit: u32::from_le_bytes(*upper),
                    limited_credit: u32::from_le_bytes(*credit),
                    limited_credit_enabled: enabled[0] != 0,
                }
            }
            FileType::LinearRecord | FileType::CyclicRecord => {
                let (record_size, rest) = split_array::<3>(rest)?;
                let (max_records, rest) = split_array::<3>(rest)?;
                let (current_records, _) = split_array::<3>(rest)?;
                FileDetails::Record {
                    record_size: u24(record_size),
                    max_records: u24(max_records),
                    current_records: u24(current_records),
                }
            }
        };

        Ok(Self {
            file_type,
            communication_mode: CommunicationMode::from_byte(mode),
            permissions: FilePermissions::unpack(u16::from_le_bytes([p0, p1])),
            details,
        })
    }
}

fn split_array<const N: usize>(data: &[u8]) -> Result<(&[u8; N], &[u8])> {
    data.split_first_chunk::<N>()
        .ok_or(Error::InvalidResponse("file settings truncated"))
}

const fn u24(bytes: &[u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn u24_le(value: u32, what: &'static str) -> Result<[u8; 3]> {
    if value > MAX_U24 {
        return Err(Error::InvalidParameter(what));
    }
    let [a, b, c, _] = value.to_le_bytes();
    Ok([a, b, c])
}

/// File id, offset and length as sent by read and write
fn data_params(file: u8, offset: u32, len: usize) -> Result<Vec<u8>> {
    let len = u32::try_from(len).map_err(|_| Error::InvalidParameter("length exceeds 24 bits"))?;
    let mut params = Vec::with_capacity(7);
    params.push(file);
    params.extend_from_slice(&u24_le(offset, "offset exceeds 24 bits")?);
    params.extend_from_slice(&u24_le(len, "length exceeds 24 bits")?);
    Ok(params)
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// List the files of the selected application
    #[instrument(level = "debug", skip(self))]
    pub fn get_file_ids(&mut self) -> Result<Vec<u8>> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_FILE_IDS),
            Protection::mac(),
            MAX_FILES,
        )?;
        debug!(count = data.len(), "Files listed");
        Ok(data.to_vec())
    }

    /// Read the settings of a file
    #[instrument(level = "debug", skip(self))]
    pub fn get_file_settings(&mut self, file: u8) -> Result<FileSettings> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_FILE_SETTINGS).with_params([file]),
            Protection::mac(),
            FileSettings::MAX_LEN,
        )?;
        FileSettings::parse(&data)
    }

    /// Create a standard data file with plain communication
    #[instrument(level = "debug", skip(self))]
    pub fn create_std_data_file(
        &mut self,
        file: u8,
        permissions: FilePermissions,
        size: u32,
    ) -> Result<()> {
        let mut params = vec![file, CommunicationMode::Plain.to_byte()];
        params.extend_from_slice(&permissions.pack().to_le_bytes());
        params.extend_from_slice(&u24_le(size, "file size exceeds 24 bits")?);

        self.messenger.exchange_single(
            Command::new(opcode::CREATE_STD_DATA_FILE).with_params(params),
            Protection::mac(),
            0,
        )?;
        Ok(())
    }

    /// Delete a file of the selected application
    #[instrument(level = "debug", skip(self))]
    pub fn delete_file(&mut self, file: u8) -> Result<()> {
        self.messenger.exchange_single(
            Command::new(opcode::DELETE_FILE).with_params([file]),
            Protection::mac(),
            0,
        )?;
        Ok(())
    }

    /// Read `len` bytes from a standard or backup data file
    #[instrument(level = "debug", skip(self))]
    pub fn read_file_data(&mut self, file: u8, offset: u32, len: usize) -> Result<Vec<u8>> {
        let chunk_size = self.messenger.config().read_chunk_size.max(1);
        let mut out = Vec::with_capacity(len);
        let mut offset = offset;

        while out.len() < len {
            let count = (len - out.len()).min(chunk_size);
            let command =
                Command::new(opcode::READ_DATA).with_params(data_params(file, offset, count)?);
            let (status, chunk) = self.messenger.exchange(command, Protection::mac(), count)?;
            if status != Status::Success || chunk.is_empty() {
                return Err(Error::Protocol("read chunk did not complete in one frame"));
            }

            trace!(offset, received = chunk.len(), "Data chunk read");
            out.extend_from_slice(&chunk);
            // chunk is at most `count`, which fits in 24 bits
            offset += chunk.len() as u32;
        }
        Ok(out)
    }

    /// Write `data` to a standard or backup data file
    #[instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub fn write_file_data(&mut self, file: u8, offset: u32, data: &[u8]) -> Result<()> {
        let chunk_size = self.messenger.config().write_chunk_size.max(1);
        let mut offset = offset;

        for chunk in data.chunks(chunk_size) {
            let mut params = data_params(file, offset, chunk.len())?;
            params.extend_from_slice(chunk);

            let (status, _) = self.messenger.exchange(
                Command::new(opcode::WRITE_DATA).with_params(params),
                Protection::mac(),
                0,
            )?;
            if status != Status::Success {
                return Err(Error::Protocol("write chunk did not complete in one frame"));
            }

            trace!(offset, sent = chunk.len(), "Data chunk written");
            offset += chunk.len() as u32;
        }
        Ok(())
    }

    /// Read the value of a value file
    #[instrument(level = "debug", skip(self))]
    pub fn read_file_value(&mut self, file: u8) -> Result<u32> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_VALUE).with_params([file]),
            Protection::mac(),
            4,
        )?;
        let bytes: [u8; 4] = data[..]
            .try_into()
            .map_err(|_| Error::InvalidResponse("value must be 4 bytes"))?;
        Ok(u32::from_le_bytes(bytes))
    }
}
