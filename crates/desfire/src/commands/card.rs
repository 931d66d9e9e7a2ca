//! Card level commands

use nexum_desfire_core::{CardTransport, Command, opcode};
use rand::RngCore;
use tracing::{debug, instrument, warn};

use crate::{
    Desfire, Error, IntegrityCheck, Result,
    crypto::crc32,
    messenger::Protection,
};

/// Length of a card UID
pub const UID_LEN: usize = 7;

/// Hardware or software part of the version answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Vendor id (0x04 for NXP)
    pub vendor_id: u8,
    /// Product type
    pub product_type: u8,
    /// Product subtype
    pub subtype: u8,
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Storage size code; the size is `1 << (code / 2)` bytes
    pub storage_size: u8,
    /// Communication protocol type
    pub protocol: u8,
}

impl VersionInfo {
    const fn from_bytes(b: [u8; 7]) -> Self {
        Self {
            vendor_id: b[0],
            product_type: b[1],
            subtype: b[2],
            major: b[3],
            minor: b[4],
            storage_size: b[5],
            protocol: b[6],
        }
    }

    /// Approximate storage size in bytes
    pub const fn storage_bytes(&self) -> u32 {
        1 << ((self.storage_size / 2) & 0x1F)
    }
}

/// Manufacturing data returned by the get version command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardVersion {
    /// Hardware version
    pub hardware: VersionInfo,
    /// Software version
    pub software: VersionInfo,
    /// Real UID
    pub uid: [u8; UID_LEN],
    /// Production batch number
    pub batch: [u8; 5],
    /// Production week, BCD
    pub production_week: u8,
    /// Production year, BCD
    pub production_year: u8,
}

impl CardVersion {
    /// Length of the full answer over all frames
    pub const LEN: usize = 28;

    /// Parse the concatenated answer
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(Error::InvalidResponse("card version must be 28 bytes"));
        }

        Ok(Self {
            hardware: VersionInfo::from_bytes(take(data, 0)),
            software: VersionInfo::from_bytes(take(data, 7)),
            uid: take(data, 14),
            batch: take(data, 21),
            production_week: data[26],
            production_year: data[27],
        })
    }
}

fn take<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// Read hardware, software and production data over three frames
    #[instrument(level = "debug", skip(self))]
    pub fn get_card_version(&mut self) -> Result<CardVersion> {
        let data = self.messenger.exchange_all(
            Command::new(opcode::GET_VERSION),
            Protection::mac(),
            CardVersion::LEN,
        )?;
        let version = CardVersion::parse(&data)?;
        debug!(
            hardware = format_args!("{}.{}", version.hardware.major, version.hardware.minor),
            software = format_args!("{}.{}", version.software.major, version.software.minor),
            uid = %hex::encode(version.uid),
            "Card version read"
        );
        Ok(version)
    }

    /// Erase every application and file
    ///
    /// Needs the card level selected and authentication with the card master key.
    #[instrument(level = "debug", skip(self))]
    pub fn format_card(&mut self) -> Result<()> {
        self.messenger
            .exchange_single(Command::new(opcode::FORMAT_PICC), Protection::mac(), 0)?;
        Ok(())
    }

    /// Free memory on the card in bytes
    #[instrument(level = "debug", skip(self))]
    pub fn get_free_memory(&mut self) -> Result<u32> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::FREE_MEMORY),
            Protection::mac(),
            3,
        )?;
        let [a, b, c] = data[..] else {
            return Err(Error::InvalidResponse("free memory must be 3 bytes"));
        };
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    /// Read the real UID of a card in random ID mode
    ///
    /// The answer is enciphered with the session key and carries a CRC32
    /// over the UID and the success status byte.
    #[instrument(level = "debug", skip(self))]
    pub fn get_real_card_id(&mut self) -> Result<[u8; UID_LEN]> {
        if !self.messenger.session().is_authenticated() {
            return Err(Error::NotAuthenticated);
        }

        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_CARD_UID),
            Protection::encrypted_response(),
            16,
        )?;
        let Some((uid, rest)) = data.split_first_chunk::<UID_LEN>() else {
            return Err(Error::InvalidResponse("real card id truncated"));
        };
        let Some(received) = rest.first_chunk::<4>() else {
            return Err(Error::InvalidResponse("real card id truncated"));
        };

        let expected = crc32(&[uid, &[0x00]]);
        if u32::from_le_bytes(*received) != expected {
            warn!("Real card id CRC mismatch");
            self.messenger.session_mut().invalidate();
            return Err(Error::Integrity(IntegrityCheck::Crc));
        }
        Ok(*uid)
    }

    /// Switch the card to random ID mode
    ///
    /// The card announces a random UID from then on. This cannot be undone.
    #[instrument(level = "debug", skip(self))]
    pub fn enable_random_id_forever(&mut self) -> Result<()> {
        warn!("Enabling random ID permanently");
        self.messenger.exchange_single(
            Command::new(opcode::SET_CONFIGURATION)
                .with_header([0x00])
                .with_params([0x02]),
            Protection::encrypted_command(),
            0,
        )?;
        Ok(())
    }
}
