//! Master key settings and key versions

use nexum_desfire_core::{CardTransport, Command, opcode};
use rand::RngCore;
use tracing::{debug, instrument};

use crate::{Desfire, Error, Result, crypto::KeyVariant, messenger::Protection};

/// Master key settings of the card or of an application
///
/// The low nibble holds the flags below; the high nibble names the key
/// needed to change other keys (`0x0` master key, `0xE` the key itself,
/// `0xF` all keys frozen, otherwise that slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySettings(u8);

impl KeySettings {
    /// The master key may be changed
    pub const ALLOW_CHANGE_MASTER_KEY: u8 = 0x01;
    /// Directory listing and key settings are readable without the master key
    pub const FREE_DIRECTORY_LIST: u8 = 0x02;
    /// Applications or files may be created and deleted without the master key
    pub const FREE_CREATE_DELETE: u8 = 0x04;
    /// The settings themselves may be changed
    pub const CONFIGURATION_CHANGEABLE: u8 = 0x08;
    /// Settings of a fresh card
    pub const FACTORY_DEFAULT: Self = Self(0x0F);

    /// Wrap raw settings
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw settings byte
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether all bits of `flag` are set
    pub const fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// Key needed to change other keys
    pub const fn change_key_access(&self) -> u8 {
        self.0 >> 4
    }

    /// Set the key needed to change other keys
    pub const fn with_change_key_access(self, access: u8) -> Self {
        Self((self.0 & 0x0F) | (access << 4))
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        Self::FACTORY_DEFAULT
    }
}

/// Answer to a key settings query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySettingsInfo {
    /// Master key settings
    pub settings: KeySettings,
    /// Number of keys (1 at card level)
    pub key_count: u8,
    /// Key type code of the application (`0x00`, `0x40` or `0x80`)
    pub key_type: u8,
}

impl KeySettingsInfo {
    /// Key variant family from the type code
    ///
    /// Type `0x00` covers both single DES and two key triple DES, so the
    /// larger of the two is reported.
    pub const fn key_variant(&self) -> Option<KeyVariant> {
        match self.key_type {
            0x00 => Some(KeyVariant::TwoKeyTripleDes),
            0x40 => Some(KeyVariant::ThreeKeyTripleDes),
            0x80 => Some(KeyVariant::Aes128),
            _ => None,
        }
    }
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// Read the master key settings of the selected application
    #[instrument(level = "debug", skip(self))]
    pub fn get_key_settings(&mut self) -> Result<KeySettingsInfo> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_KEY_SETTINGS),
            Protection::mac(),
            2,
        )?;
        let [settings, keys] = data[..] else {
            return Err(Error::InvalidResponse("key settings must be 2 bytes"));
        };

        let info = KeySettingsInfo {
            settings: KeySettings::from_bits(settings),
            key_count: keys & 0x0F,
            key_type: keys & 0xF0,
        };
        debug!(
            settings = format_args!("{settings:#04x}"),
            key_count = info.key_count,
            "Key settings read"
        );
        Ok(info)
    }

    /// Change the master key settings of the selected application
    ///
    /// Needs authentication with its master key.
    #[instrument(level = "debug", skip(self))]
    pub fn change_key_settings(&mut self, settings: KeySettings) -> Result<()> {
        self.messenger.exchange_single(
            Command::new(opcode::CHANGE_KEY_SETTINGS).with_params([settings.bits()]),
            Protection::encrypted_command(),
            0,
        )?;
        Ok(())
    }

    /// Read the version of the key in `slot`
    #[instrument(level = "debug", skip(self))]
    pub fn get_key_version(&mut self, slot: u8) -> Result<u8> {
        let data = self.messenger.exchange_single(
            Command::new(opcode::GET_KEY_VERSION).with_params([slot]),
            Protection::mac(),
            1,
        )?;
        data.first()
            .copied()
            .ok_or(Error::InvalidResponse("missing key version"))
    }
}
