//! Application directory commands

use nexum_desfire_core::{CardTransport, Command, opcode};
use rand::RngCore;
use tracing::{debug, instrument};

use crate::{
    Desfire, Error, Result,
    commands::key_settings::KeySettings,
    crypto::KeyVariant,
    messenger::Protection,
};

/// Applications a card holds at most
pub const MAX_APPLICATIONS: usize = 28;

/// 24-bit application identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
#[display("{_0:06X}")]
pub struct ApplicationId(u32);

impl ApplicationId {
    /// The card level, selected after power up
    pub const PICC: Self = Self(0);

    /// Create an identifier from the low 24 bits of `aid`
    pub const fn new(aid: u32) -> Self {
        Self(aid & 0x00FF_FFFF)
    }

    /// Numeric value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Whether this is the card level
    pub const fn is_picc(&self) -> bool {
        self.0 == 0
    }

    /// Wire encoding, three bytes little-endian
    pub const fn to_le_bytes(&self) -> [u8; 3] {
        let [a, b, c, _] = self.0.to_le_bytes();
        [a, b, c]
    }

    /// Decode three little-endian bytes
    pub const fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }
}

impl From<u32> for ApplicationId {
    fn from(aid: u32) -> Self {
        Self::new(aid)
    }
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// Select an application, or the card level with [`ApplicationId::PICC`]
    ///
    /// Ends any authentication.
    #[instrument(level = "debug", skip(self), fields(aid = %aid))]
    pub fn select_application(&mut self, aid: ApplicationId) -> Result<()> {
        let command = Command::new(opcode::SELECT_APPLICATION).with_params(aid.to_le_bytes());
        let outcome = self
            .messenger
            .exchange_single(command, Protection::none(), 0);
        // the card drops its authentication whatever the outcome
        self.messenger.session_mut().invalidate();
        outcome?;
        self.messenger.session_mut().select_application(aid);
        Ok(())
    }

    /// List the applications on the card
    #[instrument(level = "debug", skip(self))]
    pub fn get_application_ids(&mut self) -> Result<Vec<ApplicationId>> {
        let data = self.messenger.exchange_all(
            Command::new(opcode::GET_APPLICATION_IDS),
            Protection::mac(),
            MAX_APPLICATIONS * 3,
        )?;
        if data.len() % 3 != 0 {
            return Err(Error::InvalidResponse("application list is not a multiple of 3"));
        }

        let ids: Vec<_> = data
            .chunks_exact(3)
            .map(|c| ApplicationId::from_le_bytes([c[0], c[1], c[2]]))
            .collect();
        debug!(count = ids.len(), "Applications listed");
        Ok(ids)
    }

    /// Create an application holding `key_count` keys of `key_type`
    ///
    /// Needs the card level selected and, unless the card settings allow
    /// free creation, authentication with the card master key.
    #[instrument(level = "debug", skip(self), fields(aid = %aid))]
    pub fn create_application(
        &mut self,
        aid: ApplicationId,
        settings: KeySettings,
        key_count: u8,
        key_type: KeyVariant,
    ) -> Result<()> {
        let mut params = aid.to_le_bytes().to_vec();
        params.push(settings.bits());
        params.push((key_count & 0x0F) | key_type.key_type_code());

        self.messenger.exchange_single(
            Command::new(opcode::CREATE_APPLICATION).with_params(params),
            Protection::mac(),
            0,
        )?;
        Ok(())
    }

    /// Delete an application
    #[instrument(level = "debug", skip(self), fields(aid = %aid))]
    pub fn delete_application(&mut self, aid: ApplicationId) -> Result<()> {
        self.messenger.exchange_single(
            Command::new(opcode::DELETE_APPLICATION).with_params(aid.to_le_bytes()),
            Protection::mac(),
            0,
        )?;
        Ok(())
    }

    /// Delete an application if the card lists it
    ///
    /// Deleting a missing application would end the authentication, so the
    /// directory is checked first. Returns whether anything was deleted.
    pub fn delete_application_if_exists(&mut self, aid: ApplicationId) -> Result<bool> {
        if !self.get_application_ids()?.contains(&aid) {
            debug!(aid = %aid, "Application not present, nothing to delete");
            return Ok(false);
        }
        self.delete_application(aid)?;
        Ok(true)
    }
}
