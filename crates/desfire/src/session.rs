//! Session state shared by every exchange
//!
//! A session is either unauthenticated, or holds the slot that authenticated
//! together with the derived session key. The two are set and cleared as one,
//! so a key never outlives its authentication.

use tracing::debug;

use crate::{commands::application::ApplicationId, crypto::CipherKey};

#[derive(Debug)]
struct Authenticated {
    slot: u8,
    key: CipherKey,
}

/// Session state for a card
#[derive(Debug, Default)]
pub struct Session {
    authenticated: Option<Authenticated>,
    selected_application: ApplicationId,
}

impl Session {
    /// Create an unauthenticated session at card level
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session key is established
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated.is_some()
    }

    /// Slot used by the last successful authentication
    pub fn authenticated_slot(&self) -> Option<u8> {
        self.authenticated.as_ref().map(|auth| auth.slot)
    }

    /// Session key, if authenticated
    pub fn key(&self) -> Option<&CipherKey> {
        self.authenticated.as_ref().map(|auth| &auth.key)
    }

    /// Mutable session key, if authenticated
    pub fn key_mut(&mut self) -> Option<&mut CipherKey> {
        self.authenticated.as_mut().map(|auth| &mut auth.key)
    }

    /// Application currently selected on the card
    pub const fn selected_application(&self) -> ApplicationId {
        self.selected_application
    }

    /// Record a completed authentication
    pub(crate) fn establish(&mut self, slot: u8, key: CipherKey) {
        debug!(slot, variant = %key.variant(), "Session established");
        self.authenticated = Some(Authenticated { slot, key });
    }

    /// Drop the session key and the authenticated slot
    pub fn invalidate(&mut self) {
        if self.authenticated.take().is_some() {
            debug!("Session invalidated");
        }
    }

    /// Record a new application selection, which ends any authentication
    pub(crate) fn select_application(&mut self, aid: ApplicationId) {
        self.invalidate();
        self.selected_application = aid;
    }

    /// Forget everything, as after the card leaves the field
    pub(crate) fn reset(&mut self) {
        self.invalidate();
        self.selected_application = ApplicationId::PICC;
    }
}
