//! DESFire card interface
//!
//! [`Desfire`] ties the secure messenger and the authenticator together. The
//! typed card commands are implemented on it in the `commands` modules.

use nexum_desfire_core::CardTransport;
use rand::{RngCore, rngs::ThreadRng};

use crate::{
    Error, Result,
    auth::{AuthState, Authenticator},
    commands::ApplicationId,
    config::DesfireConfig,
    crypto::CipherKey,
    messenger::SecureMessenger,
    session::Session,
};

/// A DESFire card behind a transport
#[derive(Debug)]
pub struct Desfire<T: CardTransport, R: RngCore = ThreadRng> {
    pub(crate) messenger: SecureMessenger<T>,
    authenticator: Authenticator<R>,
}

impl<T: CardTransport> Desfire<T> {
    /// Create an interface with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DesfireConfig::default())
    }

    /// Create an interface with a custom configuration
    pub fn with_config(transport: T, config: DesfireConfig) -> Self {
        Self::with_rng(transport, config, rand::rng())
    }
}

impl<T: CardTransport, R: RngCore> Desfire<T, R> {
    /// Create an interface drawing authentication randoms from `rng`
    pub fn with_rng(transport: T, config: DesfireConfig, rng: R) -> Self {
        Self {
            messenger: SecureMessenger::new(transport, config),
            authenticator: Authenticator::with_rng(rng),
        }
    }

    /// Authenticate with the key in `slot` of the selected application
    pub fn authenticate(&mut self, slot: u8, key: &CipherKey) -> Result<()> {
        self.authenticator
            .authenticate(&mut self.messenger, slot, key)
    }

    /// State reached by the last authentication
    pub const fn auth_state(&self) -> AuthState {
        self.authenticator.state()
    }

    /// Current session
    pub const fn session(&self) -> &Session {
        self.messenger.session()
    }

    /// Whether a session key is established
    pub const fn is_authenticated(&self) -> bool {
        self.messenger.session().is_authenticated()
    }

    /// Slot of the current authentication
    pub fn authenticated_slot(&self) -> Option<u8> {
        self.messenger.session().authenticated_slot()
    }

    /// Application selected on the card
    pub const fn selected_application(&self) -> ApplicationId {
        self.messenger.session().selected_application()
    }

    /// Secure messenger, for commands without a typed wrapper
    pub const fn messenger(&self) -> &SecureMessenger<T> {
        &self.messenger
    }

    /// Mutable secure messenger
    pub const fn messenger_mut(&mut self) -> &mut SecureMessenger<T> {
        &mut self.messenger
    }

    /// Reset the transport and forget all session state
    ///
    /// Use after the card left the field; it comes back at card level and
    /// unauthenticated.
    pub fn reset_session(&mut self) -> Result<()> {
        self.messenger.session_mut().reset();
        self.messenger
            .transport_mut()
            .reset()
            .map_err(|e| Error::Transport(e.into()))
    }

    /// Consume the interface and return the transport
    pub fn into_transport(self) -> T {
        self.messenger.into_transport()
    }
}
