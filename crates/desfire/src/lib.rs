//! DESFire secure channel
//!
//! Mutual authentication against a shared key, session key derivation, the
//! card's CBC chaining and CMAC, and the encrypted command framing built on
//! top of them.
//!
//! ```no_run
//! use nexum_desfire::{CipherKey, Desfire, KeyVariant};
//! # fn run<T: nexum_desfire_core::CardTransport>(transport: T) -> nexum_desfire::Result<()> {
//! let mut card = Desfire::new(transport);
//! let key = CipherKey::zeroed(KeyVariant::TwoKeyTripleDes)?;
//! card.authenticate(0, &key)?;
//! let version = card.get_card_version()?;
//! println!("UID {}", hex::encode(version.uid));
//! # Ok(())
//! # }
//! ```
//!
//! Every protected exchange advances the session IV. A status other than
//! success, no changes or more frames ends the session on both sides, and
//! so does a CMAC mismatch; authenticate again before the next protected
//! command.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod change_key;
pub mod commands;
pub mod config;
pub mod crypto;
mod desfire;
mod error;
pub mod messenger;
pub mod session;

#[cfg(test)]
mod testing;

pub use auth::{AuthStage, AuthState, Authenticator};
pub use change_key::key_change_cryptogram;
pub use commands::{
    AccessRight, ApplicationId, CardVersion, CommunicationMode, FileDetails, FilePermissions,
    FileSettings, FileType, KeySettings, KeySettingsInfo,
};
pub use config::DesfireConfig;
pub use crypto::{CbcDirection, CipherKey, CipherOp, Cmac, KeyVariant};
pub use desfire::Desfire;
pub use error::{Error, IntegrityCheck, Result};
pub use messenger::{Protection, SecureMessenger};
pub use session::Session;

// Re-export the frame layer for convenience
pub use nexum_desfire_core::{CardTransport, Command, Response, Status, TransportError};
