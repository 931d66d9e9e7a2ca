//! Typed card commands built on the secure messenger

pub mod application;
pub mod card;
pub mod file;
pub mod key_settings;

pub use application::{ApplicationId, MAX_APPLICATIONS};
pub use card::{CardVersion, UID_LEN, VersionInfo};
pub use file::{
    AccessRight, CommunicationMode, FileDetails, FilePermissions, FileSettings, FileType,
    MAX_FILES,
};
pub use key_settings::{KeySettings, KeySettingsInfo};
