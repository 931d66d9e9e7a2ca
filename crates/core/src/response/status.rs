//! Status byte definitions for native responses

use std::fmt;

use tracing::Level;

/// Status byte leading every native response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation completed
    Success,
    /// No changes were made, nothing to commit
    NoChanges,
    /// Not enough non-volatile memory
    OutOfMemory,
    /// Command code not supported
    IllegalCommand,
    /// CRC or MAC does not match, or invalid padding
    IntegrityError,
    /// Key slot does not exist
    NoSuchKey,
    /// Length of the command string is invalid
    LengthError,
    /// Current configuration or status does not allow the command
    PermissionDenied,
    /// Value of a parameter is invalid
    ParameterError,
    /// Requested application is not present
    ApplicationNotFound,
    /// Unrecoverable error within an application
    ApplicationIntegrityError,
    /// Current authentication status does not allow the command
    AuthenticationError,
    /// More frames are waiting to be exchanged
    MoreFrames,
    /// Attempt to read or write beyond the file limits
    BoundaryError,
    /// Unrecoverable error within the card, which will be disabled
    CardIntegrityError,
    /// Previous command was not fully completed
    CommandAborted,
    /// Card was disabled by an unrecoverable error
    CardDisabled,
    /// Number of applications is limited to 28
    CountError,
    /// Application or file with that number already exists
    DuplicateError,
    /// Non-volatile memory could not be written
    EepromError,
    /// Requested file does not exist
    FileNotFound,
    /// Unrecoverable error within a file
    FileIntegrityError,
    /// Status byte this crate does not know
    Unknown(u8),
}

impl Status {
    /// Decode a status byte
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Success,
            0x0C => Self::NoChanges,
            0x0E => Self::OutOfMemory,
            0x1C => Self::IllegalCommand,
            0x1E => Self::IntegrityError,
            0x40 => Self::NoSuchKey,
            0x7E => Self::LengthError,
            0x9D => Self::PermissionDenied,
            0x9E => Self::ParameterError,
            0xA0 => Self::ApplicationNotFound,
            0xA1 => Self::ApplicationIntegrityError,
            0xAE => Self::AuthenticationError,
            0xAF => Self::MoreFrames,
            0xBE => Self::BoundaryError,
            0xC1 => Self::CardIntegrityError,
            0xCA => Self::CommandAborted,
            0xCD => Self::CardDisabled,
            0xCE => Self::CountError,
            0xDE => Self::DuplicateError,
            0xEE => Self::EepromError,
            0xF0 => Self::FileNotFound,
            0xF1 => Self::FileIntegrityError,
            other => Self::Unknown(other),
        }
    }

    /// Encode back to the status byte
    pub const fn to_byte(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::NoChanges => 0x0C,
            Self::OutOfMemory => 0x0E,
            Self::IllegalCommand => 0x1C,
            Self::IntegrityError => 0x1E,
            Self::NoSuchKey => 0x40,
            Self::LengthError => 0x7E,
            Self::PermissionDenied => 0x9D,
            Self::ParameterError => 0x9E,
            Self::ApplicationNotFound => 0xA0,
            Self::ApplicationIntegrityError => 0xA1,
            Self::AuthenticationError => 0xAE,
            Self::MoreFrames => 0xAF,
            Self::BoundaryError => 0xBE,
            Self::CardIntegrityError => 0xC1,
            Self::CommandAborted => 0xCA,
            Self::CardDisabled => 0xCD,
            Self::CountError => 0xCE,
            Self::DuplicateError => 0xDE,
            Self::EepromError => 0xEE,
            Self::FileNotFound => 0xF0,
            Self::FileIntegrityError => 0xF1,
            Self::Unknown(byte) => *byte,
        }
    }

    /// Check if this status indicates success
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the card has more frames for us
    pub const fn is_more_frames(&self) -> bool {
        matches!(self, Self::MoreFrames)
    }

    /// Whether an authenticated session survives this status
    ///
    /// The card drops its authentication state on every other outcome.
    pub const fn keeps_authentication(&self) -> bool {
        matches!(self, Self::Success | Self::NoChanges | Self::MoreFrames)
    }

    /// Get the appropriate tracing level for this status
    pub const fn tracing_level(&self) -> Level {
        match self {
            Self::Success | Self::MoreFrames => Level::DEBUG,
            Self::NoChanges => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Get a description of this status
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NoChanges => "No changes done to backup files",
            Self::OutOfMemory => "Insufficient non-volatile memory",
            Self::IllegalCommand => "Command code not supported",
            Self::IntegrityError => "CRC or MAC does not match data",
            Self::NoSuchKey => "Invalid key number specified",
            Self::LengthError => "Length of command string invalid",
            Self::PermissionDenied => "Current configuration does not allow the command",
            Self::ParameterError => "Value of the parameter invalid",
            Self::ApplicationNotFound => "Requested application not present",
            Self::ApplicationIntegrityError => "Unrecoverable error within application",
            Self::AuthenticationError => "Current authentication status does not allow the command",
            Self::MoreFrames => "Additional frame expected",
            Self::BoundaryError => "Attempt to read or write beyond file limits",
            Self::CardIntegrityError => "Unrecoverable error within card",
            Self::CommandAborted => "Previous command was not fully completed",
            Self::CardDisabled => "Card was disabled by an unrecoverable error",
            Self::CountError => "Number of applications limited to 28",
            Self::DuplicateError => "Application or file already exists",
            Self::EepromError => "Could not complete non-volatile write operation",
            Self::FileNotFound => "Specified file number does not exist",
            Self::FileIntegrityError => "Unrecoverable error within file",
            Self::Unknown(_) => "Unknown status",
        }
    }
}

impl From<u8> for Status {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.to_byte()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} ({})", self.to_byte(), self.description())
    }
}
