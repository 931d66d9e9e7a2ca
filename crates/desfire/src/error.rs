use nexum_desfire_core::{FrameError, Status, TransportError};
use thiserror::Error;

use crate::auth::AuthStage;
use crate::crypto::KeyVariant;

/// Result type for DESFire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which integrity check rejected a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum IntegrityCheck {
    /// CRC32 over plaintext did not match
    #[display("CRC32")]
    Crc,
    /// Truncated CMAC did not match
    #[display("CMAC")]
    Cmac,
}

/// Error type for DESFire operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Framing errors
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Response did not follow the expected exchange pattern
    #[error("Protocol error: {0}")]
    Protocol(&'static str),

    /// Mutual authentication failed at the given stage
    #[error("Authentication failed at {0}")]
    AuthenticationFailed(AuthStage),

    /// Integrity check of a response failed
    #[error("Integrity check failed: {0} mismatch")]
    Integrity(IntegrityCheck),

    /// The card returned a status that ends the exchange
    #[error("Card status {0}")]
    CardStatus(Status),

    /// Operation needs an authenticated session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Key material does not match the key variant
    #[error("Invalid key size for {variant}: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Requested key variant
        variant: KeyVariant,
        /// Length the variant requires
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Data is not a positive multiple of the cipher block size
    #[error("Invalid block size: {actual} bytes is not a multiple of {block_size}")]
    InvalidBlockSize {
        /// Cipher block size
        block_size: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// A fixed-capacity buffer would overflow
    #[error("Buffer full: {required} bytes needed, capacity {capacity}")]
    BufferFull {
        /// Buffer capacity
        capacity: usize,
        /// Bytes the operation needs
        required: usize,
    },

    /// Changing a foreign key slot without supplying its current key
    #[error("Current key for slot {0} is required")]
    MissingCurrentKey(u8),

    /// Response payload is malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(&'static str),

    /// Argument cannot be encoded on the wire
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

impl Error {
    /// Whether this error is a card status
    pub const fn is_card_status(&self) -> bool {
        matches!(self, Self::CardStatus(_))
    }

    /// Get the card status if this is a status error
    pub const fn card_status(&self) -> Option<Status> {
        match self {
            Self::CardStatus(status) => Some(*status),
            _ => None,
        }
    }
}
