//! Frame level errors
//!
//! Errors raised while building a command frame or splitting a response frame.
//! They carry no cryptographic meaning, that is left to the session layer.

use thiserror::Error;

/// Error for native command and response framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The card answered without even a status byte
    #[error("Empty response frame")]
    EmptyResponse,

    /// A frame exceeds the negotiated maximum frame size
    #[error("Frame too large: {actual} bytes (limit {limit})")]
    TooLarge {
        /// Configured limit
        limit: usize,
        /// Offending frame length
        actual: usize,
    },
}

impl FrameError {
    /// Create a new frame size error
    pub const fn too_large(limit: usize, actual: usize) -> Self {
        Self::TooLarge { limit, actual }
    }
}
