//! Errors raised below the frame layer

use thiserror::Error;

/// Failure of a reader to exchange a frame
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reader, or the reader refused the connection
    #[error("Reader connection failed")]
    Connection,

    /// The frame could not be delivered or no answer came back
    #[error("Frame transmission failed")]
    Transmission,

    /// The reader reported a hardware fault
    #[error("Reader device fault")]
    Device,

    /// The card did not answer in time
    #[error("Card did not answer in time")]
    Timeout,

    /// The card left the field
    #[error("Card removed from field")]
    CardRemoved,

    /// Reader specific failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Reader specific failure with a message
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the failure means the card is no longer reachable
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Connection | Self::CardRemoved)
    }
}
