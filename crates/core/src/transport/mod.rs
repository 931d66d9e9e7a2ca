//! Reader transports
//!
//! A [`CardTransport`] moves one native frame to the card and brings the
//! card's answer back. It sits below the secure channel and knows nothing
//! about opcodes, status bytes or sessions.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Raw frame exchange with a card in the field
///
/// Reader framing, checksums and retries belong to the implementation and are
/// never visible to callers. Implementors provide [`do_transmit_raw`]; the
/// provided [`transmit_raw`] wraps it with frame tracing.
///
/// [`do_transmit_raw`]: CardTransport::do_transmit_raw
/// [`transmit_raw`]: CardTransport::transmit_raw
pub trait CardTransport: fmt::Debug {
    /// Reader specific error, convertible to the common [`TransportError`]
    type Error: Into<TransportError> + fmt::Debug;

    /// Send one frame and return the card's answer
    fn transmit_raw(&mut self, frame: &[u8]) -> Result<Bytes, Self::Error> {
        trace!(frame = %hex::encode(frame), "-> card");
        match self.do_transmit_raw(frame) {
            Ok(answer) => {
                trace!(frame = %hex::encode(&answer), "<- card");
                Ok(answer)
            }
            Err(e) => {
                debug!(error = ?e, "Frame exchange failed");
                Err(e)
            }
        }
    }

    /// Reader specific exchange of one frame
    fn do_transmit_raw(&mut self, frame: &[u8]) -> Result<Bytes, Self::Error>;

    /// Whether a card is present
    fn is_connected(&self) -> bool;

    /// Cycle the field so the card restarts unauthenticated at card level
    fn reset(&mut self) -> Result<(), Self::Error>;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    type Error = T::Error;

    fn do_transmit_raw(&mut self, frame: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).do_transmit_raw(frame)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        (**self).reset()
    }
}
