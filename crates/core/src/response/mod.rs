//! Native response frames
//!
//! A native response is laid out as `[status][payload..]`. When a secure
//! session is active and the status is an unqualified success the payload may
//! end in a truncated 8-byte CMAC, which the session layer strips.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::FrameError;
use status::Status;

/// Basic native response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status byte
    status: Status,
    /// Response payload data
    payload: Bytes,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(status: impl Into<Status>, payload: impl Into<Bytes>) -> Self {
        Self {
            status: status.into(),
            payload: payload.into(),
        }
    }

    /// Parse response from raw bytes (status byte first)
    pub fn from_bytes(data: &Bytes) -> Result<Self, FrameError> {
        let Some(&status) = data.first() else {
            return Err(FrameError::EmptyResponse);
        };
        let status = Status::from_byte(status);
        let payload = data.slice(1..);

        trace!(
            status = format_args!("{:#04x}", status.to_byte()),
            payload_len = payload.len(),
            "Parsed native response"
        );

        Ok(Self { status, payload })
    }

    /// Get the status
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Get the response payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take the payload out of the response
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = FrameError;

    fn try_from(data: &[u8]) -> Result<Self, FrameError> {
        Self::from_bytes(&Bytes::copy_from_slice(data))
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.payload.len() + 1);
        buf.put_u8(response.status.to_byte());
        buf.put_slice(&response.payload);
        buf.freeze()
    }
}
