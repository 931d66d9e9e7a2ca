//! Test doubles shared by the unit tests

use std::collections::VecDeque;

use bytes::Bytes;
use nexum_desfire_core::{CardTransport, TransportError};
use rand::RngCore;

/// Transport replaying canned responses in order
#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    /// Mock responses to return
    pub(crate) responses: VecDeque<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
}

impl MockTransport {
    pub(crate) fn new(responses: Vec<&'static [u8]>) -> Self {
        Self {
            responses: responses.into_iter().map(Bytes::from_static).collect(),
            commands: Vec::new(),
        }
    }

    /// Queue a response built at run time after the canned ones
    pub(crate) fn push_response(&mut self, frame: impl Into<Bytes>) {
        self.responses.push_back(frame.into());
    }
}

impl CardTransport for MockTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.commands.push(Bytes::copy_from_slice(command));
        self.responses.pop_front().ok_or(TransportError::Transmission)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Deterministic "random" source cycling over fixed bytes
#[derive(Debug, Clone)]
pub(crate) struct FixedRng {
    bytes: Vec<u8>,
    pos: usize,
}

impl FixedRng {
    pub(crate) fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            pos: 0,
        }
    }
}

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for byte in dst {
            *byte = self.bytes[self.pos % self.bytes.len()];
            self.pos += 1;
        }
    }
}
