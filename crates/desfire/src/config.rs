//! Configuration options for the secure messenger

use nexum_desfire_core::MAX_FRAME_SIZE;

/// Bytes the write path reserves in each frame for the command header
const WRITE_CHUNK_OVERHEAD: usize = 8;

/// Default capacity of the response MAC accumulation buffer
pub const DEFAULT_CMAC_BUFFER_CAPACITY: usize = 256;

/// Default number of bytes requested per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 48;

/// Configuration options for talking to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesfireConfig {
    /// Largest frame sent to or accepted from the card
    pub max_frame_size: usize,

    /// Capacity of the buffer collecting MAC-covered response bytes
    pub cmac_buffer_capacity: usize,

    /// Bytes requested per read command
    pub read_chunk_size: usize,

    /// Bytes sent per write command
    pub write_chunk_size: usize,
}

impl Default for DesfireConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            cmac_buffer_capacity: DEFAULT_CMAC_BUFFER_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            write_chunk_size: MAX_FRAME_SIZE - WRITE_CHUNK_OVERHEAD,
        }
    }
}

impl DesfireConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum frame size; the write chunk follows it
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self.write_chunk_size = size.saturating_sub(WRITE_CHUNK_OVERHEAD);
        self
    }

    /// Set the MAC accumulation buffer capacity
    pub const fn with_cmac_buffer_capacity(mut self, capacity: usize) -> Self {
        self.cmac_buffer_capacity = capacity;
        self
    }

    /// Set the read chunk size
    pub const fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Set the write chunk size
    pub const fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }
}
