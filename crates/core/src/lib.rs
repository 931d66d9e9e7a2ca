//! Core traits and types for DESFire native command exchange
//!
//! This crate provides the foundational types and traits for talking to a
//! DESFire-family contactless card using the native (unwrapped) command set.
//!
//! ## Overview
//!
//! A native command is a single opcode byte followed by an optional header and
//! parameter bytes. The card answers with a single status byte followed by the
//! payload. This crate provides abstractions for:
//!
//! - Building command frames and parsing response frames
//! - Communicating with cards through different transport layers
//! - Interpreting the status byte, including which outcomes keep a session alive
//!
//! Cryptography and session handling live in the `nexum-desfire` crate.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

mod error;
pub use error::FrameError;

pub use command::{Command, MAX_FRAME_SIZE, opcode};
pub use response::Response;
pub use response::status::Status;
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, FrameError, Response, Status, command::opcode,
        transport::{CardTransport, TransportError},
    };
}
