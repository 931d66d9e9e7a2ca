//! Secure messaging over an authenticated session
//!
//! The messenger owns the transport and the session. Every exchange goes
//! through [`SecureMessenger::transceive`], which sends one frame, parses the
//! answer and drops the authentication whenever the card reports a status that
//! ends it on the card side. [`SecureMessenger::exchange`] layers the
//! per-command protection on top: CRC and encryption of the parameters, the
//! command CMAC that only advances the IV, the response CMAC and decryption
//! of the response.

use bytes::Bytes;
use nexum_desfire_core::{CardTransport, Command, FrameError, Response, Status};
use tracing::{debug, info, trace, warn};

use crate::{
    Error, IntegrityCheck, Result,
    config::DesfireConfig,
    crypto::{CbcDirection, CipherOp, CmacBuffer, TRUNCATED_MAC_LEN, crc32_le},
    session::Session,
};

/// CRC32 appended to enciphered parameters
const CRC_LEN: usize = 4;

/// Protection applied to one exchange
///
/// The flags combine freely; each is skipped where it makes no sense (no MAC
/// is computed outside a session, and never for additional frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protection {
    /// Append CRC32, pad and encipher the parameters
    pub encrypt_params: bool,
    /// Fold a CMAC over the command into the IV
    pub compute_send_mac: bool,
    /// Check the CMAC trailing a successful response
    pub verify_receive_mac: bool,
    /// Decipher the response payload
    pub decrypt_receive: bool,
}

impl Protection {
    /// Create a new protection set
    pub const fn new(
        encrypt_params: bool,
        compute_send_mac: bool,
        verify_receive_mac: bool,
        decrypt_receive: bool,
    ) -> Self {
        Self {
            encrypt_params,
            compute_send_mac,
            verify_receive_mac,
            decrypt_receive,
        }
    }

    /// No protection at all
    pub const fn none() -> Self {
        Self::new(false, false, false, false)
    }

    /// MAC the command into the IV and verify the response MAC
    pub const fn mac() -> Self {
        Self::new(false, true, true, false)
    }

    /// Only verify the response MAC
    pub const fn receive_mac() -> Self {
        Self::new(false, false, true, false)
    }

    /// Encipher the parameters and verify the response MAC
    pub const fn encrypted_command() -> Self {
        Self::new(true, false, true, false)
    }

    /// MAC the command into the IV and decipher the response
    pub const fn encrypted_response() -> Self {
        Self::new(false, true, false, true)
    }

    /// Whether the protection needs a session key
    pub const fn requires_session(&self) -> bool {
        self.encrypt_params || self.decrypt_receive
    }
}

/// Transport plus session, applying protection to every exchange
#[derive(Debug)]
pub struct SecureMessenger<T: CardTransport> {
    transport: T,
    session: Session,
    config: DesfireConfig,
    cmac_buffer: CmacBuffer,
}

impl<T: CardTransport> SecureMessenger<T> {
    /// Create a messenger with an unauthenticated session
    pub fn new(transport: T, config: DesfireConfig) -> Self {
        Self {
            transport,
            session: Session::new(),
            cmac_buffer: CmacBuffer::new(config.cmac_buffer_capacity),
            config,
        }
    }

    /// Get the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the mutable underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the messenger and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Current session
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable session
    pub const fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Active configuration
    pub const fn config(&self) -> &DesfireConfig {
        &self.config
    }

    /// Send one frame and parse the answer, without any protection
    ///
    /// Transport failures and statuses that end the card's authentication
    /// invalidate the session. The status itself is not turned into an error.
    pub fn transceive(&mut self, command: &Command) -> Result<Response> {
        let raw = command.to_bytes_checked(self.config.max_frame_size)?;

        let bytes = match self.transport.transmit_raw(&raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.session.invalidate();
                return Err(Error::Transport(e.into()));
            }
        };

        if bytes.len() > self.config.max_frame_size {
            self.session.invalidate();
            return Err(FrameError::too_large(self.config.max_frame_size, bytes.len()).into());
        }

        let response = match Response::from_bytes(&bytes) {
            Ok(response) => response,
            Err(e) => {
                self.session.invalidate();
                return Err(e.into());
            }
        };

        let status = response.status();
        log_status(command.opcode(), status);
        if !status.keeps_authentication() && self.session.is_authenticated() {
            warn!(%status, "Card status ends the authenticated session");
            self.session.invalidate();
        }

        Ok(response)
    }

    /// Exchange one frame with protection applied
    ///
    /// Returns the status (success, no changes or more frames) and the payload
    /// with any MAC stripped and any encryption removed. Payloads longer than
    /// `max_response` are rejected.
    pub fn exchange(
        &mut self,
        mut command: Command,
        protection: Protection,
        max_response: usize,
    ) -> Result<(Status, Bytes)> {
        if protection.requires_session() && !self.session.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }

        // size check precedes any change to the IV
        let limit = self.config.max_frame_size;
        let frame_len = self.protected_len(&command, protection)?;
        if frame_len > limit {
            return Err(FrameError::too_large(limit, frame_len).into());
        }

        if protection.encrypt_params {
            self.encrypt_params(&mut command)?;
        }

        if protection.compute_send_mac && !command.is_additional_frame() {
            self.fold_command_mac(&command)?;
        }

        let response = self.transceive(&command)?;
        let status = response.status();
        if !status.keeps_authentication() {
            return Err(Error::CardStatus(status));
        }

        let mut data = response.into_payload().to_vec();

        if protection.verify_receive_mac && self.session.is_authenticated() {
            self.verify_response_mac(&command, status, &mut data)?;
        }

        if data.len() > max_response {
            return Err(FrameError::too_large(max_response, data.len()).into());
        }

        if protection.decrypt_receive && !data.is_empty() {
            let key = self.session.key_mut().ok_or(Error::NotAuthenticated)?;
            key.cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut data)?;
            trace!(iv = %hex::encode(key.iv()), "Response deciphered");
        }

        Ok((status, Bytes::from(data)))
    }

    /// Exchange a command and follow additional frames until the card is done
    ///
    /// The terminal frame must carry success or no changes. The concatenated
    /// payload may not exceed `max_total` bytes.
    pub fn exchange_all(
        &mut self,
        command: Command,
        protection: Protection,
        max_total: usize,
    ) -> Result<Bytes> {
        let frame_limit = self.config.max_frame_size;
        let (mut status, first) = self.exchange(command, protection, frame_limit)?;
        let mut collected = first.to_vec();

        let continuation = Protection {
            encrypt_params: false,
            ..protection
        };
        while status.is_more_frames() {
            let (next_status, chunk) =
                self.exchange(Command::additional_frame(), continuation, frame_limit)?;
            collected.extend_from_slice(&chunk);
            if collected.len() > max_total {
                return Err(FrameError::too_large(max_total, collected.len()).into());
            }
            status = next_status;
        }

        if collected.len() > max_total {
            return Err(FrameError::too_large(max_total, collected.len()).into());
        }
        Ok(Bytes::from(collected))
    }

    /// Exchange a command that must complete in a single frame
    pub fn exchange_single(
        &mut self,
        command: Command,
        protection: Protection,
        max_response: usize,
    ) -> Result<Bytes> {
        let (status, data) = self.exchange(command, protection, max_response)?;
        if status.is_more_frames() {
            return Err(Error::Protocol("unexpected additional frame"));
        }
        Ok(data)
    }

    /// Wire length of `command` once its parameters are protected
    fn protected_len(&self, command: &Command, protection: Protection) -> Result<usize> {
        if !protection.encrypt_params {
            return Ok(command.len());
        }
        let key = self.session.key().ok_or(Error::NotAuthenticated)?;
        Ok(1 + command.header().len() + key.padded_len(command.params().len() + CRC_LEN))
    }

    fn encrypt_params(&mut self, command: &mut Command) -> Result<()> {
        let prefix = command.prefix();
        let key = self.session.key_mut().ok_or(Error::NotAuthenticated)?;

        let mut params = command.params().to_vec();
        params.extend_from_slice(&crc32_le(&[&prefix, command.params()]));
        params.resize(key.padded_len(params.len()), 0);

        trace!(iv = %hex::encode(key.iv()), "Enciphering parameters");
        key.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut params)?;
        command.set_params(params);
        Ok(())
    }

    fn fold_command_mac(&mut self, command: &Command) -> Result<()> {
        let Some(key) = self.session.key_mut() else {
            return Ok(());
        };
        self.cmac_buffer.clear();
        self.cmac_buffer.append(&command.prefix())?;
        self.cmac_buffer.append(command.params())?;
        let mac = self.cmac_buffer.compute(key)?;
        trace!(mac = %hex::encode(mac.as_bytes()), "Command CMAC");
        Ok(())
    }

    fn verify_response_mac(
        &mut self,
        command: &Command,
        status: Status,
        data: &mut Vec<u8>,
    ) -> Result<()> {
        if !command.is_additional_frame() {
            self.cmac_buffer.clear();
        }

        match status {
            Status::MoreFrames => self.cmac_buffer.append(data),
            Status::Success if data.len() >= TRUNCATED_MAC_LEN => {
                let received = data.split_off(data.len() - TRUNCATED_MAC_LEN);
                self.cmac_buffer.append(data)?;
                self.cmac_buffer.append(&[status.to_byte()])?;

                let key = self.session.key_mut().ok_or(Error::NotAuthenticated)?;
                let mac = self.cmac_buffer.compute(key)?;
                if mac.truncated() != received.as_slice() {
                    warn!(
                        expected = %hex::encode(mac.truncated()),
                        received = %hex::encode(&received),
                        "Response CMAC mismatch"
                    );
                    self.session.invalidate();
                    return Err(Error::Integrity(IntegrityCheck::Cmac));
                }
                trace!("Response CMAC verified");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn log_status(opcode: u8, status: Status) {
    let level = status.tracing_level();
    if level == tracing::Level::DEBUG {
        debug!(opcode = format_args!("{opcode:#04x}"), %status, "Card status");
    } else if level == tracing::Level::INFO {
        info!(opcode = format_args!("{opcode:#04x}"), %status, "Card status");
    } else {
        warn!(opcode = format_args!("{opcode:#04x}"), %status, "Card status");
    }
}
