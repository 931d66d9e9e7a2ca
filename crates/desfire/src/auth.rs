//! Three-pass mutual authentication
//!
//! The card proves knowledge of the key by enciphering a random (RndB), the
//! host answers with its own random (RndA) followed by RndB rotated left by
//! one byte, and the card closes by returning RndA rotated the same way. Both
//! randoms then feed the session key.

use nexum_desfire_core::{CardTransport, Command, Status};
use rand::{RngCore, rngs::ThreadRng};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::{
    Error, Result,
    crypto::{
        CbcDirection, CipherKey, CipherOp, KeyVariant,
        key::{MAX_KEY_SIZE, rotate_left},
    },
    messenger::SecureMessenger,
};

/// Step of the authentication that went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum AuthStage {
    /// The card did not answer the authenticate command with its challenge
    #[display("challenge request")]
    ChallengeRequest,
    /// The card did not accept the host cryptogram
    #[display("challenge response")]
    ChallengeResponse,
    /// The card's proof of RndA did not match
    #[display("verification")]
    Verify,
}

/// Progress of an authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Nothing started
    #[default]
    Idle,
    /// The card's challenge has been received and deciphered
    ChallengeRequested,
    /// The card proved knowledge of the key
    ChallengeVerified,
    /// The session key is in place
    Authenticated,
    /// Authentication aborted
    Failed(AuthStage),
}

/// Drives the three-pass authentication against a card
#[derive(Debug)]
pub struct Authenticator<R: RngCore = ThreadRng> {
    rng: R,
    state: AuthState,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator {
    /// Create an authenticator drawing randoms from the thread RNG
    pub fn new() -> Self {
        Self::with_rng(rand::rng())
    }
}

impl<R: RngCore> Authenticator<R> {
    /// Create an authenticator with a custom random source
    pub const fn with_rng(rng: R) -> Self {
        Self {
            rng,
            state: AuthState::Idle,
        }
    }

    /// State reached by the last run
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Authenticate `slot` with `key`, installing the session key on success
    ///
    /// Any failure leaves the session unauthenticated. Transport errors are
    /// passed through unchanged, everything else is reported as
    /// [`Error::AuthenticationFailed`] with the stage that broke.
    pub fn authenticate<T: CardTransport>(
        &mut self,
        messenger: &mut SecureMessenger<T>,
        slot: u8,
        key: &CipherKey,
    ) -> Result<()> {
        messenger.session_mut().invalidate();
        self.state = AuthState::Idle;

        match self.run(messenger, slot, key) {
            Ok(session_key) => {
                messenger.session_mut().establish(slot, session_key);
                self.state = AuthState::Authenticated;
                debug!(slot, "Authentication succeeded");
                Ok(())
            }
            Err(e) => {
                let stage = match self.state {
                    AuthState::Idle => AuthStage::ChallengeRequest,
                    AuthState::ChallengeRequested => match e {
                        Error::AuthenticationFailed(stage) => stage,
                        _ => AuthStage::ChallengeResponse,
                    },
                    _ => AuthStage::Verify,
                };
                self.state = AuthState::Failed(stage);
                messenger.session_mut().invalidate();
                warn!(slot, %stage, error = %e, "Authentication failed");
                Err(e)
            }
        }
    }

    fn run<T: CardTransport>(
        &mut self,
        messenger: &mut SecureMessenger<T>,
        slot: u8,
        key: &CipherKey,
    ) -> Result<CipherKey> {
        let variant = key.variant();
        let random_len = variant.random_size();
        let mut key = key.clone();

        debug!(slot, %variant, "Requesting authentication challenge");
        let command = Command::new(variant.authenticate_opcode()).with_params([slot]);
        let response = messenger.transceive(&command)?;
        if response.status() != Status::MoreFrames || response.payload().len() != random_len {
            return Err(Error::AuthenticationFailed(AuthStage::ChallengeRequest));
        }

        key.clear_iv();
        let mut rnd_b = Zeroizing::new(response.payload().to_vec());
        key.cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut rnd_b)?;
        trace!(rnd_b = %hex::encode(&*rnd_b), "Challenge deciphered");
        self.state = AuthState::ChallengeRequested;

        let mut rnd_a = Zeroizing::new(vec![0u8; random_len]);
        self.rng.fill_bytes(&mut rnd_a);

        let mut token = Zeroizing::new(Vec::with_capacity(2 * random_len));
        token.extend_from_slice(&rnd_a);
        token.extend_from_slice(&rotate_left(&rnd_b));
        key.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut token)?;

        debug!("Sending host cryptogram");
        let response = messenger.transceive(&Command::additional_frame().with_params(&*token))?;
        if response.status() != Status::Success || response.payload().len() != random_len {
            return Err(Error::AuthenticationFailed(AuthStage::ChallengeResponse));
        }

        let mut proof = Zeroizing::new(response.payload().to_vec());
        key.cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut proof)?;
        if *proof != rotate_left(&rnd_a) {
            return Err(Error::AuthenticationFailed(AuthStage::Verify));
        }
        self.state = AuthState::ChallengeVerified;

        let (session_variant, bytes) = session_key_material(variant, &rnd_a, &rnd_b);
        CipherKey::new(session_variant, &bytes, 0)
    }
}

/// Session key bytes built from both randoms
///
/// A single DES authentication yields a two key triple DES session key with
/// both halves equal, which enciphers exactly like single DES.
fn session_key_material(
    variant: KeyVariant,
    rnd_a: &[u8],
    rnd_b: &[u8],
) -> (KeyVariant, Zeroizing<Vec<u8>>) {
    let mut bytes = Zeroizing::new(Vec::with_capacity(MAX_KEY_SIZE));
    bytes.extend_from_slice(&rnd_a[0..4]);
    bytes.extend_from_slice(&rnd_b[0..4]);

    let session_variant = match variant {
        KeyVariant::SimpleDes => {
            bytes.extend_from_within(0..8);
            KeyVariant::TwoKeyTripleDes
        }
        KeyVariant::TwoKeyTripleDes => {
            bytes.extend_from_slice(&rnd_a[4..8]);
            bytes.extend_from_slice(&rnd_b[4..8]);
            variant
        }
        KeyVariant::ThreeKeyTripleDes => {
            bytes.extend_from_slice(&rnd_a[6..10]);
            bytes.extend_from_slice(&rnd_b[6..10]);
            bytes.extend_from_slice(&rnd_a[12..16]);
            bytes.extend_from_slice(&rnd_b[12..16]);
            variant
        }
        KeyVariant::Aes128 => {
            bytes.extend_from_slice(&rnd_a[12..16]);
            bytes.extend_from_slice(&rnd_b[12..16]);
            variant
        }
    };
    (session_variant, bytes)
}
