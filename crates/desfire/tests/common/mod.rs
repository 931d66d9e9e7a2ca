//! Simulated card for the integration tests
//!
//! Runs the card side of authentication, command MACs, enciphered parameters,
//! response MACs, continuation frames and key changes, so the host side can be
//! exercised end to end without a reader.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use nexum_desfire::{
    CbcDirection, CipherKey, CipherOp, KeyVariant, Status,
    crypto::{crc32, crc32_le},
};
use nexum_desfire_core::{CardTransport, TransportError};

/// Real UID of the simulated card
pub const UID: [u8; 7] = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

/// Free memory reported by the simulated card
pub const FREE_MEMORY: u32 = 0x1F00;

/// Application payload bytes per continuation frame
const APPLICATION_IDS_PER_FRAME: usize = 5;

const AF: u8 = 0xAF;

type CardResult = Result<Vec<u8>, Status>;

/// Initialise logging once for the test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
struct Application {
    settings: u8,
    key_type: u8,
    keys: Vec<CipherKey>,
    files: BTreeMap<u8, File>,
}

#[derive(Debug)]
struct File {
    permissions: u16,
    data: Vec<u8>,
}

#[derive(Debug)]
struct CardSession {
    slot: u8,
    key: CipherKey,
}

#[derive(Debug)]
struct PendingAuth {
    slot: u8,
    key: CipherKey,
    rnd_b: Vec<u8>,
}

/// Card side of the protocol behind a [`CardTransport`]
#[derive(Debug)]
pub struct SimulatedCard {
    applications: BTreeMap<u32, Application>,
    selected: u32,
    session: Option<CardSession>,
    pending_auth: Option<PendingAuth>,
    pending_frames: VecDeque<Vec<u8>>,
    random_counter: u8,
    random_id: bool,
    /// Status to answer the next command with
    pub fail_next: Option<Status>,
    /// Flip a bit in the next response MAC
    pub corrupt_next_mac: bool,
    /// Pretend the card left the field
    pub removed: bool,
    /// Every frame received, in order
    pub received: Vec<Vec<u8>>,
}

impl SimulatedCard {
    /// Fresh card whose card master key is `master_key`
    pub fn new(master_key: CipherKey) -> Self {
        let mut applications = BTreeMap::new();
        applications.insert(
            0,
            Application {
                settings: 0x0F,
                key_type: master_key.variant().key_type_code(),
                keys: vec![master_key],
                files: BTreeMap::new(),
            },
        );
        Self {
            applications,
            selected: 0,
            session: None,
            pending_auth: None,
            pending_frames: VecDeque::new(),
            random_counter: 0x40,
            random_id: false,
            fail_next: None,
            corrupt_next_mac: false,
            removed: false,
            received: Vec::new(),
        }
    }

    /// Fresh card with the factory single DES zero key
    pub fn factory() -> Self {
        Self::new(CipherKey::zeroed(KeyVariant::SimpleDes).expect("zero key"))
    }

    /// Whether the card holds an authenticated session
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Whether random ID mode was switched on
    pub fn random_id_enabled(&self) -> bool {
        self.random_id
    }

    /// Contents of a file in the selected application
    pub fn file_data(&self, file: u8) -> Option<&[u8]> {
        self.applications
            .get(&self.selected)?
            .files
            .get(&file)
            .map(|f| f.data.as_slice())
    }

    fn process(&mut self, frame: &[u8]) -> CardResult {
        let (&opcode, body) = frame.split_first().ok_or(Status::LengthError)?;
        if let Some(status) = self.fail_next.take() {
            return Err(status);
        }

        if opcode == AF {
            if let Some(pending) = self.pending_auth.take() {
                return self.finish_authentication(pending, body);
            }
            return self.pending_frames.pop_front().ok_or(Status::IllegalCommand);
        }
        self.pending_frames.clear();
        self.pending_auth = None;

        match opcode {
            0x1A | 0xAA => self.start_authentication(opcode, body),
            0x5A => self.select_application(body),
            0xC4 => self.change_key(body),
            0x54 => {
                let plain = self.decipher_params(&[opcode], body, 1)?;
                self.application_mut()?.settings = plain[0];
                self.respond(&[])
            }
            0x5C => {
                let (&option, enciphered) = body.split_first().ok_or(Status::LengthError)?;
                let plain = self.decipher_params(&[opcode, option], enciphered, 1)?;
                if plain[0] & 0x02 != 0 {
                    self.random_id = true;
                }
                self.respond(&[])
            }
            _ => {
                if let Some(session) = self.session.as_mut() {
                    session
                        .key
                        .calculate_cmac(frame)
                        .map_err(|_| Status::IntegrityError)?;
                }
                self.dispatch(opcode, body)
            }
        }
    }

    fn dispatch(&mut self, opcode: u8, body: &[u8]) -> CardResult {
        match opcode {
            0x64 => {
                let slot = *body.first().ok_or(Status::LengthError)?;
                let version = self.key(slot)?.version();
                self.respond(&[version])
            }
            0x45 => {
                let app = self.application()?;
                let count = if self.selected == 0 { 1 } else { app.keys.len() as u8 };
                let answer = [app.settings, count | app.key_type];
                self.respond(&answer)
            }
            0x60 => {
                let mut version = Vec::with_capacity(28);
                version.extend_from_slice(&[0x04, 0x01, 0x01, 0x01, 0x00, 0x18, 0x05]);
                version.extend_from_slice(&[0x04, 0x01, 0x01, 0x01, 0x04, 0x18, 0x05]);
                version.extend_from_slice(&UID);
                version.extend_from_slice(&[0xBA, 0x54, 0x41, 0x10, 0x20, 0x13, 0x19]);
                self.respond_frames(&version, &[7, 7, 14])
            }
            0x6E => {
                let [a, b, c, _] = FREE_MEMORY.to_le_bytes();
                self.respond(&[a, b, c])
            }
            0xFC => {
                self.applications.retain(|&aid, _| aid == 0);
                self.respond(&[])
            }
            0x51 => self.respond_enciphered(&UID),
            0x6A => {
                let ids: Vec<u8> = self
                    .applications
                    .keys()
                    .filter(|&&aid| aid != 0)
                    .flat_map(|aid| aid.to_le_bytes()[..3].to_vec())
                    .collect();
                let sizes: Vec<usize> = ids
                    .chunks(APPLICATION_IDS_PER_FRAME * 3)
                    .map(<[u8]>::len)
                    .collect();
                self.respond_frames(&ids, &sizes)
            }
            0xCA => self.create_application(body),
            0xDA => {
                let aid = aid(body)?;
                self.applications.remove(&aid).ok_or(Status::ApplicationNotFound)?;
                self.respond(&[])
            }
            0x6F => {
                let ids: Vec<u8> = self.application()?.files.keys().copied().collect();
                self.respond(&ids)
            }
            0xF5 => {
                let id = *body.first().ok_or(Status::LengthError)?;
                let file = self.file(id)?;
                let mut answer = vec![0x00, 0x00];
                answer.extend_from_slice(&file.permissions.to_le_bytes());
                answer.extend_from_slice(&(file.data.len() as u32).to_le_bytes()[..3]);
                self.respond(&answer)
            }
            0xCD => {
                if body.len() != 7 {
                    return Err(Status::LengthError);
                }
                let app = self.application_mut()?;
                if app.files.contains_key(&body[0]) {
                    return Err(Status::DuplicateError);
                }
                app.files.insert(
                    body[0],
                    File {
                        permissions: u16::from_le_bytes([body[2], body[3]]),
                        data: vec![0; u24(&body[4..7]) as usize],
                    },
                );
                self.respond(&[])
            }
            0xDF => {
                let id = *body.first().ok_or(Status::LengthError)?;
                self.application_mut()?
                    .files
                    .remove(&id)
                    .ok_or(Status::FileNotFound)?;
                self.respond(&[])
            }
            0xBD => {
                if body.len() != 7 {
                    return Err(Status::LengthError);
                }
                let (offset, len) = (u24(&body[1..4]) as usize, u24(&body[4..7]) as usize);
                let data = &self.file(body[0])?.data;
                let chunk = data
                    .get(offset..offset + len)
                    .ok_or(Status::BoundaryError)?
                    .to_vec();
                self.respond(&chunk)
            }
            0x3D => {
                if body.len() < 7 {
                    return Err(Status::LengthError);
                }
                let (offset, len) = (u24(&body[1..4]) as usize, u24(&body[4..7]) as usize);
                let payload = &body[7..];
                if payload.len() != len {
                    return Err(Status::LengthError);
                }
                let file = self
                    .application_mut()?
                    .files
                    .get_mut(&body[0])
                    .ok_or(Status::FileNotFound)?;
                file.data
                    .get_mut(offset..offset + len)
                    .ok_or(Status::BoundaryError)?
                    .copy_from_slice(payload);
                self.respond(&[])
            }
            _ => Err(Status::IllegalCommand),
        }
    }

    fn start_authentication(&mut self, opcode: u8, body: &[u8]) -> CardResult {
        self.session = None;
        let slot = *body.first().ok_or(Status::LengthError)?;
        let mut key = self.key(slot)?.clone();
        if key.variant().authenticate_opcode() != opcode {
            return Err(Status::AuthenticationError);
        }

        key.clear_iv();
        let mut rnd_b = vec![0u8; key.variant().random_size()];
        for byte in &mut rnd_b {
            self.random_counter = self.random_counter.wrapping_add(1);
            *byte = self.random_counter;
        }

        let mut challenge = rnd_b.clone();
        key.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut challenge)
            .map_err(|_| Status::IntegrityError)?;
        self.pending_auth = Some(PendingAuth { slot, key, rnd_b });

        let mut frame = vec![AF];
        frame.extend_from_slice(&challenge);
        Ok(frame)
    }

    fn finish_authentication(&mut self, pending: PendingAuth, body: &[u8]) -> CardResult {
        let PendingAuth {
            slot,
            mut key,
            rnd_b,
        } = pending;
        let random_len = rnd_b.len();
        if body.len() != 2 * random_len {
            return Err(Status::LengthError);
        }

        let mut token = body.to_vec();
        key.cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut token)
            .map_err(|_| Status::IntegrityError)?;
        let (rnd_a, rotated_b) = token.split_at(random_len);
        if rotated_b != rotate_left(&rnd_b) {
            return Err(Status::AuthenticationError);
        }

        let mut proof = rotate_left(rnd_a);
        key.cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut proof)
            .map_err(|_| Status::IntegrityError)?;

        let session_key = derive_session_key(key.variant(), rnd_a, &rnd_b);
        self.session = Some(CardSession {
            slot,
            key: session_key,
        });

        let mut frame = vec![0x00];
        frame.extend_from_slice(&proof);
        Ok(frame)
    }

    fn select_application(&mut self, body: &[u8]) -> CardResult {
        let aid = aid(body)?;
        self.session = None;
        if !self.applications.contains_key(&aid) {
            return Err(Status::ApplicationNotFound);
        }
        self.selected = aid;
        Ok(vec![0x00])
    }

    fn create_application(&mut self, body: &[u8]) -> CardResult {
        if body.len() != 5 {
            return Err(Status::LengthError);
        }
        let aid = aid(body)?;
        if self.applications.contains_key(&aid) {
            return Err(Status::DuplicateError);
        }
        let key_type = body[4] & 0xF0;
        let variant = match key_type {
            0x00 => KeyVariant::SimpleDes,
            0x40 => KeyVariant::ThreeKeyTripleDes,
            0x80 => KeyVariant::Aes128,
            _ => return Err(Status::ParameterError),
        };
        let count = usize::from(body[4] & 0x0F);
        let keys = (0..count)
            .map(|_| CipherKey::zeroed(variant).map_err(|_| Status::ParameterError))
            .collect::<Result<Vec<_>, _>>()?;
        self.applications.insert(
            aid,
            Application {
                settings: body[3],
                key_type,
                keys,
                files: BTreeMap::new(),
            },
        );
        self.respond(&[])
    }

    fn change_key(&mut self, body: &[u8]) -> CardResult {
        let (&slot_byte, enciphered) = body.split_first().ok_or(Status::LengthError)?;
        let slot = slot_byte & 0x0F;
        let picc = self.selected == 0;

        let key_type = if picc {
            slot_byte & 0xC0
        } else {
            self.application()?.key_type
        };
        let key_len = if key_type == 0x40 { 24 } else { 16 };
        let data_len = key_len + usize::from(key_type == 0x80);

        let session = self.session.as_mut().ok_or(Status::AuthenticationError)?;
        let same_slot = session.slot == slot;
        let mut plain = enciphered.to_vec();
        session
            .key
            .cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut plain)
            .map_err(|_| Status::LengthError)?;

        let needed = data_len + if same_slot { 4 } else { 8 };
        if plain.len() < needed {
            return Err(Status::LengthError);
        }
        let crc = crc32_le(&[&[0xC4, slot_byte], &plain[..data_len]]);
        if crc != plain[data_len..data_len + 4] {
            return Err(Status::IntegrityError);
        }

        let mut new_bytes = plain[..key_len].to_vec();
        if !same_slot {
            let current = self.key(slot)?;
            for (byte, current) in new_bytes.iter_mut().zip(current.key_bytes()) {
                *byte ^= current;
            }
            if crc32_le(&[&new_bytes]) != plain[data_len + 4..data_len + 8] {
                return Err(Status::IntegrityError);
            }
        }

        let new_key = match key_type {
            0x80 => CipherKey::new(KeyVariant::Aes128, &new_bytes, plain[16]),
            0x40 => CipherKey::new(KeyVariant::ThreeKeyTripleDes, &new_bytes, des_version(&new_bytes)),
            _ if new_bytes[..8] == new_bytes[8..16] => {
                CipherKey::new(KeyVariant::SimpleDes, &new_bytes[..8], des_version(&new_bytes))
            }
            _ => CipherKey::new(KeyVariant::TwoKeyTripleDes, &new_bytes, des_version(&new_bytes)),
        }
        .map_err(|_| Status::ParameterError)?;

        let app = self.application_mut()?;
        if picc {
            app.key_type = key_type;
        }
        *app.keys.get_mut(usize::from(slot)).ok_or(Status::NoSuchKey)? = new_key;

        if same_slot {
            self.session = None;
            return Ok(vec![0x00]);
        }
        self.respond(&[])
    }

    fn decipher_params(&mut self, prefix: &[u8], enciphered: &[u8], len: usize) -> CardResult {
        let session = self.session.as_mut().ok_or(Status::AuthenticationError)?;
        let mut plain = enciphered.to_vec();
        session
            .key
            .cbc_transform(CbcDirection::Receive, CipherOp::Decipher, &mut plain)
            .map_err(|_| Status::LengthError)?;
        if plain.len() < len + 4 || crc32_le(&[prefix, &plain[..len]]) != plain[len..len + 4] {
            return Err(Status::IntegrityError);
        }
        plain.truncate(len);
        Ok(plain)
    }

    /// Success with the payload, MAC-ed when a session is open
    fn respond(&mut self, payload: &[u8]) -> CardResult {
        let mut frame = vec![0x00];
        frame.extend_from_slice(payload);
        if let Some(mac) = self.response_mac(payload)? {
            frame.extend_from_slice(&mac);
        }
        Ok(frame)
    }

    /// Payload split over continuation frames, one MAC over all of it
    fn respond_frames(&mut self, payload: &[u8], sizes: &[usize]) -> CardResult {
        if sizes.len() <= 1 {
            return self.respond(payload);
        }
        let mac = self.response_mac(payload)?;

        let mut frames = Vec::with_capacity(sizes.len());
        let mut rest = payload;
        for (i, &size) in sizes.iter().enumerate() {
            let (chunk, tail) = rest.split_at(size);
            rest = tail;
            let last = i + 1 == sizes.len();
            let mut frame = vec![if last { 0x00 } else { AF }];
            frame.extend_from_slice(chunk);
            if last {
                if let Some(mac) = mac {
                    frame.extend_from_slice(&mac);
                }
            }
            frames.push(frame);
        }

        self.pending_frames = frames.into();
        self.pending_frames.pop_front().ok_or(Status::IllegalCommand)
    }

    /// Payload with CRC32 over payload and status, enciphered with the session key
    fn respond_enciphered(&mut self, payload: &[u8]) -> CardResult {
        let session = self.session.as_mut().ok_or(Status::AuthenticationError)?;
        let mut plain = payload.to_vec();
        plain.extend_from_slice(&crc32_le(&[payload, &[0x00]]));
        plain.resize(session.key.padded_len(plain.len()), 0);
        session
            .key
            .cbc_transform(CbcDirection::Send, CipherOp::Encipher, &mut plain)
            .map_err(|_| Status::IntegrityError)?;

        let mut frame = vec![0x00];
        frame.extend_from_slice(&plain);
        Ok(frame)
    }

    fn response_mac(&mut self, payload: &[u8]) -> Result<Option<[u8; 8]>, Status> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let mut message = payload.to_vec();
        message.push(0x00);
        let mut mac = session
            .key
            .calculate_cmac(&message)
            .map_err(|_| Status::IntegrityError)?
            .truncated();
        if std::mem::take(&mut self.corrupt_next_mac) {
            mac[0] ^= 0x01;
        }
        Ok(Some(mac))
    }

    fn application(&self) -> Result<&Application, Status> {
        self.applications
            .get(&self.selected)
            .ok_or(Status::ApplicationNotFound)
    }

    fn application_mut(&mut self) -> Result<&mut Application, Status> {
        self.applications
            .get_mut(&self.selected)
            .ok_or(Status::ApplicationNotFound)
    }

    fn key(&self, slot: u8) -> Result<&CipherKey, Status> {
        self.application()?
            .keys
            .get(usize::from(slot))
            .ok_or(Status::NoSuchKey)
    }

    fn file(&self, id: u8) -> Result<&File, Status> {
        self.application()?.files.get(&id).ok_or(Status::FileNotFound)
    }
}

impl CardTransport for SimulatedCard {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        if self.removed {
            self.session = None;
            return Err(TransportError::CardRemoved);
        }
        self.received.push(command.to_vec());

        let frame = match self.process(command) {
            Ok(frame) => frame,
            Err(status) => {
                self.session = None;
                self.pending_auth = None;
                self.pending_frames.clear();
                vec![status.to_byte()]
            }
        };
        Ok(Bytes::from(frame))
    }

    fn is_connected(&self) -> bool {
        !self.removed
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.removed = false;
        self.session = None;
        self.pending_auth = None;
        self.pending_frames.clear();
        self.selected = 0;
        Ok(())
    }
}

fn aid(body: &[u8]) -> Result<u32, Status> {
    match body {
        [a, b, c, ..] => Ok(u32::from_le_bytes([*a, *b, *c, 0])),
        _ => Err(Status::LengthError),
    }
}

fn u24(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn des_version(key: &[u8]) -> u8 {
    key[..8]
        .iter()
        .fold(0, |version, byte| (version << 1) | (byte & 0x01))
}

/// Rotate left by one byte
pub fn rotate_left(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.rotate_left(1);
    out
}

/// Session key as the card derives it from both randoms
pub fn derive_session_key(variant: KeyVariant, rnd_a: &[u8], rnd_b: &[u8]) -> CipherKey {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&rnd_a[..4]);
    bytes.extend_from_slice(&rnd_b[..4]);
    let variant = match variant {
        KeyVariant::SimpleDes => {
            bytes.extend_from_slice(&rnd_a[..4]);
            bytes.extend_from_slice(&rnd_b[..4]);
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
    CipherKey::new(variant, &bytes, 0).expect("session key length")
}

/// CRC32 the card computes, exposed for assertions
pub fn card_crc(parts: &[&[u8]]) -> u32 {
    crc32(parts)
}
