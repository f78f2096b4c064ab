// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Software secure element behind the command bus.
//!
//! Key agreement and signatures are stand-ins built from SHA-256: both sides
//! of a handshake get the same secret from the two public keys, and anyone
//! holding the public key can check a signature. That is enough to exercise
//! every path of the scheduler without real curve arithmetic.

use std::mem;

use auth_protocol::msc::{self, Opcode};
use auth_scheduler::{BusError, CommandBus, Crypto, SoftCrypto};
use consts::{MSC_ADDRESS, MSC_INVALID_PACKET};
use log::{debug, warn};

pub const STATUS_OK: u8 = 0x00;
/// Status of a command the element could not carry out.
pub const STATUS_FAILED: u8 = 0x10;
/// Status of a master key read with no key written.
pub const STATUS_NO_KEY: u8 = 0x05;

/// Element software version reported by the info command.
pub const SW_VERSION: [u8; 2] = [0x03, 0x02];

const INFO_LEN: usize = 26;
const DEV_CERT_LEN: usize = 300;
const MANU_CERT_LEN: usize = 420;

/// Public key belonging to `secret`.
pub fn public_key(secret: &[u8]) -> [u8; 64] {
    let mut key = [0; 64];
    let first = SoftCrypto.sha256(secret);
    key[..32].copy_from_slice(&first);
    key[32..].copy_from_slice(&SoftCrypto.sha256(&first));
    key
}

/// Secret shared by the owners of two public keys.
pub fn shared_secret(a: &[u8], b: &[u8]) -> [u8; 32] {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    SoftCrypto.sha256(&[low, high].concat())
}

pub fn sign(public_key: &[u8], digest: &[u8]) -> [u8; 64] {
    let mut signature = [0; 64];
    signature[..32].copy_from_slice(&SoftCrypto.sha256(&[public_key, digest].concat()));
    signature[32..].copy_from_slice(&SoftCrypto.sha256(&[digest, public_key].concat()));
    signature
}

pub fn verify(public_key: &[u8], digest: &[u8], signature: &[u8]) -> bool {
    sign(public_key, digest)[..] == *signature
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    Write,
    Read(usize),
}

#[derive(Debug)]
pub struct FakeElement {
    public_key: [u8; 64],
    dev_cert: Vec<u8>,
    manu_cert: Vec<u8>,
    /// Last master key packet written, slot byte included.
    mkpk: Option<Vec<u8>>,
    powered: bool,
    pending: Pending,
    /// Polls left before the pending transfer completes.
    latency: u32,
    /// Polls left before the ready line goes high.
    busy: u32,
    response: Option<Vec<u8>>,
    /// Every command it answers with [`STATUS_FAILED`].
    pub failing: Option<Opcode>,
    /// Number of upcoming responses read back with a bad checksum.
    pub corrupt_responses: u32,
    /// Commands executed, in order.
    pub commands: Vec<Opcode>,
    pub power_ups: u32,
}

impl FakeElement {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            public_key: public_key(secret),
            dev_cert: (0..DEV_CERT_LEN).map(|i| (i * 13 + 1) as u8).collect(),
            manu_cert: (0..MANU_CERT_LEN).map(|i| (i * 7 + 3) as u8).collect(),
            mkpk: None,
            powered: false,
            pending: Pending::Idle,
            latency: 0,
            busy: 0,
            response: None,
            failing: None,
            corrupt_responses: 0,
            commands: Vec::new(),
            power_ups: 0,
        }
    }

    pub fn public_key(&self) -> &[u8; 64] {
        &self.public_key
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Master key packet the device wrote, slot byte included.
    pub fn master_key(&self) -> Option<&[u8]> {
        self.mkpk.as_deref()
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.commands.iter().filter(|&&c| c == opcode).count()
    }

    fn execute(&mut self, opcode: Opcode, param: &[u8]) -> (u8, Vec<u8>) {
        match opcode {
            Opcode::Pubkey => (STATUS_OK, self.public_key.to_vec()),
            Opcode::Info => {
                let mut info = vec![0; INFO_LEN];
                info[..4].copy_from_slice(&[0x07, 0x00, 0x01, 0x00]);
                info[4..6].copy_from_slice(&SW_VERSION);
                (STATUS_OK, info)
            }
            Opcode::CertsLen => {
                let mut lengths = Vec::with_capacity(6);
                lengths.extend_from_slice(&(self.dev_cert.len() as u16).to_be_bytes());
                lengths.extend_from_slice(&(self.manu_cert.len() as u16).to_be_bytes());
                lengths.extend_from_slice(&0u16.to_be_bytes());
                (STATUS_OK, lengths)
            }
            Opcode::DevCert => (STATUS_OK, self.dev_cert.clone()),
            Opcode::ManuCert => (STATUS_OK, self.manu_cert.clone()),
            Opcode::Ecdhe if param.len() == 64 => {
                (STATUS_OK, shared_secret(&self.public_key, param).to_vec())
            }
            Opcode::Sign if param.len() == 32 => (STATUS_OK, sign(&self.public_key, param).to_vec()),
            Opcode::WriteMkpk if !param.is_empty() => {
                self.mkpk = Some(param.to_vec());
                (STATUS_OK, Vec::new())
            }
            Opcode::ReadMkpk => match &self.mkpk {
                Some(mkpk) => (STATUS_OK, mkpk[1..].to_vec()),
                None => (STATUS_NO_KEY, Vec::new()),
            },
            Opcode::Erase => {
                self.mkpk = None;
                (STATUS_OK, Vec::new())
            }
            _ => (MSC_INVALID_PACKET, Vec::new()),
        }
    }

    fn answer(&mut self, frame: &[u8]) -> Vec<u8> {
        let (status, payload) = match msc::decode_request(frame) {
            Ok((code, param)) => match Opcode::try_from(code) {
                Ok(opcode) => {
                    debug!("element: {:?} with {} byte parameter", opcode, param.len());
                    self.commands.push(opcode);
                    let (status, payload) = self.execute(opcode, param);
                    if self.failing == Some(opcode) {
                        (STATUS_FAILED, payload)
                    } else {
                        (status, payload)
                    }
                }
                Err(code) => {
                    warn!("element: unknown opcode {:#04x}", code);
                    (MSC_INVALID_PACKET, Vec::new())
                }
            },
            Err(err) => {
                warn!("element: bad request: {}", err);
                (MSC_INVALID_PACKET, Vec::new())
            }
        };

        let mut response = vec![0; msc::response_frame_len(payload.len())];
        if let Err(err) = msc::encode_response(status, &payload, &mut response) {
            warn!("element: cannot encode response: {}", err);
            response.clear();
        }
        response
    }
}

impl CommandBus for FakeElement {
    fn begin_write(&mut self, address: u8, frame: &[u8]) -> Result<(), BusError> {
        if address != MSC_ADDRESS || !self.powered {
            return Err(BusError::Nack);
        }
        if self.pending != Pending::Idle {
            return Err(BusError::Busy);
        }
        self.response = Some(self.answer(frame));
        self.pending = Pending::Write;
        self.latency = 1;
        self.busy = 1;
        Ok(())
    }

    fn begin_read(&mut self, address: u8, len: usize) -> Result<(), BusError> {
        if address != MSC_ADDRESS || !self.powered {
            return Err(BusError::Nack);
        }
        if self.pending != Pending::Idle {
            return Err(BusError::Busy);
        }
        self.pending = Pending::Read(len);
        self.latency = 1;
        Ok(())
    }

    fn poll_transfer(&mut self, rx: &mut [u8]) -> bool {
        if self.latency > 0 {
            self.latency -= 1;
            return false;
        }
        if let Pending::Read(len) = mem::replace(&mut self.pending, Pending::Idle) {
            rx.fill(0);
            if let Some(mut response) = self.response.take() {
                if self.corrupt_responses > 0 && !response.is_empty() {
                    self.corrupt_responses -= 1;
                    let last = response.len() - 1;
                    response[last] ^= 0xFF;
                }
                let n = response.len().min(rx.len()).min(len);
                rx[..n].copy_from_slice(&response[..n]);
            }
        }
        true
    }

    fn ready(&mut self) -> bool {
        if self.busy > 0 {
            self.busy -= 1;
            return false;
        }
        true
    }

    fn set_power(&mut self, on: bool) {
        if on && !self.powered {
            self.power_ups += 1;
        }
        if !on {
            self.pending = Pending::Idle;
            self.response = None;
            self.latency = 0;
            self.busy = 0;
        }
        self.powered = on;
    }
}
