// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The phone app: its half of the transfer protocol and of each handshake.

use std::collections::VecDeque;

use auth_protocol::{chunk, chunk_count, opcode, place_chunk, AckCode, CommandCode, Frame};
use auth_scheduler::keys::{self, LTMK_LEN};
use auth_scheduler::{Crypto, Procedure, SoftCrypto};
use consts::{CHUNK_SIZE, FRAME_SIZE, PAIR_CODE_LEN};
use log::{debug, info, warn};

use crate::credentials::{self, Credentials};
use crate::element;

/// Polls without a data frame before a download asks for its first missing chunk.
const STALL_POLLS: u32 = 32;

/// Polls to wait before announcing again after the device cancelled.
const RETRY_POLLS: u32 = 16;

const INFO_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Announce,
    Backoff(u32),
    AwaitAck,
    AwaitResult,
}

#[derive(Debug)]
struct Upload {
    cmd: CommandCode,
    data: Vec<u8>,
    state: UploadState,
}

#[derive(Debug)]
struct Download {
    cmd: CommandCode,
    chunks: u16,
    data: Vec<u8>,
    received: Vec<bool>,
    len: usize,
    /// Set once the last chunk arrived or the transfer stalled.
    tail_seen: bool,
    idle: u32,
}

impl Download {
    fn new(cmd: CommandCode, chunks: u16) -> Self {
        Self {
            cmd,
            chunks,
            data: vec![0; usize::from(chunks) * CHUNK_SIZE],
            received: vec![false; usize::from(chunks)],
            len: 0,
            tail_seen: false,
            idle: 0,
        }
    }

    fn missing(&self) -> Option<u16> {
        self.received
            .iter()
            .position(|&got| !got)
            .map(|i| i as u16 + 1)
    }
}

/// Phone side of a handshake.
///
/// Frames for the device collect in an outbox the simulation drains after
/// every tick. Device frames arrive through [`Peer::on_frame`].
#[derive(Debug)]
pub struct Peer {
    pair_code: [u8; PAIR_CODE_LEN],
    handshakes: u32,
    app_pub: [u8; 64],
    /// Set once the device confirmed a registration.
    pub credentials: Option<Credentials>,
    /// Seconds a capability stays valid, counted from the start of the login.
    pub capability_lifetime: i64,
    pub key_id: u32,
    /// Chunk withheld once from the next upload.
    pub drop_upload: Option<u16>,
    /// Chunk ignored once in the next download.
    pub drop_download: Option<u16>,
    /// Start procedures without uploading anything.
    pub silent: bool,
    procedure: Option<Procedure>,
    started_at: u32,
    status: Option<u32>,
    statuses: Vec<u32>,
    uploads: VecDeque<(CommandCode, Vec<u8>)>,
    upload: Option<Upload>,
    download: Option<Download>,
    downloads: Vec<(CommandCode, Vec<u8>)>,
    dev_pub: Option<[u8; 64]>,
    device_id: [u8; 8],
    pending: Option<Credentials>,
    lost_reported: Vec<u16>,
    lost_requested: Vec<u16>,
    outbox: VecDeque<Vec<u8>>,
}

impl Peer {
    pub fn new(pair_code: [u8; PAIR_CODE_LEN]) -> Self {
        Self {
            pair_code,
            handshakes: 0,
            app_pub: [0; 64],
            credentials: None,
            capability_lifetime: 3_600,
            key_id: 7,
            drop_upload: None,
            drop_download: None,
            silent: false,
            procedure: None,
            started_at: 0,
            status: None,
            statuses: Vec::new(),
            uploads: VecDeque::new(),
            upload: None,
            download: None,
            downloads: Vec::new(),
            dev_pub: None,
            device_id: [0; 8],
            pending: None,
            lost_reported: Vec::new(),
            lost_requested: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Writes the start code of `procedure` and queues the phone's first upload.
    pub fn begin(&mut self, procedure: Procedure, unix_time: u32) {
        info!("phone: starting {:?}", procedure);
        self.procedure = Some(procedure);
        self.started_at = unix_time;
        self.status = Some(procedure.code());
        self.statuses.clear();
        self.uploads.clear();
        self.upload = None;
        self.download = None;
        self.downloads.clear();
        self.dev_pub = None;
        self.pending = None;
        self.lost_reported.clear();
        self.lost_requested.clear();
        self.outbox.clear();

        self.handshakes += 1;
        self.app_pub = element::public_key(&self.handshakes.to_le_bytes());
        let handshake = matches!(
            procedure,
            Procedure::Registration | Procedure::AdminLogin | Procedure::SharedLogin { .. }
        );
        if handshake && !self.silent {
            self.uploads.push_back((CommandCode::DevPubkey, self.app_pub.to_vec()));
        }
    }

    /// Value last written to the status characteristic.
    pub fn status(&self) -> Option<u32> {
        self.status
    }

    /// Codes the device wrote to the status characteristic.
    pub fn statuses(&self) -> &[u32] {
        &self.statuses
    }

    /// Artifacts downloaded from the device during the current procedure.
    pub fn downloads(&self) -> &[(CommandCode, Vec<u8>)] {
        &self.downloads
    }

    /// Chunks the device reported lost.
    pub fn lost_reported(&self) -> &[u16] {
        &self.lost_reported
    }

    /// Chunks the phone asked the device to resend.
    pub fn lost_requested(&self) -> &[u16] {
        &self.lost_requested
    }

    pub fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain(..).collect()
    }

    /// Handles a status code written by the device.
    pub fn on_status(&mut self, code: u32) {
        debug!("phone: device status {:#x}", code);
        self.statuses.push(code);
        if code == opcode::REG_SUCCESS {
            if let Some(credentials) = self.pending.take() {
                info!("phone: registered {:02x?}", credentials.device_id);
                self.credentials = Some(credentials);
            }
        }
    }

    /// Handles one notification from the device.
    pub fn on_frame(&mut self, bytes: &[u8]) {
        match Frame::decode(bytes) {
            Ok(Frame::Command { cmd, chunks }) => self.on_command(cmd, chunks),
            Ok(Frame::Ack { ack, sn }) => self.on_ack(ack, sn),
            Ok(Frame::Data { sn, payload }) => self.on_data(sn, payload),
            Err(err) => warn!("phone: undecodable frame: {}", err),
        }
    }

    /// Advances timers and starts the next upload. Called once per tick.
    pub fn poll(&mut self) {
        if self.upload.is_none() {
            if let Some((cmd, data)) = self.uploads.pop_front() {
                self.upload = Some(Upload {
                    cmd,
                    data,
                    state: UploadState::Announce,
                });
            }
        }

        let announce = match &mut self.upload {
            Some(upload) => match upload.state {
                UploadState::Announce => {
                    upload.state = UploadState::AwaitAck;
                    Some((upload.cmd, chunk_count(upload.data.len())))
                }
                UploadState::Backoff(0) => {
                    upload.state = UploadState::Announce;
                    None
                }
                UploadState::Backoff(left) => {
                    upload.state = UploadState::Backoff(left - 1);
                    None
                }
                _ => None,
            },
            None => None,
        };
        if let Some((cmd, chunks)) = announce {
            debug!("phone: announcing {:?} in {} chunks", cmd, chunks);
            self.push(Frame::Command { cmd, chunks });
        }

        let stalled = match &mut self.download {
            Some(download) => {
                download.idle += 1;
                if download.idle > STALL_POLLS {
                    download.idle = 0;
                    download.tail_seen = true;
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if stalled {
            self.check_download();
        }
    }

    fn push(&mut self, frame: Frame<'_>) {
        let mut buf = [0; FRAME_SIZE];
        match frame.encode(&mut buf) {
            Ok(len) => self.outbox.push_back(buf[..len].to_vec()),
            Err(err) => warn!("phone: cannot encode frame: {}", err),
        }
    }

    fn ack(&mut self, ack: AckCode, sn: u16) {
        self.push(Frame::Ack { ack, sn });
    }

    fn send_chunk(&mut self, data: &[u8], sn: u16) {
        if let Some(payload) = chunk(data, sn) {
            let payload = payload.to_vec();
            self.push(Frame::Data {
                sn,
                payload: &payload,
            });
        }
    }

    fn on_command(&mut self, cmd: CommandCode, chunks: u16) {
        debug!("phone: device announces {:?} in {} chunks", cmd, chunks);
        self.ack(AckCode::Ready, 0);
        if chunks == 0 {
            self.ack(AckCode::Success, 0);
            self.on_download(cmd, Vec::new());
            return;
        }
        self.download = Some(Download::new(cmd, chunks));
    }

    fn on_ack(&mut self, ack: AckCode, sn: u16) {
        let Some(upload) = self.upload.as_mut() else {
            warn!("phone: {:?} with nothing uploading", ack);
            return;
        };
        match ack {
            AckCode::Ready => {
                upload.state = UploadState::AwaitResult;
                let data = upload.data.clone();
                let withheld = self.drop_upload.take();
                for sn in 1..=chunk_count(data.len()) {
                    if withheld == Some(sn) {
                        debug!("phone: withholding chunk {}", sn);
                        continue;
                    }
                    self.send_chunk(&data, sn);
                }
            }
            AckCode::Lost => {
                self.lost_reported.push(sn);
                let data = upload.data.clone();
                self.send_chunk(&data, sn);
            }
            AckCode::Success => {
                debug!("phone: {:?} delivered", upload.cmd);
                self.upload = None;
            }
            AckCode::Busy | AckCode::Timeout | AckCode::Cancel => {
                warn!("phone: device answered {:?} to {:?}", ack, upload.cmd);
                upload.state = UploadState::Backoff(RETRY_POLLS);
            }
        }
    }

    fn on_data(&mut self, sn: u16, payload: &[u8]) {
        let Some(download) = self.download.as_mut() else {
            warn!("phone: chunk {} with nothing downloading", sn);
            return;
        };
        if sn == 0 || sn > download.chunks {
            warn!("phone: chunk {} out of range", sn);
            return;
        }
        if self.drop_download == Some(sn) {
            self.drop_download = None;
            debug!("phone: ignoring chunk {}", sn);
            return;
        }
        match place_chunk(&mut download.data, sn, payload) {
            Ok(len) => {
                let end = usize::from(sn - 1) * CHUNK_SIZE + len;
                download.len = download.len.max(end);
                download.received[usize::from(sn - 1)] = true;
                download.idle = 0;
            }
            Err(err) => {
                warn!("phone: chunk {}: {}", sn, err);
                return;
            }
        }
        if sn == download.chunks {
            download.tail_seen = true;
        }
        if download.tail_seen {
            self.check_download();
        }
    }

    fn check_download(&mut self) {
        let Some(download) = self.download.as_ref() else {
            return;
        };
        if let Some(sn) = download.missing() {
            warn!("phone: {:?} chunk {} missing", download.cmd, sn);
            self.lost_requested.push(sn);
            self.ack(AckCode::Lost, sn);
            return;
        }
        self.ack(AckCode::Success, 0);
        if let Some(mut download) = self.download.take() {
            download.data.truncate(download.len);
            self.on_download(download.cmd, download.data);
        }
    }

    fn on_download(&mut self, cmd: CommandCode, data: Vec<u8>) {
        debug!("phone: received {:?}, {} bytes", cmd, data.len());
        self.downloads.push((cmd, data.clone()));
        let Some(procedure) = self.procedure else {
            return;
        };

        match cmd {
            CommandCode::DevPubkey => {
                // Registration sends the info record ahead of the key.
                let key = if procedure == Procedure::Registration {
                    if let Some(id) = data.get(..8) {
                        self.device_id.copy_from_slice(id);
                    }
                    data.get(INFO_LEN..)
                } else {
                    Some(&data[..])
                };
                let Some(key) = key.filter(|key| key.len() == 64) else {
                    warn!("phone: device key has {} bytes", data.len());
                    return;
                };
                let mut dev_pub = [0; 64];
                dev_pub.copy_from_slice(key);
                self.dev_pub = Some(dev_pub);
                if procedure == Procedure::AdminLogin {
                    self.send_login(&dev_pub);
                }
            }
            CommandCode::DevSignature => {
                let Some(dev_pub) = self.dev_pub else {
                    warn!("phone: signature before device key");
                    return;
                };
                match procedure {
                    Procedure::Registration => self.confirm_registration(&dev_pub, &data),
                    Procedure::SharedLogin { .. } => self.send_share(&dev_pub, &data),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn eph_key(&self, dev_pub: &[u8; 64]) -> [u8; 32] {
        element::shared_secret(&self.app_pub, dev_pub)
    }

    /// Checks that the device signed the long-term key the phone derived
    /// from the same pairing code.
    fn confirm_registration(&mut self, dev_pub: &[u8; 64], signature: &[u8]) {
        let ltmk = keys::derive_long_term_key(&SoftCrypto, &self.eph_key(dev_pub), &self.pair_code);
        let digest = SoftCrypto.sha256(&ltmk);
        if element::verify(dev_pub, &digest, signature) {
            info!("phone: pairing code confirmed");
            self.pending = Some(Credentials {
                device_id: self.device_id,
                ltmk,
            });
            self.status = Some(opcode::REG_VERIFY_SUCC);
        } else {
            warn!("phone: device signed a different key");
            self.status = Some(opcode::REG_VERIFY_FAIL);
        }
    }

    fn send_login(&mut self, dev_pub: &[u8; 64]) {
        let ltmk = match &self.credentials {
            Some(credentials) => credentials.ltmk,
            None => {
                warn!("phone: not registered, sending a login the device will reject");
                [0; LTMK_LEN]
            }
        };
        let blob = credentials::login_blob(&self.eph_key(dev_pub), &ltmk, dev_pub);
        self.uploads.push_back((CommandCode::DevLoginInfo, blob));
    }

    fn send_share(&mut self, dev_pub: &[u8; 64], signature: &[u8]) {
        if !element::verify(dev_pub, &SoftCrypto.sha256(dev_pub), signature) {
            warn!("phone: device signature does not check, abandoning");
            return;
        }
        let Some(owner) = self.credentials else {
            warn!("phone: no capability to present");
            return;
        };
        let expire_time = (i64::from(self.started_at) + self.capability_lifetime)
            .clamp(0, i64::from(u32::MAX)) as u32;
        let capability = credentials::capability(&owner, self.key_id, expire_time);
        let blob = credentials::share_blob(&self.eph_key(dev_pub), &capability);
        self.uploads.push_back((CommandCode::DevShareInfo, blob));
    }
}
