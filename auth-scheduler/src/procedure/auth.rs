// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_protocol::msc::Opcode;
use auth_protocol::opcode;
use consts::PAIR_CODE_LEN;

use crate::artifacts::SHARE_INFO_LEN;
use crate::keys::{self, LTMK_LEN, MKPK_MAX_LEN, WRAPS_LTMK};
use crate::scheduler::Context;
use crate::{
    Artifact, Authorization, CapabilityError, Crypto, Exchange, KeyRecord, Platform,
    SchedulerEvent, Step, Thread,
};

/// Decides the outcome of a handshake.
pub(crate) enum AuthThread {
    Register(RegisterAuth),
    Admin(AdminAuth),
    Share(ShareAuth),
}

impl AuthThread {
    pub(crate) fn register() -> Self {
        Self::Register(RegisterAuth::new())
    }

    pub(crate) fn admin() -> Self {
        Self::Admin(AdminAuth { outcome: None })
    }

    pub(crate) fn share() -> Self {
        Self::Share(ShareAuth { outcome: None })
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for AuthThread {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        match self {
            Self::Register(thread) => thread.step(cx),
            Self::Admin(thread) => thread.step(cx),
            Self::Share(thread) => thread.step(cx),
        }
    }
}

/// Status code for the peer and the event it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outcome {
    code: u32,
    event: SchedulerEvent,
}

impl Outcome {
    const fn new(code: u32, event: SchedulerEvent) -> Self {
        Self { code, event }
    }

    /// Tells the peer, then reports the event. Blocks while the link is busy.
    fn deliver<P: Platform, C: Crypto>(self, cx: &mut Context<P, C>) -> Step {
        if !cx.announce(self.code) {
            return Step::Blocked;
        }
        cx.emit(self.event);
        Step::Done
    }
}

const REG_SUCCESS: Outcome = Outcome::new(opcode::REG_SUCCESS, SchedulerEvent::RegSuccess);
const REG_FAILED: Outcome = Outcome::new(opcode::REG_FAILED, SchedulerEvent::RegFailed);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegState {
    WaitHandshake,
    FlushInput,
    CollectCode,
    AwaitVerdict,
    PowerUp,
    WriteKey,
    Persist,
    Finish(Outcome),
}

/// Registration: pairing code, long-term key, confirmation and persistence.
pub(crate) struct RegisterAuth {
    state: RegState,
    code: [u8; PAIR_CODE_LEN],
    entered: usize,
    ltmk: [u8; LTMK_LEN],
    wrap_key: [u8; 16],
    exchange: Exchange,
}

impl RegisterAuth {
    fn new() -> Self {
        Self {
            state: RegState::WaitHandshake,
            code: [0; PAIR_CODE_LEN],
            entered: 0,
            ltmk: [0; LTMK_LEN],
            wrap_key: [0; 16],
            exchange: Exchange::new(),
        }
    }

    fn derive<P: Platform, C: Crypto>(&mut self, cx: &mut Context<P, C>) {
        self.ltmk = keys::derive_long_term_key(&cx.crypto, &cx.artifacts.eph_key, &self.code);
        cx.flags.set(Artifact::LTMK);
        cx.artifacts.dev_sha = cx.crypto.sha256(&self.ltmk);
        cx.flags.set(Artifact::DEV_SHA);
        self.code.fill(0);
    }

    fn persist<P: Platform, C: Crypto>(&mut self, cx: &mut Context<P, C>) -> Outcome {
        let cloud = keys::derive_cloud_keys(&cx.crypto, &self.ltmk);
        let record = KeyRecord::new(cx.artifacts.device_id(), &cloud, self.wrap_key);
        if let Err(err) = record.store(&mut cx.platform) {
            error!("storing key record failed: {}", err);
            return REG_FAILED;
        }
        cx.keys.registered = true;
        cx.keys.ltmk = Some(self.ltmk);
        cx.keys.record = Some(record);
        info!("registered");
        REG_SUCCESS
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for RegisterAuth {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        loop {
            match self.state {
                RegState::WaitHandshake => {
                    if !cx.certs_sent || !cx.flags.is_ready(Artifact::EPH_KEY) {
                        return Step::Blocked;
                    }
                    info!("waiting for pairing code");
                    self.state = RegState::FlushInput;
                }
                RegState::FlushInput => {
                    let mut stale = [0; PAIR_CODE_LEN];
                    if cx.platform.poll_input(&mut stale) > 0 {
                        return Step::Blocked;
                    }
                    self.entered = 0;
                    self.state = RegState::CollectCode;
                }
                RegState::CollectCode => {
                    let read = cx.platform.poll_input(&mut self.code[self.entered..]);
                    self.entered += read;
                    if self.entered < PAIR_CODE_LEN {
                        return Step::Blocked;
                    }
                    self.derive(cx);
                    self.state = RegState::AwaitVerdict;
                }
                RegState::AwaitVerdict
                    if !cx.flags.is_ready(Artifact::ENCRYPTED_REGISTRATION_BLOB) =>
                {
                    return Step::Blocked;
                }
                RegState::AwaitVerdict => match cx.platform.receive_status() {
                    None | Some(opcode::REG_START) => return Step::Blocked,
                    Some(opcode::REG_VERIFY_SUCC) => self.state = RegState::PowerUp,
                    Some(other) => {
                        error!("peer rejected registration with {:#x}", other);
                        self.state = RegState::Finish(REG_FAILED);
                    }
                },
                RegState::PowerUp => {
                    if WRAPS_LTMK && !cx.platform.fill_random(&mut self.wrap_key) {
                        return Step::Blocked;
                    }
                    let mut mkpk = [0; MKPK_MAX_LEN];
                    let wrap_key = WRAPS_LTMK.then_some(&self.wrap_key);
                    let len = keys::seal_master_key(&cx.crypto, &self.ltmk, wrap_key, &mut mkpk);
                    if let Err(err) = self.exchange.start(Opcode::WriteMkpk, &mkpk[..len], 0) {
                        cx.abort(err);
                        return Step::Done;
                    }
                    cx.platform.set_power(true);
                    self.state = RegState::WriteKey;
                    return Step::Blocked;
                }
                RegState::WriteKey => match self.exchange.poll(&mut cx.platform) {
                    Ok(Step::Blocked) => return Step::Blocked,
                    Ok(Step::Done) => {
                        cx.platform.set_power(false);
                        cx.flags.set(Artifact::MKPK);
                        self.state = RegState::Persist;
                    }
                    Err(err) => {
                        cx.abort(err);
                        return Step::Done;
                    }
                },
                RegState::Persist => self.state = RegState::Finish(self.persist(cx)),
                RegState::Finish(outcome) => return outcome.deliver(cx),
            }
        }
    }
}

/// Owner login: checks the login blob against the device public key.
pub(crate) struct AdminAuth {
    outcome: Option<Outcome>,
}

impl AdminAuth {
    fn verify<P: Platform, C: Crypto>(cx: &mut Context<P, C>) -> Outcome {
        const FAILED: Outcome = Outcome::new(opcode::LOG_FAILED, SchedulerEvent::AdminLoginFailed);

        let Some(ltmk) = cx.keys.ltmk else {
            error!("no long-term key loaded");
            return FAILED;
        };
        let session = keys::derive_login_keys(&cx.crypto, &cx.artifacts.eph_key, &ltmk);
        if !keys::verify_login(
            &cx.crypto,
            &session,
            &cx.artifacts.login_blob,
            cx.artifacts.dev_pub(),
        ) {
            error!("login blob rejected");
            return FAILED;
        }
        cx.keys.session = Some(session);
        cx.keys.authorization = Authorization::Owner;
        cx.keys.key_id = 0;
        cx.flags.set(Artifact::SESSION_KEY);
        info!("owner logged in");
        Outcome::new(opcode::LOG_SUCCESS, SchedulerEvent::AdminLoginSuccess)
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for AdminAuth {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        if self.outcome.is_none() {
            if !cx
                .flags
                .is_ready(Artifact::EPH_KEY | Artifact::ENCRYPTED_LOGIN_BLOB)
            {
                return Step::Blocked;
            }
            self.outcome = Some(Self::verify(cx));
        }
        match self.outcome {
            Some(outcome) => outcome.deliver(cx),
            None => Step::Blocked,
        }
    }
}

/// Shared login: opens the share blob and validates the capability key inside.
pub(crate) struct ShareAuth {
    outcome: Option<Outcome>,
}

impl ShareAuth {
    fn verify<P: Platform, C: Crypto>(cx: &mut Context<P, C>) -> Outcome {
        const FAILED: Outcome =
            Outcome::new(opcode::SHARED_LOG_FAILED, SchedulerEvent::ShareLoginFailed);

        let Some(record) = cx.keys.record else {
            error!("no key record loaded");
            return FAILED;
        };
        let session = keys::derive_share_keys(&cx.crypto, &cx.artifacts.eph_key);
        let mut info = [0; SHARE_INFO_LEN];
        let verdict = keys::open_blob(&cx.crypto, &session.app_key, &cx.artifacts.share_blob, &mut info)
            .map_err(|_| CapabilityError::Envelope)
            .and_then(|()| {
                keys::verify_capability(&cx.crypto, &record, &info, cx.platform.unix_time())
            });
        match verdict {
            Ok(key_id) => {
                cx.keys.session = Some(session);
                cx.keys.authorization = Authorization::Share;
                cx.keys.key_id = key_id;
                cx.flags.set(Artifact::SESSION_KEY);
                info!("shared login with key {}", key_id);
                Outcome::new(opcode::SHARED_LOG_SUCCESS, SchedulerEvent::ShareLoginSuccess)
            }
            Err(err) => {
                error!("shared login rejected: {}", err);
                FAILED
            }
        }
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for ShareAuth {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        if self.outcome.is_none() {
            if !cx
                .flags
                .is_ready(Artifact::EPH_KEY | Artifact::ENCRYPTED_SHARE_BLOB)
            {
                return Step::Blocked;
            }
            self.outcome = Some(Self::verify(cx));
        }
        match self.outcome {
            Some(outcome) => outcome.deliver(cx),
            None => Step::Blocked,
        }
    }
}
