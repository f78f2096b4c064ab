// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Procedures that only touch stored key material.

use auth_protocol::msc::Opcode;

use crate::keys::{self, WRAPS_LTMK};
use crate::scheduler::Context;
use crate::{Crypto, Exchange, KeyRecord, Platform, SchedulerEvent, Step, StorageError, Thread};

pub(crate) enum SystemThread {
    Restore(KeyRestore),
    Erase,
    /// Tells the peer why a procedure cannot run and reports `event`.
    Refusal { code: u32, event: SchedulerEvent },
}

impl SystemThread {
    pub(crate) fn restore() -> Self {
        Self::Restore(KeyRestore::new())
    }

    pub(crate) fn erase() -> Self {
        Self::Erase
    }

    pub(crate) fn refuse(code: u32, event: SchedulerEvent) -> Self {
        Self::Refusal { code, event }
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for SystemThread {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        match self {
            Self::Restore(restore) => restore.step(cx),
            Self::Erase => {
                cx.keys.forget();
                let event = match cx.platform.erase_all() {
                    Ok(()) => {
                        info!("key material erased");
                        SchedulerEvent::KeyDelSucc
                    }
                    Err(err) => {
                        error!("erasing key material failed: {}", err);
                        SchedulerEvent::KeyDelFail
                    }
                };
                cx.emit(event);
                Step::Done
            }
            Self::Refusal { code, event } => {
                if !cx.announce(*code) {
                    return Step::Blocked;
                }
                cx.emit(*event);
                Step::Done
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreState {
    Load,
    ReadKey,
    Done,
}

/// Loads the key record and reads the long-term key back from the element.
pub(crate) struct KeyRestore {
    state: RestoreState,
    exchange: Exchange,
}

impl KeyRestore {
    fn new() -> Self {
        Self {
            state: RestoreState::Load,
            exchange: Exchange::new(),
        }
    }

    fn load<P: Platform, C: Crypto>(&mut self, cx: &mut Context<P, C>) -> Step {
        let record = match KeyRecord::load(&mut cx.platform) {
            Ok(record) => record,
            Err(err) => {
                if err != StorageError::NotFound {
                    error!("reading key record failed: {}", err);
                }
                info!("no key record");
                cx.keys.forget();
                cx.emit(SchedulerEvent::KeyNotFound);
                return Step::Done;
            }
        };
        cx.keys.registered = true;
        cx.keys.record = Some(record);

        let response_len = keys::master_key_response_len(WRAPS_LTMK);
        if let Err(err) = self.exchange.start(Opcode::ReadMkpk, &[], response_len) {
            cx.abort(err);
            return Step::Done;
        }
        cx.platform.set_power(true);
        self.state = RestoreState::ReadKey;
        Step::Blocked
    }

    fn read_key<P: Platform, C: Crypto>(&mut self, cx: &mut Context<P, C>) -> Step {
        match self.exchange.poll(&mut cx.platform) {
            Ok(Step::Blocked) => return Step::Blocked,
            Ok(Step::Done) => {}
            Err(err) => {
                cx.abort(err);
                return Step::Done;
            }
        }
        cx.platform.set_power(false);

        let wrap_key = cx.keys.record.as_ref().and_then(KeyRecord::wrap_key);
        match keys::open_master_key(&cx.crypto, self.exchange.response(), wrap_key) {
            Ok(ltmk) => {
                cx.keys.ltmk = Some(ltmk);
                info!("key material restored");
                cx.emit(SchedulerEvent::KeyFound);
            }
            Err(_) => {
                // Registered, but the owner cannot log in until the key is rewritten.
                error!("stored long-term key does not open");
                cx.keys.ltmk = None;
                cx.emit(SchedulerEvent::KeyFound);
            }
        }
        Step::Done
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for KeyRestore {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        let step = match self.state {
            RestoreState::Load => self.load(cx),
            RestoreState::ReadKey => self.read_key(cx),
            RestoreState::Done => Step::Done,
        };
        if step == Step::Done {
            self.state = RestoreState::Done;
        }
        step
    }
}
