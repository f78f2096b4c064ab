// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authentication procedures and the threads that carry them out.
//!
//! A handshake runs three threads, stepped in a fixed order every tick:
//! the element thread issues secure element commands, the link thread moves
//! artifacts over the transfer protocol, and the auth thread derives keys and
//! decides the outcome. They only talk through the artifact flags.

mod auth;
mod scripts;
mod system;

use auth_protocol::opcode;

use crate::scheduler::Context;
use crate::{Crypto, Error, Platform, Scheduled, SchedulerEvent};

use auth::AuthThread;
use scripts::{ElementThread, LinkThread};
use system::SystemThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Procedure {
    Registration,
    AdminLogin,
    /// Delegated login with a capability key. `with_certs` adds the
    /// certificate exchange of a registration.
    SharedLogin { with_certs: bool },
    KeyRestore,
    KeyErase,
}

impl Procedure {
    /// Procedure a peer asks for with a status characteristic code.
    pub fn from_code(code: u32) -> Result<Self, Error> {
        let procedure = match (opcode::family(code), code) {
            (opcode::REG_TYPE, opcode::REG_START) => Self::Registration,
            (opcode::LOG_TYPE, opcode::LOG_START) => Self::AdminLogin,
            (opcode::SHARED_TYPE, opcode::SHARED_LOG_START) => Self::SharedLogin { with_certs: false },
            (opcode::SHARED_TYPE, opcode::SHARED_LOG_START_W_CERT) => {
                Self::SharedLogin { with_certs: true }
            }
            (opcode::SYS_TYPE, opcode::SYS_KEY_RESTORE) => Self::KeyRestore,
            (opcode::SYS_TYPE, opcode::SYS_KEY_DELETE) => Self::KeyErase,
            _ => return Err(Error::UnknownProcedure(code)),
        };
        Ok(procedure)
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Registration => opcode::REG_START,
            Self::AdminLogin => opcode::LOG_START,
            Self::SharedLogin { with_certs: false } => opcode::SHARED_LOG_START,
            Self::SharedLogin { with_certs: true } => opcode::SHARED_LOG_START_W_CERT,
            Self::KeyRestore => opcode::SYS_KEY_RESTORE,
            Self::KeyErase => opcode::SYS_KEY_DELETE,
        }
    }
}

/// Thread slots of the active procedure.
pub(crate) enum Workers {
    Handshake {
        element: Scheduled<ElementThread>,
        link: Scheduled<LinkThread>,
        auth: Scheduled<AuthThread>,
    },
    System(Scheduled<SystemThread>),
}

impl Workers {
    /// Threads for `procedure`, or a refusal when the registration state does not allow it.
    pub(crate) fn new(procedure: Procedure, registered: bool) -> Self {
        let handshake = |element: ElementThread, link: LinkThread, auth: AuthThread| Self::Handshake {
            element: Scheduled::new(element),
            link: Scheduled::new(link),
            auth: Scheduled::new(auth),
        };
        match procedure {
            Procedure::Registration if registered => {
                warn!("already registered");
                Self::System(Scheduled::new(SystemThread::refuse(
                    opcode::ERR_REGISTERED,
                    SchedulerEvent::KeyFound,
                )))
            }
            Procedure::AdminLogin | Procedure::SharedLogin { .. } if !registered => {
                warn!("{:?} before registration", procedure);
                Self::System(Scheduled::new(SystemThread::refuse(
                    opcode::ERR_NOT_REGISTERED,
                    SchedulerEvent::KeyNotFound,
                )))
            }
            Procedure::Registration => handshake(
                ElementThread::new(scripts::REGISTER_ELEMENT),
                LinkThread::new(scripts::REGISTER_LINK),
                AuthThread::register(),
            ),
            Procedure::AdminLogin => handshake(
                ElementThread::new(scripts::LOGIN_ELEMENT),
                LinkThread::new(scripts::LOGIN_LINK),
                AuthThread::admin(),
            ),
            Procedure::SharedLogin { with_certs } => handshake(
                ElementThread::new(if with_certs {
                    scripts::SHARE_ELEMENT_WITH_CERTS
                } else {
                    scripts::SHARE_ELEMENT
                }),
                LinkThread::new(if with_certs {
                    scripts::SHARE_LINK_WITH_CERTS
                } else {
                    scripts::SHARE_LINK
                }),
                AuthThread::share(),
            ),
            Procedure::KeyRestore => Self::System(Scheduled::new(SystemThread::restore())),
            Procedure::KeyErase => Self::System(Scheduled::new(SystemThread::erase())),
        }
    }

    pub(crate) fn schedule<P: Platform, C: Crypto>(&mut self, cx: &mut Context<P, C>) {
        match self {
            Self::Handshake { element, link, auth } => {
                element.schedule(cx);
                link.schedule(cx);
                auth.schedule(cx);
            }
            Self::System(thread) => thread.schedule(cx),
        }
    }
}
