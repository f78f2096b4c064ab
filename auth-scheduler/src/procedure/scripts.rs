// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Element and link threads, each driven by a fixed per-procedure script.

use auth_protocol::msc::Opcode;
use auth_protocol::CommandCode;
use consts::MAX_CERT_LEN;

use crate::artifacts::CertLengths;
use crate::scheduler::Context;
use crate::transfer::{Receiver, Sender};
use crate::{Artifact, Crypto, Exchange, Platform, Region, Step, Thread};

/// Secure element commands used by the handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementOp {
    DevicePubkey,
    DeviceInfo,
    CertLengths,
    DeviceCert,
    ManufacturerCert,
    /// Shared secret with the peer's public key.
    Ecdh,
    /// Signature over `dev_sha`.
    Sign,
}

const INFO_RESPONSE_LEN: usize = 26;

impl ElementOp {
    fn opcode(self) -> Opcode {
        match self {
            Self::DevicePubkey => Opcode::Pubkey,
            Self::DeviceInfo => Opcode::Info,
            Self::CertLengths => Opcode::CertsLen,
            Self::DeviceCert => Opcode::DevCert,
            Self::ManufacturerCert => Opcode::ManuCert,
            Self::Ecdh => Opcode::Ecdhe,
            Self::Sign => Opcode::Sign,
        }
    }

    fn response_len<P, C>(self, cx: &Context<P, C>) -> usize {
        let lengths = cx.artifacts.cert_lengths;
        match self {
            Self::DevicePubkey => cx.artifacts.dev_pub().len(),
            Self::DeviceInfo => INFO_RESPONSE_LEN,
            Self::CertLengths => 6,
            Self::DeviceCert => (lengths.device as usize).min(MAX_CERT_LEN),
            Self::ManufacturerCert => (lengths.manufacturer as usize).min(MAX_CERT_LEN),
            Self::Ecdh => cx.artifacts.eph_key.len(),
            Self::Sign => cx.artifacts.dev_sign.len(),
        }
    }

    fn param<P, C>(self, cx: &Context<P, C>) -> &[u8] {
        match self {
            Self::Ecdh => &cx.artifacts.app_pub,
            Self::Sign => &cx.artifacts.dev_sha,
            _ => &[],
        }
    }

    /// Stores a successful response and marks what it produced.
    fn store<P, C>(self, response: &[u8], cx: &mut Context<P, C>) {
        let artifacts = &mut cx.artifacts;
        let ready = match self {
            Self::DevicePubkey => {
                artifacts.get_mut(Region::DevPub).copy_from_slice(response);
                Some(Artifact::DEV_PUB)
            }
            Self::DeviceInfo => {
                artifacts.set_msc_info(response);
                Some(Artifact::MSC_INFO)
            }
            Self::CertLengths => {
                artifacts.cert_lengths = CertLengths::parse(response);
                None
            }
            Self::DeviceCert => {
                artifacts.dev_cert.clear();
                // Capacity matches the clamped response length.
                let _ = artifacts.dev_cert.extend_from_slice(response);
                Some(Artifact::DEV_CERT)
            }
            Self::ManufacturerCert => {
                artifacts.manu_cert.clear();
                let _ = artifacts.manu_cert.extend_from_slice(response);
                Some(Artifact::MANU_CERT)
            }
            Self::Ecdh => {
                artifacts.eph_key.copy_from_slice(response);
                Some(Artifact::EPH_KEY)
            }
            Self::Sign => {
                artifacts.dev_sign.copy_from_slice(response);
                Some(Artifact::DEV_SIGN)
            }
        };
        if let Some(artifact) = ready {
            cx.flags.set(artifact);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementStage {
    Run(ElementOp),
    Await(Artifact),
    /// Hashes the device public key into `dev_sha` for signing.
    DigestDevicePubkey,
}

use ElementStage::{Await as AwaitE, DigestDevicePubkey, Run};

pub(crate) const REGISTER_ELEMENT: &[ElementStage] = &[
    Run(ElementOp::DevicePubkey),
    Run(ElementOp::DeviceInfo),
    Run(ElementOp::CertLengths),
    Run(ElementOp::DeviceCert),
    Run(ElementOp::ManufacturerCert),
    AwaitE(Artifact::APP_PUB),
    Run(ElementOp::Ecdh),
    AwaitE(Artifact::DEV_SHA),
    Run(ElementOp::Sign),
];

pub(crate) const LOGIN_ELEMENT: &[ElementStage] = &[
    Run(ElementOp::DevicePubkey),
    AwaitE(Artifact::APP_PUB),
    Run(ElementOp::Ecdh),
];

pub(crate) const SHARE_ELEMENT: &[ElementStage] = &[
    Run(ElementOp::DevicePubkey),
    DigestDevicePubkey,
    Run(ElementOp::Sign),
    AwaitE(Artifact::APP_PUB),
    Run(ElementOp::Ecdh),
];

pub(crate) const SHARE_ELEMENT_WITH_CERTS: &[ElementStage] = &[
    Run(ElementOp::DevicePubkey),
    Run(ElementOp::CertLengths),
    Run(ElementOp::DeviceCert),
    Run(ElementOp::ManufacturerCert),
    DigestDevicePubkey,
    Run(ElementOp::Sign),
    AwaitE(Artifact::APP_PUB),
    Run(ElementOp::Ecdh),
];

/// Issues the element commands of a handshake.
///
/// The element is powered for the lifetime of the thread. Power-up costs one
/// tick before the first command.
pub(crate) struct ElementThread {
    script: &'static [ElementStage],
    pc: usize,
    powered: bool,
    exchange: Exchange,
}

impl ElementThread {
    pub(crate) fn new(script: &'static [ElementStage]) -> Self {
        Self {
            script,
            pc: 0,
            powered: false,
            exchange: Exchange::new(),
        }
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for ElementThread {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        if !self.powered {
            cx.platform.set_power(true);
            self.powered = true;
            return Step::Blocked;
        }

        while let Some(&stage) = self.script.get(self.pc) {
            match stage {
                ElementStage::Await(artifact) => {
                    if !cx.flags.is_ready(artifact) {
                        return Step::Blocked;
                    }
                }
                ElementStage::DigestDevicePubkey => {
                    cx.artifacts.dev_sha = cx.crypto.sha256(cx.artifacts.dev_pub());
                    cx.flags.set(Artifact::DEV_SHA);
                }
                ElementStage::Run(op) => {
                    if self.exchange.is_idle() {
                        let started = self.exchange.start(
                            op.opcode(),
                            op.param(cx),
                            op.response_len(cx),
                        );
                        if let Err(err) = started {
                            cx.abort(err);
                            return Step::Done;
                        }
                        info!("msc {:?}", op.opcode());
                    }
                    match self.exchange.poll(&mut cx.platform) {
                        Ok(Step::Blocked) => return Step::Blocked,
                        Ok(Step::Done) => {
                            op.store(self.exchange.response(), cx);
                            self.exchange.reset();
                        }
                        Err(err) => {
                            cx.abort(err);
                            return Step::Done;
                        }
                    }
                }
            }
            self.pc += 1;
        }

        cx.platform.set_power(false);
        Step::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkStage {
    /// Receives `cmd` into `into` and marks `marks` ready.
    Receive {
        cmd: CommandCode,
        into: Region,
        marks: Artifact,
    },
    Send {
        cmd: CommandCode,
        from: Region,
    },
    Await(Artifact),
    /// Marks an artifact ready once everything before it went out.
    Mark(Artifact),
    /// Lets the auth thread know the certificates are out.
    CertsSent,
}

use LinkStage::{Await as AwaitL, CertsSent, Receive};

const RECEIVE_APP_PUB: LinkStage = Receive {
    cmd: CommandCode::DevPubkey,
    into: Region::AppPub,
    marks: Artifact::APP_PUB,
};

pub(crate) const REGISTER_LINK: &[LinkStage] = &[
    RECEIVE_APP_PUB,
    AwaitL(Artifact::MSC_INFO),
    LinkStage::Send {
        cmd: CommandCode::DevPubkey,
        from: Region::InfoPub,
    },
    AwaitL(Artifact::DEV_CERT),
    LinkStage::Send {
        cmd: CommandCode::DevCert,
        from: Region::DevCert,
    },
    AwaitL(Artifact::MANU_CERT),
    LinkStage::Send {
        cmd: CommandCode::DevManuCert,
        from: Region::ManuCert,
    },
    CertsSent,
    AwaitL(Artifact::DEV_SIGN),
    LinkStage::Send {
        cmd: CommandCode::DevSignature,
        from: Region::DevSign,
    },
    LinkStage::Mark(Artifact::ENCRYPTED_REGISTRATION_BLOB),
];

pub(crate) const LOGIN_LINK: &[LinkStage] = &[
    RECEIVE_APP_PUB,
    AwaitL(Artifact::DEV_PUB),
    LinkStage::Send {
        cmd: CommandCode::DevPubkey,
        from: Region::DevPub,
    },
    Receive {
        cmd: CommandCode::DevLoginInfo,
        into: Region::LoginBlob,
        marks: Artifact::ENCRYPTED_LOGIN_BLOB,
    },
];

pub(crate) const SHARE_LINK: &[LinkStage] = &[
    RECEIVE_APP_PUB,
    AwaitL(Artifact::DEV_PUB),
    LinkStage::Send {
        cmd: CommandCode::DevPubkey,
        from: Region::DevPub,
    },
    AwaitL(Artifact::DEV_SIGN),
    LinkStage::Send {
        cmd: CommandCode::DevSignature,
        from: Region::DevSign,
    },
    RECEIVE_SHARE_BLOB,
];

pub(crate) const SHARE_LINK_WITH_CERTS: &[LinkStage] = &[
    RECEIVE_APP_PUB,
    AwaitL(Artifact::DEV_PUB),
    LinkStage::Send {
        cmd: CommandCode::DevPubkey,
        from: Region::DevPub,
    },
    AwaitL(Artifact::DEV_CERT),
    LinkStage::Send {
        cmd: CommandCode::DevCert,
        from: Region::DevCert,
    },
    AwaitL(Artifact::MANU_CERT),
    LinkStage::Send {
        cmd: CommandCode::DevManuCert,
        from: Region::ManuCert,
    },
    CertsSent,
    AwaitL(Artifact::DEV_SIGN),
    LinkStage::Send {
        cmd: CommandCode::DevSignature,
        from: Region::DevSign,
    },
    RECEIVE_SHARE_BLOB,
];

const RECEIVE_SHARE_BLOB: LinkStage = Receive {
    cmd: CommandCode::DevShareInfo,
    into: Region::ShareBlob,
    marks: Artifact::ENCRYPTED_SHARE_BLOB,
};

enum Transfer {
    Idle,
    Rx(Receiver),
    Tx(Sender),
}

/// Moves the artifacts of a handshake over the transfer link, one at a time.
pub(crate) struct LinkThread {
    script: &'static [LinkStage],
    pc: usize,
    transfer: Transfer,
}

impl LinkThread {
    pub(crate) fn new(script: &'static [LinkStage]) -> Self {
        Self {
            script,
            pc: 0,
            transfer: Transfer::Idle,
        }
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for LinkThread {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        while let Some(&stage) = self.script.get(self.pc) {
            match stage {
                LinkStage::Await(artifact) => {
                    if !cx.flags.is_ready(artifact) {
                        return Step::Blocked;
                    }
                }
                LinkStage::Mark(artifact) => cx.flags.set(artifact),
                LinkStage::CertsSent => cx.certs_sent = true,
                LinkStage::Receive { cmd, into, marks } => {
                    if let Transfer::Idle = self.transfer {
                        cx.xfer.expect(into, &mut cx.artifacts);
                        self.transfer = Transfer::Rx(Receiver::new(cmd));
                    }
                    if let Transfer::Rx(receiver) = &mut self.transfer {
                        if receiver.step(cx) == Step::Blocked {
                            return Step::Blocked;
                        }
                    }
                    cx.flags.set(marks);
                    self.transfer = Transfer::Idle;
                }
                LinkStage::Send { cmd, from } => {
                    if let Transfer::Idle = self.transfer {
                        self.transfer = Transfer::Tx(Sender::new(cmd, from));
                    }
                    if let Transfer::Tx(sender) = &mut self.transfer {
                        if sender.step(cx) == Step::Blocked {
                            return Step::Blocked;
                        }
                    }
                    self.transfer = Transfer::Idle;
                }
            }
            self.pc += 1;
        }
        Step::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;
    use crate::SchedulerEvent;

    fn run<T: Thread<crate::testing::TestContext>>(
        thread: &mut T,
        cx: &mut crate::testing::TestContext,
        ticks: u32,
    ) -> Step {
        for _ in 0..ticks {
            cx.now += 1;
            if thread.step(cx) == Step::Done {
                return Step::Done;
            }
        }
        Step::Blocked
    }

    #[test]
    fn registration_element_waits_for_peer_key() {
        let mut cx = context();
        cx.platform.bus.payload = vec![0x01, 0x20, 0x00, 0x40, 0x00, 0x00];
        let mut thread = ElementThread::new(REGISTER_ELEMENT);

        assert_eq!(run(&mut thread, &mut cx, 1), Step::Blocked);
        assert!(cx.platform.powered);
        assert_eq!(run(&mut thread, &mut cx, 50), Step::Blocked);
        assert!(cx.flags.is_ready(Artifact::DEV_PUB | Artifact::MSC_INFO));
        assert!(cx.flags.is_ready(Artifact::DEV_CERT | Artifact::MANU_CERT));
        assert_eq!(cx.artifacts.dev_cert.len(), 0x120);
        assert_eq!(cx.artifacts.manu_cert.len(), 0x40);
        assert!(!cx.flags.is_ready(Artifact::EPH_KEY));

        cx.flags.set(Artifact::APP_PUB);
        run(&mut thread, &mut cx, 50);
        assert!(cx.flags.is_ready(Artifact::EPH_KEY));
        let ecdh = cx.platform.bus.writes.last().unwrap();
        assert_eq!(ecdh[2], Opcode::Ecdhe as u8);
        assert_eq!(ecdh.len(), 64 + 4);

        cx.flags.set(Artifact::DEV_SHA);
        assert_eq!(run(&mut thread, &mut cx, 50), Step::Done);
        assert!(cx.flags.is_ready(Artifact::DEV_SIGN));
        assert!(!cx.platform.powered);
    }

    #[test]
    fn share_element_signs_its_own_key() {
        let mut cx = context();
        cx.platform.bus.payload = vec![0x42; 4];
        let mut thread = ElementThread::new(SHARE_ELEMENT);
        run(&mut thread, &mut cx, 50);

        let expected = cx.crypto.sha256(&[0x42; 64]);
        assert_eq!(cx.artifacts.dev_sha, expected);
        let sign = cx.platform.bus.writes.last().unwrap();
        assert_eq!(sign[2], Opcode::Sign as u8);
        assert_eq!(&sign[3..35], &expected[..]);
    }

    #[test]
    fn element_failure_ends_the_handshake() {
        let mut cx = context();
        cx.platform.bus.status = 0x09;
        let mut thread = ElementThread::new(LOGIN_ELEMENT);

        assert_eq!(run(&mut thread, &mut cx, 100), Step::Done);
        assert_eq!(cx.platform.bus.writes.len(), 6);
        assert_eq!(cx.events.dequeue(), Ok(SchedulerEvent::ElementFatal));
        assert!(!cx.flags.is_ready(Artifact::DEV_PUB));
        assert!(!cx.platform.powered);
    }

    #[test]
    fn registration_link_marks_blob_after_signature() {
        let mut cx = context();
        let mut thread = LinkThread {
            script: REGISTER_LINK,
            pc: REGISTER_LINK.len() - 2,
            transfer: Transfer::Idle,
        };
        cx.flags.set(Artifact::DEV_SIGN);
        cx.artifacts.dev_sign.fill(0x11);

        assert_eq!(run(&mut thread, &mut cx, 1), Step::Blocked);
        assert!(!cx.flags.is_ready(Artifact::ENCRYPTED_REGISTRATION_BLOB));
        cx.xfer.on_frame(
            auth_protocol::Frame::Ack {
                ack: auth_protocol::AckCode::Ready,
                sn: 0,
            },
            &mut cx.artifacts,
        );
        run(&mut thread, &mut cx, 1);
        assert!(!cx.flags.is_ready(Artifact::ENCRYPTED_REGISTRATION_BLOB));

        cx.xfer.on_frame(
            auth_protocol::Frame::Ack {
                ack: auth_protocol::AckCode::Success,
                sn: 0,
            },
            &mut cx.artifacts,
        );
        assert_eq!(run(&mut thread, &mut cx, 1), Step::Done);
        assert!(cx.flags.is_ready(Artifact::ENCRYPTED_REGISTRATION_BLOB));
    }

    #[test]
    fn link_follows_its_script() {
        let mut cx = context();
        let mut thread = LinkThread::new(LOGIN_LINK);
        cx.xfer.on_frame(
            auth_protocol::Frame::Command {
                cmd: CommandCode::DevPubkey,
                chunks: 4,
            },
            &mut cx.artifacts,
        );
        assert_eq!(run(&mut thread, &mut cx, 1), Step::Blocked);
        assert_eq!(cx.platform.frames.len(), 1);

        let key: Vec<u8> = (1..=64).collect();
        for sn in 1..=4 {
            let payload = auth_protocol::chunk(&key, sn).unwrap();
            cx.xfer
                .on_frame(auth_protocol::Frame::Data { sn, payload }, &mut cx.artifacts);
        }
        run(&mut thread, &mut cx, 1);
        assert!(cx.flags.is_ready(Artifact::APP_PUB));
        assert_eq!(&cx.artifacts.app_pub[..], &key[..]);

        // Blocked until the element produced the device key.
        let sent = cx.platform.frames.len();
        run(&mut thread, &mut cx, 5);
        assert_eq!(cx.platform.frames.len(), sent);
        cx.flags.set(Artifact::DEV_PUB);
        run(&mut thread, &mut cx, 1);
        assert_eq!(cx.platform.frames.len(), sent + 1);
    }
}
