// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reliable chunked transfer over the notification link.
//!
//! [`Session`] is updated from two sides: [`Session::on_frame`] applies the
//! peer's frames as they arrive, and the [`Receiver`] and [`Sender`] threads
//! drive one artifact at a time from the scheduler tick.

use auth_protocol::{
    chunk, chunk_count, last_chunk_size, place_chunk, AckCode, CommandCode, Frame, LostChunkScan,
};

use crate::artifacts::Artifacts;
use crate::scheduler::Context;
use crate::{Crypto, Platform, Region, Step, Thread, Timer, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    WaitCmd,
    WaitAck,
    Ready,
    Busy,
    Txd,
    Rxd,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Command,
    Ack,
}

/// Shared state of the transfer link.
#[derive(Debug, Clone)]
pub struct Session {
    mode: Option<Mode>,
    tx_num: u16,
    max_tx_num: u16,
    rx_num: u16,
    max_rx_num: u16,
    /// Last chunk received, or the chunk the peer reported lost. 0 is none.
    curr_sn: u16,
    /// Artifact the peer announced.
    cmd: Option<CommandCode>,
    ack: Option<AckCode>,
    binding: Option<Region>,
    last_chunk_size: usize,
    state: TransferState,
    scan: LostChunkScan,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            mode: None,
            tx_num: 0,
            max_tx_num: 0,
            rx_num: 0,
            max_rx_num: 0,
            curr_sn: 0,
            cmd: None,
            ack: None,
            binding: None,
            last_chunk_size: 0,
            state: TransferState::WaitCmd,
            scan: LostChunkScan::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Kind of the last control frame the peer wrote.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Binds the region the next incoming artifact lands in.
    ///
    /// The region is zeroed for the lost-chunk heuristic. A command the peer
    /// already announced is kept so it is answered once the receiver runs.
    pub(crate) fn expect(&mut self, region: Region, artifacts: &mut Artifacts) {
        let buf = artifacts.get_mut(region);
        buf.fill(0);
        self.max_rx_num = chunk_count(buf.len());
        self.binding = Some(region);
        self.curr_sn = 0;
        self.scan.reset();
    }

    /// Prepares to send `len` bytes.
    pub(crate) fn offer(&mut self, len: usize) {
        self.tx_num = chunk_count(len);
        self.max_tx_num = self.tx_num;
        self.last_chunk_size = last_chunk_size(len);
        self.curr_sn = 0;
        self.ack = None;
        self.state = TransferState::WaitAck;
    }

    /// Applies one frame from the peer.
    pub(crate) fn on_frame(&mut self, frame: Frame<'_>, artifacts: &mut Artifacts) {
        match frame {
            Frame::Command { cmd, chunks } => {
                trace!("peer announces {:?} in {} chunks", cmd, chunks);
                self.mode = Some(Mode::Command);
                self.cmd = Some(cmd);
                self.rx_num = chunks;
            }
            Frame::Ack { ack, sn } => {
                trace!("peer ack {:?} {}", ack, sn);
                self.mode = Some(Mode::Ack);
                self.ack = Some(ack);
                if ack == AckCode::Lost {
                    self.curr_sn = sn;
                }
            }
            Frame::Data { sn, payload } => {
                let Some(region) = self.binding else {
                    warn!("chunk {} with no receive buffer", sn);
                    return;
                };
                if self.state != TransferState::Rxd || sn == 0 || sn > self.rx_num {
                    warn!("dropping chunk {} in {:?}", sn, self.state);
                    return;
                }
                match place_chunk(artifacts.get_mut(region), sn, payload) {
                    Ok(_) => self.curr_sn = sn,
                    Err(err) => warn!("chunk {}: {}", sn, err),
                }
            }
        }
    }

    /// Next chunk that looks missing in the bound buffer.
    pub(crate) fn find_lost(&mut self, artifacts: &Artifacts) -> Option<u16> {
        let region = self.binding?;
        self.scan.next_lost(artifacts.get(region), self.rx_num)
    }

    pub(crate) fn finish_rx(&mut self) {
        self.state = TransferState::WaitCmd;
        self.mode = None;
        self.cmd = None;
        self.rx_num = 0;
        self.max_rx_num = 0;
        self.binding = None;
        self.curr_sn = 0;
    }

    pub(crate) fn finish_tx(&mut self) {
        self.state = TransferState::WaitCmd;
        self.tx_num = 0;
        self.max_tx_num = 0;
        self.last_chunk_size = 0;
        self.ack = None;
        self.curr_sn = 0;
    }

    fn take_lost(&mut self) -> Option<u16> {
        match core::mem::take(&mut self.curr_sn) {
            0 => None,
            sn => Some(sn),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends one frame, reporting whether the link took it.
///
/// A full notification queue is retried on the next tick. A dropped link
/// leaves the session in error until the procedure times out.
fn transmit<P: Platform, C: Crypto>(cx: &mut Context<P, C>, frame: Frame<'_>) -> bool {
    match cx.send(frame) {
        Ok(()) => true,
        Err(TransportError::Busy) => false,
        Err(TransportError::Disconnected) => {
            if cx.xfer.state != TransferState::Error {
                error!("link lost during transfer");
            }
            cx.xfer.state = TransferState::Error;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    WaitCommand,
    AckReady,
    AckCancel,
    Receiving,
    Scan,
    AckLost(u16),
    WaitResend(u16),
    AckSuccess,
}

/// Receives one artifact into the region bound with [`Session::expect`].
pub(crate) struct Receiver {
    cmd: CommandCode,
    state: RxState,
    timer: Timer,
}

impl Receiver {
    pub(crate) fn new(cmd: CommandCode) -> Self {
        Self {
            cmd,
            state: RxState::WaitCommand,
            timer: Timer::default(),
        }
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for Receiver {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        loop {
            match self.state {
                RxState::WaitCommand => {
                    let Some(cmd) = cx.xfer.cmd else {
                        return Step::Blocked;
                    };
                    let xfer = &mut cx.xfer;
                    self.state = if cmd == self.cmd
                        && xfer.rx_num > 0
                        && xfer.rx_num <= xfer.max_rx_num
                        && xfer.binding.is_some()
                    {
                        xfer.state = TransferState::Ready;
                        RxState::AckReady
                    } else {
                        warn!(
                            "cancel {:?} in {} chunks, expecting {:?}",
                            cmd, xfer.rx_num, self.cmd
                        );
                        RxState::AckCancel
                    };
                }
                RxState::AckCancel => {
                    let cancel = Frame::Ack {
                        ack: AckCode::Cancel,
                        sn: 0,
                    };
                    if !transmit(cx, cancel) {
                        return Step::Blocked;
                    }
                    cx.xfer.cmd = None;
                    cx.xfer.rx_num = 0;
                    cx.xfer.state = TransferState::WaitCmd;
                    self.state = RxState::WaitCommand;
                }
                RxState::AckReady => {
                    let ready = Frame::Ack {
                        ack: AckCode::Ready,
                        sn: 0,
                    };
                    if !transmit(cx, ready) {
                        return Step::Blocked;
                    }
                    cx.xfer.state = TransferState::Rxd;
                    self.timer
                        .set(cx.now, cx.config.transfer_timeout_ms, &cx.config);
                    self.state = RxState::Receiving;
                }
                RxState::Receiving => {
                    if cx.xfer.curr_sn != cx.xfer.rx_num && !self.timer.expired(cx.now) {
                        return Step::Blocked;
                    }
                    self.state = RxState::Scan;
                }
                RxState::Scan => {
                    self.state = match cx.xfer.find_lost(&cx.artifacts) {
                        Some(sn) => {
                            warn!("{:?}: chunk {} lost", self.cmd, sn);
                            RxState::AckLost(sn)
                        }
                        None => RxState::AckSuccess,
                    };
                }
                RxState::AckLost(sn) => {
                    if !transmit(cx, Frame::Ack { ack: AckCode::Lost, sn }) {
                        return Step::Blocked;
                    }
                    cx.xfer.curr_sn = 0;
                    self.state = RxState::WaitResend(sn);
                }
                RxState::WaitResend(sn) => {
                    if cx.xfer.curr_sn != sn {
                        return Step::Blocked;
                    }
                    self.state = RxState::Scan;
                }
                RxState::AckSuccess => {
                    let success = Frame::Ack {
                        ack: AckCode::Success,
                        sn: 0,
                    };
                    if !transmit(cx, success) {
                        return Step::Blocked;
                    }
                    info!("{:?}: received {} chunks", self.cmd, cx.xfer.rx_num);
                    cx.xfer.finish_rx();
                    return Step::Done;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Announce,
    WaitAck,
    Sending,
    AwaitResult,
}

/// Sends one artifact out of `from`.
pub(crate) struct Sender {
    cmd: CommandCode,
    from: Region,
    state: TxState,
    next_sn: u16,
}

impl Sender {
    pub(crate) fn new(cmd: CommandCode, from: Region) -> Self {
        Self {
            cmd,
            from,
            state: TxState::Announce,
            next_sn: 1,
        }
    }

    fn send_chunk<P: Platform, C: Crypto>(&self, cx: &mut Context<P, C>, sn: u16) -> bool {
        let Some(payload) = chunk(cx.artifacts.get(self.from), sn) else {
            warn!("{:?}: no chunk {}", self.cmd, sn);
            return true;
        };
        let mut buf = [0; consts::CHUNK_SIZE];
        buf[..payload.len()].copy_from_slice(payload);
        let len = payload.len();
        transmit(
            cx,
            Frame::Data {
                sn,
                payload: &buf[..len],
            },
        )
    }
}

impl<P: Platform, C: Crypto> Thread<Context<P, C>> for Sender {
    fn step(&mut self, cx: &mut Context<P, C>) -> Step {
        loop {
            match self.state {
                TxState::Announce => {
                    let len = cx.artifacts.get(self.from).len();
                    cx.xfer.offer(len);
                    let announce = Frame::Command {
                        cmd: self.cmd,
                        chunks: cx.xfer.tx_num,
                    };
                    if !transmit(cx, announce) {
                        return Step::Blocked;
                    }
                    self.state = TxState::WaitAck;
                }
                TxState::WaitAck => match cx.xfer.ack.take() {
                    None => return Step::Blocked,
                    Some(AckCode::Ready) => {
                        cx.xfer.state = TransferState::Busy;
                        self.next_sn = 1;
                        self.state = TxState::Sending;
                    }
                    Some(ack) => {
                        warn!("{:?}: peer answered {:?}, announcing again", self.cmd, ack);
                        self.state = TxState::Announce;
                        return Step::Blocked;
                    }
                },
                TxState::Sending => {
                    while self.next_sn <= cx.xfer.tx_num {
                        if !self.send_chunk(cx, self.next_sn) {
                            return Step::Blocked;
                        }
                        self.next_sn += 1;
                    }
                    cx.xfer.state = TransferState::Txd;
                    self.state = TxState::AwaitResult;
                }
                TxState::AwaitResult => {
                    if let Some(sn) = cx.xfer.take_lost() {
                        if sn > cx.xfer.max_tx_num {
                            warn!("{:?}: peer lost chunk {} of {}", self.cmd, sn, cx.xfer.max_tx_num);
                            return Step::Blocked;
                        }
                        warn!("{:?}: resending chunk {}", self.cmd, sn);
                        if !self.send_chunk(cx, sn) {
                            cx.xfer.curr_sn = sn;
                        }
                        return Step::Blocked;
                    }
                    if cx.xfer.ack != Some(AckCode::Success) {
                        return Step::Blocked;
                    }
                    info!(
                        "{:?}: sent {} chunks, last one {} bytes",
                        self.cmd, cx.xfer.tx_num, cx.xfer.last_chunk_size
                    );
                    cx.xfer.finish_tx();
                    return Step::Done;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, TestContext};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 13 + 1) as u8).collect()
    }

    fn deliver(cx: &mut TestContext, frame: Frame<'_>) {
        cx.xfer.on_frame(frame, &mut cx.artifacts);
    }

    fn run<T: Thread<TestContext>>(thread: &mut T, cx: &mut TestContext, ticks: u32) -> Step {
        for _ in 0..ticks {
            cx.now += 1;
            if thread.step(cx) == Step::Done {
                return Step::Done;
            }
        }
        Step::Blocked
    }

    fn sent_acks(cx: &TestContext) -> Vec<(AckCode, u16)> {
        cx.platform
            .frames
            .iter()
            .filter_map(|bytes| match Frame::decode(bytes) {
                Ok(Frame::Ack { ack, sn }) => Some((ack, sn)),
                _ => None,
            })
            .collect()
    }

    /// Runs a sender and a receiver against each other until both finish,
    /// withholding the first copy of each chunk in `drop`. Returns the bytes
    /// received and every chunk the receiver reported lost.
    fn loop_back(src: &[u8], drop: &[u16]) -> (Vec<u8>, Vec<u16>) {
        let mut tx = context();
        let mut rx = context();
        tx.artifacts.dev_cert.extend_from_slice(src).unwrap();
        rx.artifacts.dev_cert.resize(src.len(), 0).unwrap();
        rx.xfer.expect(Region::DevCert, &mut rx.artifacts);

        let mut sender = Sender::new(CommandCode::DevCert, Region::DevCert);
        let mut receiver = Receiver::new(CommandCode::DevCert);
        let mut withheld = Vec::new();
        let mut lost = Vec::new();
        let (mut sent, mut received) = (false, false);

        let limit = 4 * tx.config.ticks(tx.config.transfer_timeout_ms);
        for _ in 0..limit {
            tx.now += 1;
            rx.now += 1;
            sent = sent || sender.step(&mut tx) == Step::Done;
            for bytes in tx.platform.frames.drain(..) {
                let frame = Frame::decode(&bytes).unwrap();
                if let Frame::Data { sn, .. } = frame {
                    if drop.contains(&sn) && !withheld.contains(&sn) {
                        withheld.push(sn);
                        continue;
                    }
                }
                rx.xfer.on_frame(frame, &mut rx.artifacts);
            }

            received = received || receiver.step(&mut rx) == Step::Done;
            for bytes in rx.platform.frames.drain(..) {
                let frame = Frame::decode(&bytes).unwrap();
                if let Frame::Ack { ack: AckCode::Lost, sn } = frame {
                    lost.push(sn);
                }
                tx.xfer.on_frame(frame, &mut tx.artifacts);
            }

            if sent && received {
                return (rx.artifacts.dev_cert.to_vec(), lost);
            }
        }
        panic!("{} bytes not transferred, sent {} received {}", src.len(), sent, received);
    }

    fn nonzero_pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn artifacts_survive_the_link_at_chunk_boundaries() {
        for len in [1, 17, 18, 19, 255, 512] {
            let src = nonzero_pattern(len);
            let (received, lost) = loop_back(&src, &[]);
            assert_eq!(received, src, "length {}", len);
            assert!(lost.is_empty(), "length {} lost {:?}", len, lost);
        }
    }

    #[test]
    fn dropped_chunks_are_recovered_over_the_link() {
        // 255 bytes is 15 chunks, 512 bytes is 29 with an 8-byte tail.
        let src = nonzero_pattern(255);
        let (received, lost) = loop_back(&src, &[7]);
        assert_eq!(received, src);
        assert_eq!(lost, vec![7]);

        let src = nonzero_pattern(512);
        let (received, lost) = loop_back(&src, &[29]);
        assert_eq!(received, src);
        assert_eq!(lost, vec![29]);

        let (received, lost) = loop_back(&src, &[3, 29]);
        assert_eq!(received, src);
        assert_eq!(lost, vec![3, 29]);

        let src = nonzero_pattern(19);
        let (received, lost) = loop_back(&src, &[2]);
        assert_eq!(received, src);
        assert_eq!(lost, vec![2]);
    }

    #[test]
    fn receives_artifact_in_order() {
        let mut cx = context();
        let src = pattern(64);
        cx.xfer.expect(Region::AppPub, &mut cx.artifacts);
        let mut receiver = Receiver::new(CommandCode::DevPubkey);

        assert_eq!(run(&mut receiver, &mut cx, 3), Step::Blocked);
        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevPubkey,
                chunks: 4,
            },
        );
        assert_eq!(run(&mut receiver, &mut cx, 1), Step::Blocked);
        assert_eq!(sent_acks(&cx), vec![(AckCode::Ready, 0)]);
        assert_eq!(cx.xfer.state(), TransferState::Rxd);

        for sn in 1..=4 {
            deliver(
                &mut cx,
                Frame::Data {
                    sn,
                    payload: chunk(&src, sn).unwrap(),
                },
            );
        }
        assert_eq!(run(&mut receiver, &mut cx, 1), Step::Done);
        assert_eq!(&cx.artifacts.app_pub[..], &src[..]);
        assert_eq!(sent_acks(&cx).last(), Some(&(AckCode::Success, 0)));
        assert_eq!(cx.xfer.state(), TransferState::WaitCmd);
    }

    #[test]
    fn command_announced_early_is_kept() {
        let mut cx = context();
        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevLoginInfo,
                chunks: 1,
            },
        );
        cx.xfer.expect(Region::LoginBlob, &mut cx.artifacts);
        let mut receiver = Receiver::new(CommandCode::DevLoginInfo);
        run(&mut receiver, &mut cx, 1);
        assert_eq!(sent_acks(&cx), vec![(AckCode::Ready, 0)]);
    }

    #[test]
    fn oversized_or_unexpected_announcement_is_cancelled() {
        let mut cx = context();
        cx.xfer.expect(Region::AppPub, &mut cx.artifacts);
        let mut receiver = Receiver::new(CommandCode::DevPubkey);

        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevPubkey,
                chunks: 5,
            },
        );
        run(&mut receiver, &mut cx, 1);
        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevCert,
                chunks: 2,
            },
        );
        run(&mut receiver, &mut cx, 1);
        assert_eq!(
            sent_acks(&cx),
            vec![(AckCode::Cancel, 0), (AckCode::Cancel, 0)]
        );
        assert_eq!(cx.xfer.state(), TransferState::WaitCmd);

        // Chunks are ignored until a transfer is accepted.
        deliver(&mut cx, Frame::Data { sn: 1, payload: &[9; 18] });
        assert!(cx.artifacts.app_pub.iter().all(|&b| b == 0));
    }

    #[test]
    fn recovers_lost_chunk() {
        let mut cx = context();
        let src = pattern(64);
        cx.xfer.expect(Region::AppPub, &mut cx.artifacts);
        let mut receiver = Receiver::new(CommandCode::DevPubkey);
        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevPubkey,
                chunks: 4,
            },
        );
        run(&mut receiver, &mut cx, 1);

        for sn in [1, 3, 4] {
            deliver(
                &mut cx,
                Frame::Data {
                    sn,
                    payload: chunk(&src, sn).unwrap(),
                },
            );
        }
        assert_eq!(run(&mut receiver, &mut cx, 5), Step::Blocked);
        assert_eq!(sent_acks(&cx).last(), Some(&(AckCode::Lost, 2)));

        deliver(
            &mut cx,
            Frame::Data {
                sn: 2,
                payload: chunk(&src, 2).unwrap(),
            },
        );
        assert_eq!(run(&mut receiver, &mut cx, 1), Step::Done);
        assert_eq!(&cx.artifacts.app_pub[..], &src[..]);
    }

    #[test]
    fn missing_tail_is_found_after_timeout() {
        let mut cx = context();
        let src = pattern(36);
        cx.xfer.expect(Region::ShareBlob, &mut cx.artifacts);
        let mut receiver = Receiver::new(CommandCode::DevShareInfo);
        deliver(
            &mut cx,
            Frame::Command {
                cmd: CommandCode::DevShareInfo,
                chunks: 2,
            },
        );
        run(&mut receiver, &mut cx, 1);
        deliver(
            &mut cx,
            Frame::Data {
                sn: 1,
                payload: chunk(&src, 1).unwrap(),
            },
        );

        let timeout = cx.config.ticks(cx.config.transfer_timeout_ms);
        assert_eq!(run(&mut receiver, &mut cx, timeout - 2), Step::Blocked);
        assert!(sent_acks(&cx).iter().all(|(ack, _)| *ack != AckCode::Lost));
        run(&mut receiver, &mut cx, 2);
        assert_eq!(sent_acks(&cx).last(), Some(&(AckCode::Lost, 2)));
    }

    #[test]
    fn next_receive_scans_from_the_start() {
        let mut cx = context();
        cx.xfer.expect(Region::AppPub, &mut cx.artifacts);
        cx.artifacts.app_pub[..54].fill(1);
        cx.xfer.rx_num = 4;
        assert_eq!(cx.xfer.find_lost(&cx.artifacts), Some(4));

        // A fresh binding must not inherit the cursor of the previous one.
        cx.xfer.finish_rx();
        cx.xfer.expect(Region::AppPub, &mut cx.artifacts);
        cx.xfer.rx_num = 4;
        assert_eq!(cx.xfer.find_lost(&cx.artifacts), Some(1));
    }

    #[test]
    fn sends_artifact_and_answers_lost() {
        let mut cx = context();
        cx.artifacts.dev_sign.copy_from_slice(&pattern(64));
        let mut sender = Sender::new(CommandCode::DevSignature, Region::DevSign);

        assert_eq!(run(&mut sender, &mut cx, 2), Step::Blocked);
        assert_eq!(
            Frame::decode(&cx.platform.frames[0]),
            Ok(Frame::Command {
                cmd: CommandCode::DevSignature,
                chunks: 4
            })
        );
        assert_eq!(cx.xfer.state(), TransferState::WaitAck);

        deliver(&mut cx, Frame::Ack { ack: AckCode::Ready, sn: 0 });
        run(&mut sender, &mut cx, 1);
        assert_eq!(cx.platform.frames.len(), 5);
        assert_eq!(cx.xfer.state(), TransferState::Txd);
        assert_eq!(cx.platform.frames[4].len(), 2 + 10);

        deliver(&mut cx, Frame::Ack { ack: AckCode::Lost, sn: 9 });
        run(&mut sender, &mut cx, 1);
        assert_eq!(cx.platform.frames.len(), 5);
        assert_eq!(cx.xfer.mode(), Some(Mode::Ack));

        deliver(&mut cx, Frame::Ack { ack: AckCode::Lost, sn: 3 });
        run(&mut sender, &mut cx, 1);
        assert_eq!(
            Frame::decode(&cx.platform.frames[5]),
            Ok(Frame::Data {
                sn: 3,
                payload: chunk(&cx.artifacts.dev_sign, 3).unwrap()
            })
        );

        deliver(&mut cx, Frame::Ack { ack: AckCode::Success, sn: 0 });
        assert_eq!(run(&mut sender, &mut cx, 1), Step::Done);
        assert_eq!(cx.platform.frames.len(), 6);
        assert_eq!(cx.xfer.state(), TransferState::WaitCmd);
    }

    #[test]
    fn refused_announcement_starts_over() {
        let mut cx = context();
        let mut sender = Sender::new(CommandCode::DevPubkey, Region::DevPub);
        run(&mut sender, &mut cx, 1);
        deliver(&mut cx, Frame::Ack { ack: AckCode::Busy, sn: 0 });
        run(&mut sender, &mut cx, 2);
        let announcements = cx
            .platform
            .frames
            .iter()
            .filter(|bytes| matches!(Frame::decode(bytes), Ok(Frame::Command { .. })))
            .count();
        assert_eq!(announcements, 2);
    }

    #[test]
    fn busy_link_is_retried() {
        let mut cx = context();
        cx.platform.busy_sends = 2;
        let mut sender = Sender::new(CommandCode::DevPubkey, Region::DevPub);
        run(&mut sender, &mut cx, 2);
        assert!(cx.platform.frames.is_empty());
        run(&mut sender, &mut cx, 1);
        assert_eq!(cx.platform.frames.len(), 1);
    }
}
