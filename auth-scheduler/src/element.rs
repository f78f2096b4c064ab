// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Request/response exchange with the secure element.

use auth_protocol::msc::{self, Opcode, STATUS_FRAMING_ERROR};
use auth_protocol::FrameError;
use consts::{MSC_ADDRESS, MSC_FRAME_CAPACITY, MSC_MAX_RETRIES};

use crate::{CommandBus, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ElementError {
    /// Every attempt failed; `status` is the one seen last.
    RetriesExhausted { opcode: Opcode, status: u8 },
    /// Request could not be framed.
    Frame(FrameError),
}

impl From<FrameError> for ElementError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

impl core::fmt::Display for ElementError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RetriesExhausted { opcode, status } => write!(
                f,
                "element command {opcode:?} failed {} times, last status {status:#04x}",
                MSC_MAX_RETRIES + 1
            ),
            Self::Frame(err) => write!(f, "cannot frame element request: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Write,
    Written,
    AwaitReady,
    Read,
    Complete,
}

/// One element command in flight.
///
/// Any failure, whether a bus error, a bad frame or a nonzero status,
/// restarts the whole exchange on the next poll. After the first attempt and
/// [`MSC_MAX_RETRIES`] retries the command is given up.
pub struct Exchange {
    state: State,
    opcode: Opcode,
    response_len: usize,
    attempts: u8,
    tx: [u8; MSC_FRAME_CAPACITY],
    tx_len: usize,
    rx: [u8; MSC_FRAME_CAPACITY],
}

impl Exchange {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            opcode: Opcode::Status,
            response_len: 0,
            attempts: 0,
            tx: [0; MSC_FRAME_CAPACITY],
            tx_len: 0,
            rx: [0; MSC_FRAME_CAPACITY],
        }
    }

    /// Frames a request. The bus is not touched until the next [`Exchange::poll`].
    pub fn start(
        &mut self,
        opcode: Opcode,
        param: &[u8],
        response_len: usize,
    ) -> Result<(), ElementError> {
        if msc::response_frame_len(response_len) > MSC_FRAME_CAPACITY {
            return Err(FrameError::BufferTooSmall.into());
        }
        self.tx_len = msc::encode_request(opcode as u8, param, &mut self.tx)?;
        self.opcode = opcode;
        self.response_len = response_len;
        self.attempts = 0;
        self.state = State::Write;
        trace!("msc {:?}: {} byte request", opcode, self.tx_len);
        Ok(())
    }

    /// Advances the exchange as far as the bus allows.
    pub fn poll<B: CommandBus>(&mut self, bus: &mut B) -> Result<Step, ElementError> {
        loop {
            match self.state {
                State::Idle | State::Complete => return Ok(Step::Done),
                State::Write => {
                    self.attempts += 1;
                    match bus.begin_write(MSC_ADDRESS, &self.tx[..self.tx_len]) {
                        Ok(()) => self.state = State::Written,
                        Err(err) => {
                            warn!("msc {:?}: write failed: {:?}", self.opcode, err);
                            return self.retry(STATUS_FRAMING_ERROR);
                        }
                    }
                }
                State::Written => {
                    if !bus.poll_transfer(&mut []) {
                        return Ok(Step::Blocked);
                    }
                    self.state = State::AwaitReady;
                }
                State::AwaitReady => {
                    if !bus.ready() {
                        return Ok(Step::Blocked);
                    }
                    let len = msc::response_frame_len(self.response_len);
                    match bus.begin_read(MSC_ADDRESS, len) {
                        Ok(()) => self.state = State::Read,
                        Err(err) => {
                            warn!("msc {:?}: read failed: {:?}", self.opcode, err);
                            return self.retry(STATUS_FRAMING_ERROR);
                        }
                    }
                }
                State::Read => {
                    let len = msc::response_frame_len(self.response_len);
                    if !bus.poll_transfer(&mut self.rx[..len]) {
                        return Ok(Step::Blocked);
                    }
                    let status = match msc::decode_response(&self.rx[..len], self.response_len) {
                        Ok(response) => response.status,
                        Err(err) => {
                            warn!("msc {:?}: {}", self.opcode, err);
                            err.status()
                        }
                    };
                    if status != 0 {
                        return self.retry(status);
                    }
                    self.state = State::Complete;
                    return Ok(Step::Done);
                }
            }
        }
    }

    fn retry(&mut self, status: u8) -> Result<Step, ElementError> {
        if self.attempts > MSC_MAX_RETRIES {
            self.state = State::Idle;
            return Err(ElementError::RetriesExhausted {
                opcode: self.opcode,
                status,
            });
        }
        warn!(
            "msc {:?}: status {:#x}, retry {}/{}",
            self.opcode, status, self.attempts, MSC_MAX_RETRIES
        );
        self.state = State::Write;
        Ok(Step::Blocked)
    }

    /// Payload of a completed exchange.
    pub fn response(&self) -> &[u8] {
        match self.state {
            State::Complete => &self.rx[2..2 + self.response_len],
            _ => &[],
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.attempts = 0;
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Writes issued for the current command.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}
