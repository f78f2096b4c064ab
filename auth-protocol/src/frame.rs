// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{CHUNK_SIZE, FRAME_SIZE};

use crate::FrameError;

const MODE_COMMAND: u8 = 0;
const MODE_ACK: u8 = 1;

/// Artifact announced by a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandCode {
    DevList = 0,
    DevCert,
    DevManuCert,
    DevPubkey,
    DevSignature,
    DevLoginInfo,
    DevShareInfo,
}

impl TryFrom<u8> for CommandCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::DevList,
            1 => Self::DevCert,
            2 => Self::DevManuCert,
            3 => Self::DevPubkey,
            4 => Self::DevSignature,
            5 => Self::DevLoginInfo,
            6 => Self::DevShareInfo,
            other => return Err(FrameError::UnknownCommand(other)),
        })
    }
}

/// Acknowledgment code carried by an ack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AckCode {
    Success = 0,
    Ready,
    Busy,
    Timeout,
    Cancel,
    Lost,
}

impl TryFrom<u8> for AckCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Success,
            1 => Self::Ready,
            2 => Self::Busy,
            3 => Self::Timeout,
            4 => Self::Cancel,
            5 => Self::Lost,
            other => return Err(FrameError::UnknownAck(other)),
        })
    }
}

/// One notification on the reliable transfer link.
///
/// Sequence number 0 marks a control frame; data chunks are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Sender announces an artifact and how many chunks it spans.
    Command { cmd: CommandCode, chunks: u16 },
    /// Receiver reports progress. `sn` names the missing chunk for [`AckCode::Lost`].
    Ack { ack: AckCode, sn: u16 },
    /// One chunk of the artifact being transferred.
    Data { sn: u16, payload: &'a [u8] },
}

impl<'a> Frame<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < 2 {
            return Err(FrameError::Truncated);
        }
        let sn = u16::from_le_bytes([bytes[0], bytes[1]]);
        let body = &bytes[2..];

        if sn != 0 {
            if body.is_empty() {
                return Err(FrameError::Truncated);
            }
            if body.len() > CHUNK_SIZE {
                return Err(FrameError::PayloadTooLong);
            }
            return Ok(Self::Data { sn, payload: body });
        }

        if body.len() < 4 {
            return Err(FrameError::Truncated);
        }
        let arg = u16::from_le_bytes([body[2], body[3]]);
        match body[0] {
            MODE_COMMAND => Ok(Self::Command {
                cmd: CommandCode::try_from(body[1])?,
                chunks: arg,
            }),
            MODE_ACK => Ok(Self::Ack {
                ack: AckCode::try_from(body[1])?,
                sn: arg,
            }),
            mode => Err(FrameError::UnknownMode(mode)),
        }
    }

    /// Writes the frame into `out` and returns the number of bytes used.
    pub fn encode(&self, out: &mut [u8; FRAME_SIZE]) -> Result<usize, FrameError> {
        match *self {
            Self::Command { cmd, chunks } => Ok(encode_control(out, MODE_COMMAND, cmd as u8, chunks)),
            Self::Ack { ack, sn } => Ok(encode_control(out, MODE_ACK, ack as u8, sn)),
            Self::Data { sn, payload } => {
                if payload.len() > CHUNK_SIZE {
                    return Err(FrameError::PayloadTooLong);
                }
                out[..2].copy_from_slice(&sn.to_le_bytes());
                out[2..2 + payload.len()].copy_from_slice(payload);
                Ok(2 + payload.len())
            }
        }
    }
}

fn encode_control(out: &mut [u8; FRAME_SIZE], mode: u8, kind: u8, arg: u16) -> usize {
    out[..2].copy_from_slice(&0u16.to_le_bytes());
    out[2] = mode;
    out[3] = kind;
    out[4..6].copy_from_slice(&arg.to_le_bytes());
    6
}

/// Number of chunks needed to carry `len` bytes.
pub fn chunk_count(len: usize) -> u16 {
    len.div_ceil(CHUNK_SIZE) as u16
}

/// Size of the final chunk. An exact multiple ends on a full chunk.
pub fn last_chunk_size(len: usize) -> usize {
    match len % CHUNK_SIZE {
        0 => CHUNK_SIZE,
        rem => rem,
    }
}

/// Bytes of `buf` carried by chunk `sn`, if it exists.
pub fn chunk(buf: &[u8], sn: u16) -> Option<&[u8]> {
    if sn == 0 {
        return None;
    }
    let start = (sn as usize - 1) * CHUNK_SIZE;
    if start >= buf.len() {
        return None;
    }
    let end = (start + CHUNK_SIZE).min(buf.len());
    Some(&buf[start..end])
}

/// Copies a received chunk into its slot in `buf`, truncating at the buffer end.
pub fn place_chunk(buf: &mut [u8], sn: u16, payload: &[u8]) -> Result<usize, FrameError> {
    if sn == 0 {
        return Err(FrameError::Truncated);
    }
    let start = (sn as usize - 1) * CHUNK_SIZE;
    if start >= buf.len() {
        return Err(FrameError::BufferTooSmall);
    }
    let len = payload.len().min(CHUNK_SIZE).min(buf.len() - start);
    buf[start..start + len].copy_from_slice(&payload[..len]);
    Ok(len)
}

/// Forward-only search for chunks that never arrived.
///
/// A chunk whose first two bytes are zero is treated as missing, so the
/// receive buffer has to be zeroed before a transfer starts. A chunk that
/// legitimately begins with two zero bytes is indistinguishable from a lost one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostChunkScan {
    checked: u16,
}

impl LostChunkScan {
    pub const fn new() -> Self {
        Self { checked: 1 }
    }

    pub fn reset(&mut self) {
        self.checked = 1;
    }

    /// Returns the first missing chunk at or after the cursor, or `None` once
    /// all `count` chunks look present. The cursor stays on a missing chunk so
    /// it is checked again after a resend, and rewinds once the scan completes.
    pub fn next_lost(&mut self, buf: &[u8], count: u16) -> Option<u16> {
        while self.checked <= count {
            let present = chunk(buf, self.checked)
                .map(|bytes| bytes.iter().take(2).any(|&b| b != 0))
                .unwrap_or(false);
            if !present {
                return Some(self.checked);
            }
            self.checked += 1;
        }
        self.checked = 1;
        None
    }
}

impl Default for LostChunkScan {
    fn default() -> Self {
        Self::new()
    }
}
