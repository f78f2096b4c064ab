// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure element command framing.
//!
//! Request: `[len_hi, len_lo, opcode, param.., xor]` with `len = 1 + param.len()`.
//! Response: `[len_hi, len_lo, payload.., status, xor]` with `len = payload.len() + 1`.
//! The checksum is the XOR of every byte before it.

use consts::{MSC_INVALID_PACKET, MSC_MAX_COMMAND_LEN};

use crate::FrameError;

/// Status recorded when a response fails its checksum.
pub const STATUS_CHECKSUM_ERROR: u8 = 0xFF;
/// Status recorded when a response length field is wrong.
pub const STATUS_LENGTH_MISMATCH: u8 = 0xFE;
/// Status recorded for any other local framing or bus failure.
pub const STATUS_FRAMING_ERROR: u8 = 0xFD;

/// Element command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    Info = 0x01,
    Id = 0x02,
    Sign = 0x10,
    Verify = 0x11,
    Ecdhe = 0x14,
    DevCert = 0x20,
    ManuCert = 0x21,
    RootCert = 0x22,
    CertsLen = 0x28,
    Pubkey = 0x3B,
    WriteMkpk = 0x40,
    ReadMkpk = 0x41,
    Erase = 0x42,
    Random = 0x50,
    Status = 0x52,
    AesCcmEncrypt = 0x60,
    AesCcmDecrypt = 0x61,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::Info,
            0x02 => Self::Id,
            0x10 => Self::Sign,
            0x11 => Self::Verify,
            0x14 => Self::Ecdhe,
            0x20 => Self::DevCert,
            0x21 => Self::ManuCert,
            0x22 => Self::RootCert,
            0x28 => Self::CertsLen,
            0x3B => Self::Pubkey,
            0x40 => Self::WriteMkpk,
            0x41 => Self::ReadMkpk,
            0x42 => Self::Erase,
            0x50 => Self::Random,
            0x52 => Self::Status,
            0x60 => Self::AesCcmEncrypt,
            0x61 => Self::AesCcmDecrypt,
            other => return Err(other),
        })
    }
}

/// Decoded element response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'a> {
    pub status: u8,
    pub payload: &'a [u8],
}

pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Bytes to read back for a response carrying `payload_len` bytes.
pub const fn response_frame_len(payload_len: usize) -> usize {
    payload_len + 4
}

pub fn encode_request(opcode: u8, param: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    encode(opcode, param, true, out)
}

/// Encodes a response the way the element lays it out. Used by simulators.
pub fn encode_response(status: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    encode(status, payload, false, out)
}

fn encode(tag: u8, body: &[u8], tag_first: bool, out: &mut [u8]) -> Result<usize, FrameError> {
    let len = body.len() + 1;
    if len > MSC_MAX_COMMAND_LEN {
        return Err(FrameError::ParamTooLarge);
    }
    let total = len + 3;
    if out.len() < total {
        return Err(FrameError::BufferTooSmall);
    }

    out[..2].copy_from_slice(&(len as u16).to_be_bytes());
    if tag_first {
        out[2] = tag;
        out[3..3 + body.len()].copy_from_slice(body);
    } else {
        out[2..2 + body.len()].copy_from_slice(body);
        out[2 + body.len()] = tag;
    }
    out[2 + len] = xor_checksum(&out[..2 + len]);
    Ok(total)
}

/// Splits a complete request frame into opcode and parameter.
///
/// The whole frame is checked against its checksum before the length field is
/// trusted, so any single corrupted byte is reported as [`FrameError::Checksum`].
pub fn decode_request(frame: &[u8]) -> Result<(u8, &[u8]), FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::Truncated);
    }
    if xor_checksum(frame) != 0 {
        return Err(FrameError::Checksum);
    }
    let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if len == 0 || len + 3 != frame.len() {
        return Err(FrameError::LengthMismatch {
            expected: frame.len().saturating_sub(3),
            actual: len,
        });
    }
    Ok((frame[2], &frame[3..2 + len]))
}

/// Decodes a response read back with [`response_frame_len`] bytes.
pub fn decode_response(frame: &[u8], payload_len: usize) -> Result<Response<'_>, FrameError> {
    if frame.len() < response_frame_len(payload_len) {
        return Err(FrameError::Truncated);
    }
    let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if len != payload_len + 1 {
        return Err(FrameError::LengthMismatch {
            expected: payload_len + 1,
            actual: len,
        });
    }
    if xor_checksum(&frame[..2 + len]) != frame[2 + len] {
        return Err(FrameError::Checksum);
    }
    let status = frame[2 + payload_len];
    if status == MSC_INVALID_PACKET {
        return Err(FrameError::InvalidPacket);
    }
    Ok(Response {
        status,
        payload: &frame[2..2 + payload_len],
    })
}
