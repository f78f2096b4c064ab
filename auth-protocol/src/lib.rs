// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire formats shared by the device scheduler and its peers.
//!
//! Two links are described here: the 20-byte notification frames of the
//! reliable chunked transfer that runs over BLE, and the length-prefixed,
//! XOR-checksummed frames exchanged with the secure element over the
//! command bus.

#![cfg_attr(not(test), no_std)]

mod frame;
pub mod msc;
pub mod opcode;

#[cfg(test)]
mod tests;

pub use frame::{
    chunk, chunk_count, last_chunk_size, place_chunk, AckCode, CommandCode, Frame, LostChunkScan,
};

/// Errors raised while encoding or decoding frames on either link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Frame ends before its declared content.
    Truncated,
    /// Control frame carries a mode other than command or acknowledgment.
    UnknownMode(u8),
    /// Command frame names an artifact type outside the known set.
    UnknownCommand(u8),
    /// Acknowledgment frame carries an unknown code.
    UnknownAck(u8),
    /// Data frame carries more than one chunk of payload.
    PayloadTooLong,
    /// Element request body would exceed the bus limit.
    ParamTooLarge,
    /// Output buffer cannot hold the encoded frame.
    BufferTooSmall,
    /// Response length field disagrees with the expected payload size.
    LengthMismatch { expected: usize, actual: usize },
    /// XOR checksum does not match.
    Checksum,
    /// Element reported that it could not parse the request.
    InvalidPacket,
}

impl FrameError {
    /// Status byte recorded for an element exchange that failed locally.
    pub fn status(&self) -> u8 {
        match self {
            Self::Checksum => msc::STATUS_CHECKSUM_ERROR,
            Self::LengthMismatch { .. } => msc::STATUS_LENGTH_MISMATCH,
            Self::InvalidPacket => consts::MSC_INVALID_PACKET,
            _ => msc::STATUS_FRAMING_ERROR,
        }
    }
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::UnknownMode(mode) => write!(f, "unknown control mode {mode}"),
            Self::UnknownCommand(cmd) => write!(f, "unknown transfer command {cmd}"),
            Self::UnknownAck(ack) => write!(f, "unknown acknowledgment {ack}"),
            Self::PayloadTooLong => write!(f, "data frame payload longer than one chunk"),
            Self::ParamTooLarge => write!(f, "element request parameter too large"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "response length {actual}, expected {expected}")
            }
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::InvalidPacket => write!(f, "element reported an invalid packet"),
        }
    }
}
