// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Payload bytes carried by one reliable transfer data frame.
/// A notification is 20 bytes: a 2-byte sequence number followed by the chunk.
pub const CHUNK_SIZE: usize = 18;

/// Size of one reliable transfer frame on the wire.
pub const FRAME_SIZE: usize = CHUNK_SIZE + 2;

/// Timeout before a receiver scans for lost chunks, in milliseconds.
pub const TRANSFER_TIMEOUT_MS: u32 = 2_000;

/// Every procedure must reach a terminal event within this window.
pub const PROCEDURE_TIMEOUT_MS: u32 = 20_000;

/// Default scheduler tick interval in 32.768 kHz RTC ticks (about 1.95 ms).
pub const SCHEDULER_INTERVAL: u32 = 64;

/// Number of slots in the scheduler event ring. Must be a power of two.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// 7-bit bus address of the secure element.
pub const MSC_ADDRESS: u8 = 0x2A;

/// Largest `len` field (opcode or status byte plus payload) the element accepts.
pub const MSC_MAX_COMMAND_LEN: usize = 512;

/// Length prefix, body, status and checksum of the largest frame.
pub const MSC_FRAME_CAPACITY: usize = MSC_MAX_COMMAND_LEN + 4;

/// Retries after the first failed attempt before an element command is fatal.
pub const MSC_MAX_RETRIES: u8 = 5;

/// Status byte the element returns when it could not parse a request.
pub const MSC_INVALID_PACKET: u8 = 0x0F;

/// Largest certificate the element may hand out.
pub const MAX_CERT_LEN: usize = 512;

/// Digits in the out-of-band pairing code.
pub const PAIR_CODE_LEN: usize = 6;

/// Allowed clock drift, in seconds, when checking capability key expiry.
pub const RTC_DRIFT_SECS: u32 = 300;

/// Version reported to the peer in the device info record.
pub const PROTOCOL_VERSION: u16 = 0x0201;

/// Record id of the persisted key material.
pub const KEY_RECORD_ID: u16 = 0xBEEF;

/// Nonce for the handshake blobs and the wrapped long-term key.
pub const CCM_NONCE: [u8; 12] = [
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B,
];

/// Length of the message authentication code appended to CCM ciphertexts.
pub const CCM_MIC_LEN: usize = 4;

/// Associated data flag appended to the device id when opening a capability key.
pub const CAPABILITY_AAD_FLAG: u8 = 0x01;

pub const LOGIN_SALT: &[u8] = b"smartcfg-login-salt";
pub const LOGIN_INFO: &[u8] = b"smartcfg-login-info";
pub const SHARE_SALT: &[u8] = b"smartcfg-share-salt";
pub const SHARE_INFO: &[u8] = b"smartcfg-share-info";
pub const CLOUD_SALT: &[u8] = b"smartcfg-cloud-salt";
pub const CLOUD_INFO: &[u8] = b"smartcfg-cloud-info";

/// Context string for the long-term key. The pairing code is the salt.
pub const SETUP_INFO: &[u8] = b"smartcfg-setup-info";
