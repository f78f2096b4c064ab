// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Codes exchanged on the status characteristic.
//!
//! The high nibble selects the procedure family; the peer writes the `*_START`
//! codes to begin a procedure and the device answers with the outcome codes.

pub const REG_TYPE: u32 = 0x10;
pub const REG_START: u32 = REG_TYPE;
pub const REG_SUCCESS: u32 = REG_TYPE + 1;
pub const REG_FAILED: u32 = REG_TYPE + 2;
pub const REG_VERIFY_SUCC: u32 = REG_TYPE + 3;
pub const REG_VERIFY_FAIL: u32 = REG_TYPE + 4;

pub const LOG_TYPE: u32 = 0x20;
pub const LOG_START: u32 = LOG_TYPE;
pub const LOG_SUCCESS: u32 = LOG_TYPE + 1;
pub const LOG_FAILED: u32 = LOG_TYPE + 2;

pub const SHARED_TYPE: u32 = 0x30;
pub const SHARED_LOG_START: u32 = SHARED_TYPE;
pub const SHARED_LOG_SUCCESS: u32 = SHARED_TYPE + 1;
pub const SHARED_LOG_FAILED: u32 = SHARED_TYPE + 2;
pub const SHARED_LOG_START_W_CERT: u32 = SHARED_TYPE + 3;

pub const SYS_TYPE: u32 = 0xA0;
pub const SYS_KEY_RESTORE: u32 = SYS_TYPE + 1;
pub const SYS_KEY_DELETE: u32 = SYS_TYPE + 2;

pub const ERR_TYPE: u32 = 0xE0;
pub const ERR_NOT_REGISTERED: u32 = ERR_TYPE + 1;
pub const ERR_REGISTERED: u32 = ERR_TYPE + 2;

/// Procedure family of a status code.
pub const fn family(code: u32) -> u32 {
    code & 0xF0
}
