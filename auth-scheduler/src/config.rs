// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{PROCEDURE_TIMEOUT_MS, SCHEDULER_INTERVAL, TRANSFER_TIMEOUT_MS};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Tick period in 32.768 kHz RTC ticks.
    pub interval: u32,
    /// Deadline for a whole procedure.
    pub procedure_timeout_ms: u32,
    /// Wait before a receiver looks for lost chunks.
    pub transfer_timeout_ms: u32,
}

impl Config {
    /// Converts a duration to scheduler ticks, saturating at `u32::MAX`.
    pub fn ticks(&self, ms: u32) -> u32 {
        let ticks = (u64::from(ms) << 5) / u64::from(self.interval.max(1));
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: SCHEDULER_INTERVAL,
            procedure_timeout_ms: PROCEDURE_TIMEOUT_MS,
            transfer_timeout_ms: TRANSFER_TIMEOUT_MS,
        }
    }
}
