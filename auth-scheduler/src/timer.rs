// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::Config;

/// Relative deadline measured in scheduler ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    start: u32,
    interval: u32,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            start: 0,
            interval: 0,
        }
    }

    /// Arms the timer to expire `ms` milliseconds after tick `now`.
    pub fn set(&mut self, now: u32, ms: u32, config: &Config) {
        self.start = now;
        self.interval = config.ticks(ms);
    }

    pub fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.start) >= self.interval
    }
}
