// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Terminal outcome of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerEvent {
    RegSuccess,
    RegFailed,
    AdminLoginSuccess,
    AdminLoginFailed,
    ShareLoginSuccess,
    ShareLoginFailed,
    Timeout,
    KeyNotFound,
    KeyFound,
    KeyDelFail,
    KeyDelSucc,
    /// The secure element kept failing a command after every retry.
    ElementFatal,
}

impl SchedulerEvent {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::RegSuccess
                | Self::AdminLoginSuccess
                | Self::ShareLoginSuccess
                | Self::KeyFound
                | Self::KeyDelSucc
        )
    }
}
