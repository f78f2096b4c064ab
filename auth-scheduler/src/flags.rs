// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use bitflags::bitflags;

bitflags! {
    /// Intermediate artifacts of a procedure run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Artifact: u16 {
        const MSC_INFO = 1 << 0;
        const APP_PUB = 1 << 1;
        const DEV_PUB = 1 << 2;
        const EPH_KEY = 1 << 3;
        const DEV_SHA = 1 << 4;
        const DEV_SIGN = 1 << 5;
        const LTMK = 1 << 6;
        const SESSION_KEY = 1 << 7;
        const MKPK = 1 << 8;
        const DEV_CERT = 1 << 9;
        const MANU_CERT = 1 << 10;
        /// The signed registration record reached the peer.
        const ENCRYPTED_REGISTRATION_BLOB = 1 << 11;
        const ENCRYPTED_LOGIN_BLOB = 1 << 12;
        const ENCRYPTED_SHARE_BLOB = 1 << 13;
    }
}

/// Readiness markers shared by the threads of one procedure run.
///
/// Each marker goes from unset to set at most once per run and is only
/// cleared when the next procedure starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Flags(Artifact);

impl Flags {
    pub(crate) fn set(&mut self, artifact: Artifact) {
        debug_assert!(
            !self.0.intersects(artifact),
            "artifact {:?} marked ready twice",
            artifact
        );
        self.0.insert(artifact);
    }

    pub(crate) fn is_ready(&self, artifact: Artifact) -> bool {
        self.0.contains(artifact)
    }

    pub(crate) fn clear(&mut self) {
        self.0 = Artifact::empty();
    }
}

impl Default for Artifact {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_independent() {
        let mut flags = Flags::default();
        flags.set(Artifact::APP_PUB);
        flags.set(Artifact::EPH_KEY);
        assert!(flags.is_ready(Artifact::APP_PUB));
        assert!(!flags.is_ready(Artifact::DEV_PUB));
        assert!(flags.is_ready(Artifact::APP_PUB | Artifact::EPH_KEY));
        flags.clear();
        assert!(!flags.is_ready(Artifact::APP_PUB));
    }

    #[test]
    #[should_panic(expected = "marked ready twice")]
    fn setting_twice_is_caught_in_debug() {
        let mut flags = Flags::default();
        flags.set(Artifact::LTMK);
        flags.set(Artifact::LTMK);
    }
}
