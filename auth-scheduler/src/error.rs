// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_protocol::FrameError;

use crate::Procedure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Another procedure has not reached its terminal event yet.
    ProcedureActive(Procedure),
    /// Status code does not start any procedure.
    UnknownProcedure(u32),
    /// Peer frame could not be decoded.
    Frame(FrameError),
    /// Persisted key record could not be encoded or decoded.
    Record,
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ProcedureActive(procedure) => write!(f, "procedure {procedure:?} is still running"),
            Self::UnknownProcedure(code) => write!(f, "no procedure starts with code {code:#x}"),
            Self::Frame(err) => write!(f, "bad frame: {err}"),
            Self::Record => write!(f, "malformed key record"),
        }
    }
}
