// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cooperative authentication scheduler.
//!
//! A [`Scheduler`] owns every piece of procedure state and is driven by two
//! entry points: [`Scheduler::tick`], called from a periodic timer, and
//! [`Scheduler::on_frame`], called for each notification the peer writes.
//! Each procedure runs as three cooperative threads (secure element, transfer
//! and auth) that hand artifacts to each other through write-once flags.

#![cfg_attr(not(test), no_std)]

mod fmt;

mod artifacts;
mod config;
mod crypto;
mod element;
mod error;
mod event;
mod flags;
pub mod keys;
mod monitor;
mod platform;
mod procedure;
mod queue;
mod scheduler;
mod thread;
mod timer;
mod transfer;

#[cfg(test)]
mod testing;

pub use artifacts::Region;
pub use config::Config;
pub use crypto::{Crypto, CryptoError, SoftCrypto};
pub use element::{ElementError, Exchange};
pub use error::Error;
pub use event::SchedulerEvent;
pub use flags::Artifact;
pub use keys::{Authorization, CapabilityError, KeyRecord, SessionKeys};
pub use monitor::Monitor;
pub use platform::{
    BusError, Clock, CommandBus, Entropy, PairCodeInput, Platform, RecordStore, StorageError,
    Transport, TransportError,
};
pub use procedure::Procedure;
pub use queue::{EventQueue, QueueError};
pub use scheduler::Scheduler;
pub use thread::{Scheduled, Step, Thread};
pub use timer::Timer;
pub use transfer::{Mode, Session, TransferState};
