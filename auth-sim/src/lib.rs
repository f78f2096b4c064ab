// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host simulation of a device running the auth scheduler.
//!
//! [`SimPlatform`] stands in for the board: a software secure element, an
//! in-memory record store and a scripted keypad. Its transport is wired to a
//! [`Peer`] playing the phone app. [`Simulation`] ticks the scheduler and
//! carries the phone's frames back to it.

mod credentials;
pub mod element;
mod keypad;
mod peer;
mod platform;
mod simulation;
mod store;

pub use credentials::{capability, login_blob, share_blob, Credentials};
pub use element::FakeElement;
pub use keypad::Keypad;
pub use peer::Peer;
pub use platform::{SimPlatform, START_TIME};
pub use simulation::Simulation;
pub use store::MemoryStore;
