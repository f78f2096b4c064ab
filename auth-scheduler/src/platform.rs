// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborators the scheduler drives but does not own the implementation of.

/// Notification link to the peer.
pub trait Transport {
    /// Queues one reliable transfer frame. Fails when the link cannot take
    /// more notifications right now; the caller retries on the next tick.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Writes a procedure outcome code to the status characteristic.
    fn send_status(&mut self, code: u32) -> Result<(), TransportError>;

    /// Last code the peer wrote to the status characteristic.
    fn receive_status(&mut self) -> Option<u32>;
}

/// Command bus wired to the secure element.
///
/// Transfers are asynchronous: `begin_*` starts one and `poll_transfer`
/// reports its completion.
pub trait CommandBus {
    fn begin_write(&mut self, address: u8, frame: &[u8]) -> Result<(), BusError>;

    fn begin_read(&mut self, address: u8, len: usize) -> Result<(), BusError>;

    /// Returns true once the pending transfer has finished. For a read, the
    /// received bytes have been copied into `rx`.
    fn poll_transfer(&mut self, rx: &mut [u8]) -> bool;

    /// State of the element's ready line.
    fn ready(&mut self) -> bool;

    /// Switches the element power rail.
    fn set_power(&mut self, _on: bool) {}
}

/// Persistent key/value record store.
pub trait RecordStore {
    /// Reads record `id` into `buf` and returns its length.
    fn read_record(&mut self, id: u16, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write_record(&mut self, id: u16, data: &[u8]) -> Result<(), StorageError>;

    fn erase_all(&mut self) -> Result<(), StorageError>;
}

/// Non-blocking keypad used to enter the pairing code.
pub trait PairCodeInput {
    /// Moves up to `buf.len()` pending characters into `buf`.
    fn poll_input(&mut self, buf: &mut [u8]) -> usize;
}

/// Wall clock.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn unix_time(&self) -> u32;
}

/// Hardware random number generator.
pub trait Entropy {
    /// Fills `buf`; returns false when not enough entropy is available yet.
    fn fill_random(&mut self, buf: &mut [u8]) -> bool;
}

/// Everything a scheduler needs from the board.
pub trait Platform: Transport + CommandBus + RecordStore + PairCodeInput + Clock + Entropy {}

impl<T> Platform for T where T: Transport + CommandBus + RecordStore + PairCodeInput + Clock + Entropy {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Notification queue is full.
    Busy,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    Busy,
    Nack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    NotFound,
    Io,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Io => write!(f, "storage access failed"),
        }
    }
}
