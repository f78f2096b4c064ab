// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_scheduler::{
    BusError, Clock, CommandBus, Entropy, PairCodeInput, RecordStore, StorageError, Transport,
    TransportError,
};
use consts::PAIR_CODE_LEN;

use crate::{FakeElement, Keypad, MemoryStore, Peer};

/// Wall clock the simulation starts at.
pub const START_TIME: u32 = 1_700_000_000;

/// Board the scheduler runs on, made of simulated parts.
#[derive(Debug)]
pub struct SimPlatform {
    pub peer: Peer,
    pub element: FakeElement,
    pub store: MemoryStore,
    pub keypad: Keypad,
    pub unix_time: u32,
    /// Sends that fail as busy before the link takes frames again.
    pub congestion: u32,
    pub disconnected: bool,
    seed: u32,
}

impl SimPlatform {
    /// Platform whose user types the same code the phone shows.
    pub fn new(pair_code: [u8; PAIR_CODE_LEN]) -> Self {
        Self {
            peer: Peer::new(pair_code),
            element: FakeElement::new(b"secure element"),
            store: MemoryStore::default(),
            keypad: Keypad::new(pair_code),
            unix_time: START_TIME,
            congestion: 0,
            disconnected: false,
            seed: 0x1234_5678,
        }
    }

    fn link(&mut self) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        if self.congestion > 0 {
            self.congestion -= 1;
            return Err(TransportError::Busy);
        }
        Ok(())
    }
}

impl Transport for SimPlatform {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.link()?;
        self.peer.on_frame(frame);
        Ok(())
    }

    fn send_status(&mut self, code: u32) -> Result<(), TransportError> {
        self.link()?;
        self.peer.on_status(code);
        Ok(())
    }

    fn receive_status(&mut self) -> Option<u32> {
        self.peer.status()
    }
}

impl CommandBus for SimPlatform {
    fn begin_write(&mut self, address: u8, frame: &[u8]) -> Result<(), BusError> {
        self.element.begin_write(address, frame)
    }

    fn begin_read(&mut self, address: u8, len: usize) -> Result<(), BusError> {
        self.element.begin_read(address, len)
    }

    fn poll_transfer(&mut self, rx: &mut [u8]) -> bool {
        self.element.poll_transfer(rx)
    }

    fn ready(&mut self) -> bool {
        self.element.ready()
    }

    fn set_power(&mut self, on: bool) {
        self.element.set_power(on);
    }
}

impl RecordStore for SimPlatform {
    fn read_record(&mut self, id: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.store.read_record(id, buf)
    }

    fn write_record(&mut self, id: u16, data: &[u8]) -> Result<(), StorageError> {
        self.store.write_record(id, data)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.store.erase_all()
    }
}

impl PairCodeInput for SimPlatform {
    fn poll_input(&mut self, buf: &mut [u8]) -> usize {
        self.keypad.poll_input(buf)
    }
}

impl Clock for SimPlatform {
    fn unix_time(&self) -> u32 {
        self.unix_time
    }
}

impl Entropy for SimPlatform {
    fn fill_random(&mut self, buf: &mut [u8]) -> bool {
        for byte in buf {
            // xorshift32
            self.seed ^= self.seed << 13;
            self.seed ^= self.seed >> 17;
            self.seed ^= self.seed << 5;
            *byte = self.seed as u8;
        }
        true
    }
}
