// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator doubles for unit tests.

use std::collections::{HashMap, VecDeque};

use auth_protocol::msc;

use crate::scheduler::Context;
use crate::{
    BusError, Clock, CommandBus, Config, Entropy, PairCodeInput, RecordStore, SoftCrypto,
    StorageError, Transport, TransportError,
};

pub(crate) type TestContext = Context<TestPlatform, SoftCrypto>;

pub(crate) fn context() -> TestContext {
    let _ = pretty_env_logger::try_init();
    Context::new(TestPlatform::default(), SoftCrypto, Config::default())
}

/// Element that answers every read with `payload` repeated to the requested length.
#[derive(Debug, Default)]
pub(crate) struct MockBus {
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) reads: Vec<usize>,
    pub(crate) payload: Vec<u8>,
    /// Status byte of every response.
    pub(crate) status: u8,
    /// Number of responses answered with a nonzero status before `status` applies.
    pub(crate) fail_first: usize,
    /// Polls of the ready line that report busy.
    pub(crate) busy_polls: u32,
    /// Flip a payload bit after the checksum is computed.
    pub(crate) corrupt: bool,
    pending_read: Option<usize>,
}

impl MockBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl CommandBus for MockBus {
    fn begin_write(&mut self, _address: u8, frame: &[u8]) -> Result<(), BusError> {
        self.writes.push(frame.to_vec());
        Ok(())
    }

    fn begin_read(&mut self, _address: u8, len: usize) -> Result<(), BusError> {
        self.reads.push(len);
        self.pending_read = Some(len);
        Ok(())
    }

    fn poll_transfer(&mut self, rx: &mut [u8]) -> bool {
        let Some(len) = self.pending_read.take() else {
            return true;
        };
        let payload: Vec<u8> = if self.payload.is_empty() {
            vec![0; len - 4]
        } else {
            self.payload.iter().copied().cycle().take(len - 4).collect()
        };
        let status = if self.fail_first > 0 {
            self.fail_first -= 1;
            0x01
        } else {
            self.status
        };
        let mut frame = vec![0; len];
        msc::encode_response(status, &payload, &mut frame).unwrap();
        if self.corrupt {
            frame[2] ^= 0x01;
        }
        rx.copy_from_slice(&frame);
        true
    }

    fn ready(&mut self) -> bool {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return false;
        }
        true
    }
}

#[derive(Debug)]
pub(crate) struct TestPlatform {
    pub(crate) bus: MockBus,
    pub(crate) powered: bool,
    /// Frames the scheduler sent to the peer.
    pub(crate) frames: Vec<Vec<u8>>,
    pub(crate) busy_sends: u32,
    /// Value the peer last wrote to the status characteristic.
    pub(crate) status: Option<u32>,
    /// Codes the scheduler wrote to the status characteristic.
    pub(crate) statuses: Vec<u32>,
    pub(crate) busy_status: u32,
    pub(crate) records: HashMap<u16, Vec<u8>>,
    pub(crate) fail_writes: bool,
    pub(crate) fail_erase: bool,
    /// One entry per keypad poll.
    pub(crate) keypad: VecDeque<Vec<u8>>,
    pub(crate) unix_time: u32,
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self {
            bus: MockBus::new(),
            powered: false,
            frames: Vec::new(),
            busy_sends: 0,
            status: None,
            statuses: Vec::new(),
            busy_status: 0,
            records: HashMap::new(),
            fail_writes: false,
            fail_erase: false,
            keypad: VecDeque::new(),
            unix_time: 1_700_000_000,
        }
    }
}

impl Transport for TestPlatform {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.busy_sends > 0 {
            self.busy_sends -= 1;
            return Err(TransportError::Busy);
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn send_status(&mut self, code: u32) -> Result<(), TransportError> {
        if self.busy_status > 0 {
            self.busy_status -= 1;
            return Err(TransportError::Busy);
        }
        self.statuses.push(code);
        Ok(())
    }

    fn receive_status(&mut self) -> Option<u32> {
        self.status
    }
}

impl CommandBus for TestPlatform {
    fn begin_write(&mut self, address: u8, frame: &[u8]) -> Result<(), BusError> {
        self.bus.begin_write(address, frame)
    }

    fn begin_read(&mut self, address: u8, len: usize) -> Result<(), BusError> {
        self.bus.begin_read(address, len)
    }

    fn poll_transfer(&mut self, rx: &mut [u8]) -> bool {
        self.bus.poll_transfer(rx)
    }

    fn ready(&mut self) -> bool {
        self.bus.ready()
    }

    fn set_power(&mut self, on: bool) {
        self.powered = on;
    }
}

impl RecordStore for TestPlatform {
    fn read_record(&mut self, id: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        let record = self.records.get(&id).ok_or(StorageError::NotFound)?;
        let len = record.len().min(buf.len());
        buf[..len].copy_from_slice(&record[..len]);
        Ok(len)
    }

    fn write_record(&mut self, id: u16, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        self.records.insert(id, data.to_vec());
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        if self.fail_erase {
            return Err(StorageError::Io);
        }
        self.records.clear();
        Ok(())
    }
}

impl PairCodeInput for TestPlatform {
    fn poll_input(&mut self, buf: &mut [u8]) -> usize {
        let Some(mut keys) = self.keypad.pop_front() else {
            return 0;
        };
        let len = keys.len().min(buf.len());
        buf[..len].copy_from_slice(&keys[..len]);
        if len < keys.len() {
            self.keypad.push_front(keys.split_off(len));
        }
        len
    }
}

impl Clock for TestPlatform {
    fn unix_time(&self) -> u32 {
        self.unix_time
    }
}

impl Entropy for TestPlatform {
    fn fill_random(&mut self, buf: &mut [u8]) -> bool {
        buf.iter_mut()
            .enumerate()
            .for_each(|(i, b)| *b = 0xA0 ^ i as u8);
        true
    }
}
