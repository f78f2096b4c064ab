// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use auth_scheduler::{RecordStore, StorageError};

/// Record store kept in memory. Survives a simulated reboot with the platform.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<u16, Vec<u8>>,
    pub fail_writes: bool,
    pub fail_erase: bool,
}

impl MemoryStore {
    pub fn get(&self, id: u16) -> Option<&[u8]> {
        self.records.get(&id).map(Vec::as_slice)
    }

    pub fn insert(&mut self, id: u16, data: &[u8]) {
        self.records.insert(id, data.to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
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
