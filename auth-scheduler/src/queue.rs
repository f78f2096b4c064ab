// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::SchedulerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    CapacityExceeded,
    Empty,
}

/// Ring of pending scheduler events.
///
/// Procedure threads produce, the monitor consumes. One slot always stays
/// free to tell a full ring from an empty one, so `N - 1` events fit.
pub struct EventQueue<const N: usize> {
    head: usize,
    tail: usize,
    slots: [SchedulerEvent; N],
}

impl<const N: usize> EventQueue<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "event queue capacity must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            head: 0,
            tail: 0,
            slots: [SchedulerEvent::Timeout; N],
        }
    }

    #[inline]
    fn next(idx: usize) -> usize {
        (idx + 1) & Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        Self::next(self.tail) == self.head
    }

    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) & Self::MASK
    }

    pub fn enqueue(&mut self, event: SchedulerEvent) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::CapacityExceeded);
        }
        self.slots[self.tail] = event;
        self.tail = Self::next(self.tail);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Result<SchedulerEvent, QueueError> {
        if self.is_empty() {
            return Err(QueueError::Empty);
        }
        let event = self.slots[self.head];
        self.head = Self::next(self.head);
        Ok(event)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_until_full() {
        let mut queue = EventQueue::<8>::new();
        assert_eq!(queue.dequeue(), Err(QueueError::Empty));

        let events = [
            SchedulerEvent::RegSuccess,
            SchedulerEvent::Timeout,
            SchedulerEvent::KeyFound,
            SchedulerEvent::KeyDelFail,
            SchedulerEvent::AdminLoginFailed,
            SchedulerEvent::ShareLoginSuccess,
            SchedulerEvent::RegFailed,
        ];
        for event in events {
            queue.enqueue(event).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), 7);
        assert_eq!(
            queue.enqueue(SchedulerEvent::KeyNotFound),
            Err(QueueError::CapacityExceeded)
        );

        for event in events {
            assert_eq!(queue.dequeue(), Ok(event));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn indices_wrap_around() {
        let mut queue = EventQueue::<4>::new();
        for round in 0..10 {
            let event = if round % 2 == 0 {
                SchedulerEvent::KeyFound
            } else {
                SchedulerEvent::KeyNotFound
            };
            queue.enqueue(event).unwrap();
            queue.enqueue(SchedulerEvent::Timeout).unwrap();
            assert_eq!(queue.len(), 2);
            assert_eq!(queue.dequeue(), Ok(event));
            assert_eq!(queue.dequeue(), Ok(SchedulerEvent::Timeout));
        }
        queue.enqueue(SchedulerEvent::RegSuccess).unwrap();
        queue.clear();
        assert!(queue.is_empty());
    }
}
