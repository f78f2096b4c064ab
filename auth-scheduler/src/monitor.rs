// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Config, EventQueue, SchedulerEvent, Timer};

/// Watches the active procedure for its terminal event.
#[derive(Debug, Default)]
pub struct Monitor {
    deadline: Timer,
}

impl Monitor {
    pub const fn new() -> Self {
        Self {
            deadline: Timer::new(),
        }
    }

    /// Starts the procedure deadline.
    pub fn arm(&mut self, now: u32, config: &Config) {
        self.deadline.set(now, config.procedure_timeout_ms, config);
    }

    /// Drains the queue and returns the procedure's outcome, if any.
    ///
    /// An expired deadline queues [`SchedulerEvent::Timeout`] behind anything
    /// the threads already produced. Only the first event is reported; the
    /// rest are logged and dropped.
    pub fn poll<const N: usize>(
        &mut self,
        now: u32,
        events: &mut EventQueue<N>,
    ) -> Option<SchedulerEvent> {
        if self.deadline.expired(now) && events.enqueue(SchedulerEvent::Timeout).is_err() {
            warn!("event queue full at procedure deadline");
        }
        let outcome = events.dequeue().ok()?;
        while let Ok(extra) = events.dequeue() {
            warn!("dropping {:?} after {:?}", extra, outcome);
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_first_event_only() {
        let config = Config::default();
        let mut monitor = Monitor::new();
        monitor.arm(0, &config);
        let mut events = EventQueue::<8>::new();
        assert_eq!(monitor.poll(1, &mut events), None);

        events.enqueue(SchedulerEvent::ElementFatal).unwrap();
        events.enqueue(SchedulerEvent::RegFailed).unwrap();
        assert_eq!(monitor.poll(2, &mut events), Some(SchedulerEvent::ElementFatal));
        assert!(events.is_empty());
    }

    #[test]
    fn deadline_forces_timeout() {
        let config = Config::default();
        let mut monitor = Monitor::new();
        monitor.arm(10, &config);
        let mut events = EventQueue::<8>::new();
        let deadline = 10 + config.ticks(config.procedure_timeout_ms);

        assert_eq!(monitor.poll(deadline - 1, &mut events), None);
        assert_eq!(monitor.poll(deadline, &mut events), Some(SchedulerEvent::Timeout));

        // An outcome produced in the same tick wins over the deadline.
        events.enqueue(SchedulerEvent::KeyFound).unwrap();
        assert_eq!(monitor.poll(deadline + 1, &mut events), Some(SchedulerEvent::KeyFound));
    }
}
