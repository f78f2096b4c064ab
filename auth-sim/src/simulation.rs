// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_scheduler::{Config, Error, Procedure, Scheduler, SchedulerEvent, SoftCrypto};
use log::warn;

use crate::SimPlatform;

/// A device and a phone, stepped together one scheduler tick at a time.
pub struct Simulation {
    scheduler: Scheduler<SimPlatform, SoftCrypto>,
    config: Config,
    ticks: u64,
}

impl Simulation {
    pub fn new(platform: SimPlatform, config: Config) -> Self {
        Self {
            scheduler: Scheduler::new(platform, SoftCrypto, config),
            config,
            ticks: 0,
        }
    }

    /// Power cycles the device. Storage and the secure element keep their contents.
    pub fn reboot(self) -> Self {
        let platform = self.scheduler.into_platform();
        Self::new(platform, self.config)
    }

    /// Has the phone write the start code of `procedure`.
    pub fn begin(&mut self, procedure: Procedure) -> Result<(), Error> {
        self.scheduler.start(procedure)?;
        let platform = self.scheduler.platform_mut();
        let now = platform.unix_time;
        platform.peer.begin(procedure, now);
        if procedure == Procedure::Registration {
            platform.keypad.arm();
        }
        self.pump();
        Ok(())
    }

    /// Runs one tick on the device, then lets the phone answer.
    pub fn step(&mut self) -> Option<SchedulerEvent> {
        self.ticks += 1;
        let event = self.scheduler.tick();
        self.pump();
        event
    }

    /// Runs `procedure` until it reports an event or `max_ticks` pass.
    pub fn run(&mut self, procedure: Procedure, max_ticks: u32) -> Result<Option<SchedulerEvent>, Error> {
        self.begin(procedure)?;
        for _ in 0..max_ticks {
            if let Some(event) = self.step() {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Delivers everything the phone queued for the device.
    fn pump(&mut self) {
        let platform = self.scheduler.platform_mut();
        platform.peer.poll();
        for frame in platform.peer.take_outbox() {
            if let Err(err) = self.scheduler.on_frame(&frame) {
                warn!("device dropped a phone frame: {}", err);
            }
        }
    }

    /// Ticks run since the simulation started.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn scheduler(&self) -> &Scheduler<SimPlatform, SoftCrypto> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<SimPlatform, SoftCrypto> {
        &mut self.scheduler
    }

    pub fn platform(&self) -> &SimPlatform {
        self.scheduler.platform()
    }

    pub fn platform_mut(&mut self) -> &mut SimPlatform {
        self.scheduler.platform_mut()
    }
}
