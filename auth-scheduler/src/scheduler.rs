// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_protocol::Frame;
use consts::{EVENT_QUEUE_CAPACITY, FRAME_SIZE};

use crate::artifacts::Artifacts;
use crate::flags::Flags;
use crate::keys::LTMK_LEN;
use crate::procedure::Workers;
use crate::{
    Authorization, Config, Crypto, ElementError, Error, EventQueue, KeyRecord, Monitor, Platform,
    Procedure, SchedulerEvent, Session, SessionKeys, TransportError,
};

/// Key material and login state that outlive a single procedure.
#[derive(Debug, Default)]
pub(crate) struct Keystore {
    pub(crate) registered: bool,
    pub(crate) ltmk: Option<[u8; LTMK_LEN]>,
    pub(crate) record: Option<KeyRecord>,
    pub(crate) session: Option<SessionKeys>,
    pub(crate) authorization: Authorization,
    pub(crate) key_id: u32,
}

impl Keystore {
    pub(crate) fn logout(&mut self) {
        self.session = None;
        self.authorization = Authorization::None;
        self.key_id = 0;
    }

    pub(crate) fn forget(&mut self) {
        *self = Self::default();
    }
}

/// Everything the procedure threads share.
pub(crate) struct Context<P, C> {
    pub(crate) platform: P,
    pub(crate) crypto: C,
    pub(crate) config: Config,
    /// Ticks since the scheduler was created.
    pub(crate) now: u32,
    pub(crate) flags: Flags,
    pub(crate) artifacts: Artifacts,
    pub(crate) xfer: Session,
    pub(crate) events: EventQueue<EVENT_QUEUE_CAPACITY>,
    pub(crate) keys: Keystore,
    /// Set once every certificate of the current run has been sent.
    pub(crate) certs_sent: bool,
}

impl<P: Platform, C: Crypto> Context<P, C> {
    pub(crate) fn new(platform: P, crypto: C, config: Config) -> Self {
        Self {
            platform,
            crypto,
            config,
            now: 0,
            flags: Flags::default(),
            artifacts: Artifacts::new(),
            xfer: Session::new(),
            events: EventQueue::new(),
            keys: Keystore::default(),
            certs_sent: false,
        }
    }

    /// Queues the terminal event of the current procedure.
    pub(crate) fn emit(&mut self, event: SchedulerEvent) {
        if self.events.enqueue(event).is_err() {
            warn!("event queue full, dropping {:?}", event);
        }
    }

    /// Ends the handshake after the secure element gave up on a command.
    pub(crate) fn abort(&mut self, err: ElementError) {
        error!("{}", err);
        self.platform.set_power(false);
        self.emit(SchedulerEvent::ElementFatal);
    }

    pub(crate) fn send(&mut self, frame: Frame<'_>) -> Result<(), TransportError> {
        let mut buf = [0; FRAME_SIZE];
        let len = frame
            .encode(&mut buf)
            .expect("outgoing chunks never exceed one frame");
        self.platform.send_frame(&buf[..len])
    }

    /// Writes an outcome code to the status characteristic.
    ///
    /// Returns false while the link is too busy to take it. A dropped link is
    /// logged and treated as sent so the procedure still resolves.
    pub(crate) fn announce(&mut self, code: u32) -> bool {
        match self.platform.send_status(code) {
            Ok(()) => true,
            Err(TransportError::Busy) => false,
            Err(TransportError::Disconnected) => {
                warn!("link lost, status {:#x} not delivered", code);
                true
            }
        }
    }

    fn prepare(&mut self, procedure: Procedure) {
        self.flags.clear();
        self.artifacts.clear();
        self.xfer.reset();
        self.events.clear();
        self.certs_sent = false;
        if matches!(procedure, Procedure::AdminLogin | Procedure::SharedLogin { .. }) {
            self.keys.logout();
        }
    }
}

/// Runs one authentication procedure at a time.
///
/// Call [`Scheduler::tick`] from a periodic timer and [`Scheduler::on_frame`]
/// for every frame the peer writes. The procedure's outcome is returned from
/// the tick that produced it; the scheduler then idles until the next
/// [`Scheduler::start`].
pub struct Scheduler<P, C> {
    cx: Context<P, C>,
    workers: Option<Workers>,
    active: Option<Procedure>,
    monitor: Monitor,
}

impl<P: Platform, C: Crypto> Scheduler<P, C> {
    pub fn new(platform: P, crypto: C, config: Config) -> Self {
        Self {
            cx: Context::new(platform, crypto, config),
            workers: None,
            active: None,
            monitor: Monitor::new(),
        }
    }

    pub fn start(&mut self, procedure: Procedure) -> Result<(), Error> {
        if let Some(active) = self.active {
            warn!("{:?} requested while {:?} runs", procedure, active);
            return Err(Error::ProcedureActive(active));
        }
        info!("starting {:?}", procedure);
        self.cx.prepare(procedure);
        self.workers = Some(Workers::new(procedure, self.cx.keys.registered));
        self.monitor.arm(self.cx.now, &self.cx.config);
        self.active = Some(procedure);
        Ok(())
    }

    /// Starts the procedure selected by a code the peer wrote to the status characteristic.
    pub fn start_code(&mut self, code: u32) -> Result<Procedure, Error> {
        let procedure = Procedure::from_code(code)?;
        self.start(procedure)?;
        Ok(procedure)
    }

    /// Abandons the active procedure without reporting an event.
    pub fn stop(&mut self) {
        if let Some(procedure) = self.active {
            info!("stopping {:?}", procedure);
            self.halt();
        }
    }

    fn halt(&mut self) {
        self.workers = None;
        self.active = None;
        self.cx.xfer.reset();
        self.cx.platform.set_power(false);
    }

    /// Runs every thread of the active procedure once and reports its
    /// outcome if it finished or ran out of time.
    pub fn tick(&mut self) -> Option<SchedulerEvent> {
        self.cx.now = self.cx.now.wrapping_add(1);
        self.workers.as_mut()?.schedule(&mut self.cx);

        let event = self.monitor.poll(self.cx.now, &mut self.cx.events)?;
        if event.is_success() {
            info!("{:?} finished: {:?}", self.active, event);
        } else {
            warn!("{:?} finished: {:?}", self.active, event);
        }
        self.halt();
        Some(event)
    }

    /// Feeds one frame written by the peer.
    pub fn on_frame(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let frame = Frame::decode(bytes)?;
        self.cx.xfer.on_frame(frame, &mut self.cx.artifacts);
        Ok(())
    }

    pub fn active(&self) -> Option<Procedure> {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.cx.keys.registered
    }

    pub fn authorization(&self) -> Authorization {
        self.cx.keys.authorization
    }

    /// Capability key id of a shared login, 0 for the owner.
    pub fn key_id(&self) -> u32 {
        self.cx.keys.key_id
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.cx.keys.session.as_ref()
    }

    pub fn beacon_key(&self) -> Option<[u8; 16]> {
        self.cx.keys.record.map(|record| record.beacon_key)
    }

    pub fn transfer_session(&self) -> &Session {
        &self.cx.xfer
    }

    pub fn platform(&self) -> &P {
        &self.cx.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.cx.platform
    }

    /// Tears the scheduler down, handing the board back.
    pub fn into_platform(self) -> P {
        self.cx.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPlatform;
    use crate::SoftCrypto;
    use auth_protocol::opcode;

    fn scheduler() -> Scheduler<TestPlatform, SoftCrypto> {
        Scheduler::new(TestPlatform::default(), SoftCrypto, Config::default())
    }

    fn run(scheduler: &mut Scheduler<TestPlatform, SoftCrypto>, ticks: u32) -> Option<SchedulerEvent> {
        (0..ticks).find_map(|_| scheduler.tick())
    }

    #[test]
    fn one_procedure_at_a_time() {
        let mut scheduler = scheduler();
        scheduler.start(Procedure::Registration).unwrap();
        assert_eq!(
            scheduler.start(Procedure::KeyErase),
            Err(Error::ProcedureActive(Procedure::Registration))
        );
        assert_eq!(run(&mut scheduler, 10), None);
        assert_eq!(
            scheduler.start_code(opcode::LOG_START),
            Err(Error::ProcedureActive(Procedure::Registration))
        );

        scheduler.stop();
        assert_eq!(scheduler.active(), None);
        scheduler.start(Procedure::KeyRestore).unwrap();
        assert_eq!(run(&mut scheduler, 100), Some(SchedulerEvent::KeyNotFound));
        assert_eq!(scheduler.active(), None);
        scheduler.start(Procedure::KeyErase).unwrap();
    }

    #[test]
    fn idle_scheduler_reports_nothing() {
        let mut scheduler = scheduler();
        assert_eq!(run(&mut scheduler, 50_000), None);
    }

    #[test]
    fn stalled_procedure_times_out() {
        let mut scheduler = scheduler();
        scheduler.start(Procedure::Registration).unwrap();
        let deadline = Config::default().ticks(consts::PROCEDURE_TIMEOUT_MS);
        assert_eq!(run(&mut scheduler, deadline - 1), None);
        assert_eq!(scheduler.tick(), Some(SchedulerEvent::Timeout));
        assert_eq!(scheduler.tick(), None);
        assert!(!scheduler.platform().powered);
    }

    #[test]
    fn login_requires_registration() {
        let mut scheduler = scheduler();
        scheduler.start(Procedure::AdminLogin).unwrap();
        assert_eq!(run(&mut scheduler, 5), Some(SchedulerEvent::KeyNotFound));
        assert_eq!(scheduler.platform().statuses, vec![opcode::ERR_NOT_REGISTERED]);
        assert_eq!(scheduler.authorization(), Authorization::None);
    }

    #[test]
    fn unknown_start_code() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.start_code(0x55), Err(Error::UnknownProcedure(0x55)));
        assert_eq!(scheduler.active(), None);
    }

    #[test]
    fn malformed_frame_is_reported() {
        let mut scheduler = scheduler();
        assert!(matches!(scheduler.on_frame(&[0]), Err(Error::Frame(_))));
    }
}
