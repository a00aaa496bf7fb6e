//! Deterministic test rig: manual clock, in-memory store, recording sink.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use feeder_core::mocks::RecordingSink;
use feeder_core::{
    Controller, ControllerCfg, ControllerState, DeviceCommand, EventHandler, MemoryStore,
    TickReport,
};
use feeder_traits::ManualClock;

pub const CAT: &str = "cat";
pub const DOG: &str = "dog";

pub struct Rig {
    pub clock: ManualClock,
    pub store: MemoryStore,
    pub sink: RecordingSink,
    pub controller: Controller,
    pub events: EventHandler,
}

impl Rig {
    pub fn new(cfg: ControllerCfg) -> Self {
        Self::with_sink(cfg, RecordingSink::new())
    }

    pub fn with_sink(cfg: ControllerCfg, sink: RecordingSink) -> Self {
        let clock = ManualClock::new();
        let store = MemoryStore::new();
        let controller = Controller::builder()
            .with_sink(sink.clone())
            .with_store(Arc::new(store.clone()))
            .with_detection(Arc::new(store.clone()))
            .with_config(cfg)
            .with_clock(Arc::new(clock.clone()))
            .build()
            .expect("build controller");
        let events = controller.event_handler();
        Self {
            clock,
            store,
            sink,
            controller,
            events,
        }
    }

    pub fn default_cfg() -> ControllerCfg {
        ControllerCfg::default()
    }

    /// Config with no confirmation delay and no grace, for request-focused tests.
    pub fn quick_cfg() -> ControllerCfg {
        let mut cfg = ControllerCfg::default();
        cfg.timing.confirmation = Duration::ZERO;
        cfg.timing.grace = Duration::ZERO;
        cfg
    }

    pub fn poll(&self) -> Duration {
        self.controller.config().timing.poll
    }

    pub fn tick(&mut self) -> TickReport {
        self.controller.tick()
    }

    /// Advance one poll period, then tick.
    pub fn step(&mut self) -> TickReport {
        self.clock.advance(self.poll());
        self.controller.tick()
    }

    /// Step for `ms` of simulated time.
    pub fn run_ms(&mut self, ms: u64) -> Vec<TickReport> {
        let poll_ms = u64::try_from(self.poll().as_millis()).expect("poll fits u64");
        (0..ms / poll_ms).map(|_| self.step()).collect()
    }

    pub fn cat(&self, present: bool) {
        self.store.set_detected(CAT, present);
    }

    pub fn dog(&self, present: bool) {
        self.store.set_detected(DOG, present);
    }

    /// Inject one line as if the device had sent it.
    pub fn device(&self, line: &str) {
        let _ = self.events.handle_line(line);
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state().snapshot()
    }

    pub fn opens(&self) -> usize {
        self.sink.count(DeviceCommand::is_open)
    }

    pub fn closes(&self) -> usize {
        self.sink.count(DeviceCommand::is_close)
    }

    pub fn dispenses(&self) -> usize {
        self.sink.count(DeviceCommand::is_dispense)
    }

    /// Put the lid in OPEN with a dispense in flight for `amount_g`.
    pub fn start_dispense(&mut self, amount_g: f32) {
        self.store.request_feed(amount_g);
        self.tick();
        assert!(self.state().is_dispensing, "dispense should be in flight");
    }
}
