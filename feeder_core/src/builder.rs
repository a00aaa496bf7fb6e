//! Builder for [`Controller`].
//!
//! Ports are required; config and clock default. `build()` validates the
//! timing and species settings before anything runs.

use std::sync::Arc;

use feeder_traits::{Clock, CommandSink, CommandStore, DetectionSource, MonotonicClock};

use crate::config::ControllerCfg;
use crate::controller::Controller;
use crate::error::{BuildError, Result};
use crate::state::SharedState;

impl Controller {
    /// Start building a Controller.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }
}

#[derive(Default)]
pub struct ControllerBuilder {
    sink: Option<Box<dyn CommandSink + Send>>,
    store: Option<Arc<dyn CommandStore>>,
    detection: Option<Arc<dyn DetectionSource>>,
    config: Option<ControllerCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    state: Option<SharedState>,
}

impl ControllerBuilder {
    /// Outbound half of the device link.
    pub fn with_sink(mut self, sink: impl CommandSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CommandStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_detection(mut self, detection: Arc<dyn DetectionSource>) -> Self {
        self.detection = Some(detection);
        self
    }

    pub fn with_config(mut self, cfg: ControllerCfg) -> Self {
        self.config = Some(cfg);
        self
    }

    /// Inject a clock (tests use `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing state handle instead of starting fresh.
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<Controller> {
        let sink = self.sink.ok_or(BuildError::MissingSink)?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let detection = self.detection.ok_or(BuildError::MissingDetection)?;
        let cfg = self.config.unwrap_or_default();
        validate(&cfg)?;

        Ok(Controller {
            sink,
            store,
            detection,
            cfg,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            state: self.state.unwrap_or_default(),
            last_run: false,
            commands_sent: 0,
        })
    }
}

fn validate(cfg: &ControllerCfg) -> std::result::Result<(), BuildError> {
    let species = &cfg.species;
    if species.target.is_empty() || species.rival.is_empty() {
        return Err(BuildError::InvalidConfig("species names must be non-empty"));
    }
    if species.target == species.rival {
        return Err(BuildError::InvalidConfig("target and rival must differ"));
    }
    if !(0.0..=1.0).contains(&species.min_confidence) {
        return Err(BuildError::InvalidConfig("min_confidence must be in [0, 1]"));
    }
    let timing = &cfg.timing;
    if timing.poll.is_zero() {
        return Err(BuildError::InvalidConfig("poll period must be > 0"));
    }
    if timing.dispense_timeout.is_zero() {
        return Err(BuildError::InvalidConfig("dispense timeout must be > 0"));
    }
    if timing.feeding_window.is_zero() {
        return Err(BuildError::InvalidConfig("feeding window must be > 0"));
    }
    let low_food = &cfg.low_food;
    if low_food.enabled
        && (!low_food.threshold_g.is_finite()
            || low_food.threshold_g.is_sign_negative()
            || !low_food.hysteresis_g.is_finite()
            || low_food.hysteresis_g.is_sign_negative())
    {
        return Err(BuildError::InvalidConfig(
            "low-food threshold and hysteresis must be >= 0",
        ));
    }
    Ok(())
}
