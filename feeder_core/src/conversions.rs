//! `From` implementations bridging `feeder_config` types to `feeder_core` types.

use std::time::Duration;

use crate::config::{ControllerCfg, LowFoodCfg, PolicyCfg, SpeciesCfg, TimingCfg, WatchdogStatus};

impl From<&feeder_config::Species> for SpeciesCfg {
    fn from(c: &feeder_config::Species) -> Self {
        Self {
            target: c.target.trim().to_string(),
            rival: c.rival.trim().to_string(),
            min_confidence: c.min_confidence,
        }
    }
}

impl From<&feeder_config::Timing> for TimingCfg {
    fn from(c: &feeder_config::Timing) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
            confirmation: Duration::from_millis(c.confirmation_ms),
            feeding_window: Duration::from_millis(c.feeding_window_ms),
            open_settle: Duration::from_millis(c.open_settle_ms),
            dispense_timeout: Duration::from_millis(c.dispense_timeout_ms),
            grace: Duration::from_millis(c.grace_ms),
            rival_settle: Duration::from_millis(c.rival_settle_ms),
            owner_absence: Duration::from_millis(c.owner_absence_ms),
        }
    }
}

impl From<feeder_config::WatchdogStatus> for WatchdogStatus {
    fn from(c: feeder_config::WatchdogStatus) -> Self {
        match c {
            feeder_config::WatchdogStatus::OutOfStock => Self::OutOfStock,
            feeder_config::WatchdogStatus::ErrorNoFood => Self::ErrorNoFood,
        }
    }
}

impl From<&feeder_config::Policy> for PolicyCfg {
    fn from(c: &feeder_config::Policy) -> Self {
        Self {
            reopen_after_rival: c.reopen_after_rival,
            abort_dispense_on_rival: c.abort_dispense_on_rival,
            watchdog_status: c.watchdog_status.into(),
            skip_when_bowl_full: c.skip_when_bowl_full,
            close_on_start: c.close_on_start,
        }
    }
}

impl From<&feeder_config::LowFood> for LowFoodCfg {
    fn from(c: &feeder_config::LowFood) -> Self {
        Self {
            enabled: c.enabled,
            threshold_g: c.threshold_g,
            hysteresis_g: c.hysteresis_g,
        }
    }
}

impl From<&feeder_config::Config> for ControllerCfg {
    fn from(c: &feeder_config::Config) -> Self {
        Self {
            species: (&c.species).into(),
            timing: (&c.timing).into(),
            policy: (&c.policy).into(),
            low_food: (&c.low_food).into(),
        }
    }
}
