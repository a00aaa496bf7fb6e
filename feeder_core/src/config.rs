//! Runtime configuration used by the controller.
//!
//! These are separate from the TOML-deserialized config in `feeder_config`:
//! durations are `Duration`s and policies are typed. Every timer constant the
//! field deployments disagreed on is a named field here.

use std::time::Duration;

/// Which species this unit feeds and which one it guards against.
#[derive(Debug, Clone)]
pub struct SpeciesCfg {
    pub target: String,
    pub rival: String,
    /// Detections below this confidence count as absent.
    pub min_confidence: f32,
}

impl Default for SpeciesCfg {
    fn default() -> Self {
        Self {
            target: "cat".to_string(),
            rival: "dog".to_string(),
            min_confidence: 0.0,
        }
    }
}

/// Timer constants.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Controller loop period.
    pub poll: Duration,
    /// Continuous target presence required before OPEN_LID.
    pub confirmation: Duration,
    /// Sliding open window, re-armed whenever the target is present.
    pub feeding_window: Duration,
    /// Upper bound on the wait for a lid acknowledgement before dispensing.
    pub open_settle: Duration,
    /// DISPENSE watchdog.
    pub dispense_timeout: Duration,
    /// Post-dispense grace; zero disables.
    pub grace: Duration,
    /// Continuous rival presence required before the forced close.
    pub rival_settle: Duration,
    /// The forced close waits until the target has been unseen this long.
    pub owner_absence: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(200),
            confirmation: Duration::from_secs(5),
            feeding_window: Duration::from_secs(600),
            open_settle: Duration::from_millis(600),
            dispense_timeout: Duration::from_secs(10),
            grace: Duration::from_secs(20),
            rival_settle: Duration::ZERO,
            owner_absence: Duration::ZERO,
        }
    }
}

/// Terminal status written when the watchdog fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchdogStatus {
    #[default]
    OutOfStock,
    ErrorNoFood,
}

/// Behavioural switches.
#[derive(Debug, Clone)]
pub struct PolicyCfg {
    pub reopen_after_rival: bool,
    pub abort_dispense_on_rival: bool,
    pub watchdog_status: WatchdogStatus,
    pub skip_when_bowl_full: bool,
    pub close_on_start: bool,
}

impl Default for PolicyCfg {
    fn default() -> Self {
        Self {
            reopen_after_rival: false,
            abort_dispense_on_rival: true,
            watchdog_status: WatchdogStatus::OutOfStock,
            skip_when_bowl_full: false,
            close_on_start: true,
        }
    }
}

/// Low-stock auto-open.
#[derive(Debug, Clone)]
pub struct LowFoodCfg {
    pub enabled: bool,
    pub threshold_g: f32,
    pub hysteresis_g: f32,
}

impl Default for LowFoodCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_g: 5.0,
            hysteresis_g: 10.0,
        }
    }
}

impl LowFoodCfg {
    /// Weight above which the low-food trigger re-arms.
    pub fn rearm_above_g(&self) -> f32 {
        self.threshold_g + self.hysteresis_g
    }
}

/// Everything the controller needs besides its ports.
#[derive(Debug, Clone, Default)]
pub struct ControllerCfg {
    pub species: SpeciesCfg,
    pub timing: TimingCfg,
    pub policy: PolicyCfg,
    pub low_food: LowFoodCfg,
}
