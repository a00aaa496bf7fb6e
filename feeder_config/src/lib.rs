#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the feeder controller.
//!
//! - `Config` and its sections are deserialized from TOML. Every section is
//!   optional and falls back to documented defaults.
//! - `Config::validate` rejects values the controller cannot run with.
//!
//! All durations are plain milliseconds here; `feeder_core` converts them to
//! `Duration` when it builds its runtime config.
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Device {
    /// Serial device path (e.g. /dev/ttyUSB0 for the cat unit, /dev/ttyACM0 for the dog unit)
    pub path: PathBuf,
    pub baud: u32,
    /// How long the ingestor blocks per read before re-checking shutdown
    pub read_timeout_ms: u64,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud: 9600,
            read_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Species {
    /// Species this unit feeds
    pub target: String,
    /// Species whose presence closes the lid
    pub rival: String,
    /// Detections below this confidence are treated as absent
    pub min_confidence: f32,
}

impl Default for Species {
    fn default() -> Self {
        Self {
            target: "cat".to_string(),
            rival: "dog".to_string(),
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    pub poll_ms: u64,
    /// Continuous target presence required before the lid opens
    pub confirmation_ms: u64,
    /// Sliding open window, re-armed on every poll the target is present
    pub feeding_window_ms: u64,
    /// Upper bound on the wait for the lid after OPEN_LID before dispensing
    pub open_settle_ms: u64,
    /// Dispense watchdog; no DONE within this window is a failure
    pub dispense_timeout_ms: u64,
    /// Extra open time after a completed dispense (0 disables)
    pub grace_ms: u64,
    /// Rival must be seen continuously this long before the forced close
    pub rival_settle_ms: u64,
    /// Rival closes the lid only once the target has been unseen this long
    pub owner_absence_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_ms: 200,
            confirmation_ms: 5_000,
            feeding_window_ms: 600_000,
            open_settle_ms: 600,
            dispense_timeout_ms: 10_000,
            grace_ms: 20_000,
            rival_settle_ms: 0,
            owner_absence_ms: 0,
        }
    }
}

/// Status written when the dispense watchdog fires.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogStatus {
    #[default]
    OutOfStock,
    ErrorNoFood,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Policy {
    /// After a rival-forced close, reopen for the target without re-confirming
    pub reopen_after_rival: bool,
    /// A rival arriving mid-dispense aborts the dispense and closes the lid
    pub abort_dispense_on_rival: bool,
    pub watchdog_status: WatchdogStatus,
    /// Reject requests when the bowl already holds at least the requested amount
    pub skip_when_bowl_full: bool,
    /// Send CLOSE_LID once at start-up to resynchronize with the device
    pub close_on_start: bool,
}

impl Default for Policy {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LowFood {
    pub enabled: bool,
    pub threshold_g: f32,
    /// Weight must climb above threshold + hysteresis before re-arming
    pub hysteresis_g: f32,
}

impl Default for LowFood {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_g: 5.0,
            hysteresis_g: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Store {
    /// JSON document holding dispenser.*, bowl.* and detection.* keys
    pub path: PathBuf,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            path: PathBuf::from("feeder_state.json"),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub device: Device,
    pub species: Species,
    pub timing: Timing,
    pub policy: Policy,
    pub low_food: LowFood,
    pub store: Store,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.baud == 0 {
            eyre::bail!("device.baud must be > 0");
        }
        if self.device.read_timeout_ms == 0 {
            eyre::bail!("device.read_timeout_ms must be >= 1");
        }

        // Species
        let target = self.species.target.trim();
        let rival = self.species.rival.trim();
        if target.is_empty() || rival.is_empty() {
            eyre::bail!("species.target and species.rival must be non-empty");
        }
        if target.eq_ignore_ascii_case(rival) {
            eyre::bail!("species.target and species.rival must differ");
        }
        if !(0.0..=1.0).contains(&self.species.min_confidence) {
            eyre::bail!("species.min_confidence must be in [0.0, 1.0]");
        }

        // Timing
        let t = &self.timing;
        if t.poll_ms == 0 {
            eyre::bail!("timing.poll_ms must be >= 1");
        }
        if t.poll_ms > 5_000 {
            eyre::bail!("timing.poll_ms is unreasonably large (>5s)");
        }
        if t.feeding_window_ms == 0 {
            eyre::bail!("timing.feeding_window_ms must be >= 1");
        }
        if t.dispense_timeout_ms == 0 {
            eyre::bail!("timing.dispense_timeout_ms must be >= 1");
        }
        if t.open_settle_ms > 2_000 {
            eyre::bail!("timing.open_settle_ms must be <= 2000");
        }
        if t.rival_settle_ms > 5_000 {
            eyre::bail!("timing.rival_settle_ms must be <= 5000");
        }
        if t.confirmation_ms > 60 * 1000 {
            eyre::bail!("timing.confirmation_ms is unreasonably large (>1min)");
        }

        // Low food
        let lf = &self.low_food;
        if !lf.threshold_g.is_finite() || lf.threshold_g < 0.0 {
            eyre::bail!("low_food.threshold_g must be >= 0.0");
        }
        if !lf.hysteresis_g.is_finite() || lf.hysteresis_g < 0.0 {
            eyre::bail!("low_food.hysteresis_g must be >= 0.0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
