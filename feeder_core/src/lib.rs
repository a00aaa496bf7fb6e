#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core feeder control logic (hardware-agnostic).
//!
//! This crate provides the presence-driven lid and dispense controller. All
//! I/O goes through the port traits in `feeder_traits`: `CommandSink` and
//! `EventSource` for the device link, `CommandStore` for the shared
//! request/status record and `DetectionSource` for presence.
//!
//! ## Architecture
//!
//! - **Lid FSM**: IDLE → CONFIRMING → OPEN with a sliding feeding window (`fsm`)
//! - **Overrides**: rival close, dispense watchdog, post-dispense grace, low-food
//!   auto-open, evaluated each poll before the FSM (`controller`)
//! - **Feed requests**: edge-triggered on the store's `run` flag (`controller`)
//! - **Events**: a background thread applies device lines to shared state (`ingestor`)
//! - **Loop**: fixed-rate tick with graceful shutdown (`runner`)
//!
//! ## Concurrency
//!
//! The poll loop and the ingestor share one [`SharedState`] mutex. Decisions
//! are made under the lock; device and store I/O happen after it is released.

pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod fsm;
pub mod hw_error;
pub mod ingestor;
pub mod mocks;
pub mod protocol;
pub mod runner;
pub mod state;
pub mod status;
pub mod store;
pub mod util;

pub use builder::ControllerBuilder;
pub use config::{ControllerCfg, LowFoodCfg, PolicyCfg, SpeciesCfg, TimingCfg, WatchdogStatus};
pub use controller::{Controller, TickReport};
pub use error::{BuildError, FeederError, Report, Result};
pub use fsm::Presence;
pub use ingestor::{EventHandler, EventIngestor};
pub use protocol::{DeviceCommand, DeviceEvent};
pub use runner::{RunStats, run};
pub use state::{ControllerState, LidState, SharedState};
pub use status::FeedStatus;
pub use store::MemoryStore;
