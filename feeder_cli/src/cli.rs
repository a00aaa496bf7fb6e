//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Hopper fill for the simulated dispenser when not given.
pub const DEFAULT_SIM_HOPPER_G: f32 = 500.0;

#[derive(Parser, Debug)]
#[command(name = "feeder", version, about = "Presence-driven pet feeder controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/feeder_config.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides `[logging].level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Raw device command for `send`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Verb {
    /// OPEN_LID
    Open,
    /// CLOSE_LID
    Close,
    /// DISPENSE <grams>
    Dispense,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller and event ingestor until Ctrl-C
    Run {
        /// Use the simulated dispenser instead of the serial device
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Stop after this many milliseconds
        #[arg(long, value_name = "MS")]
        for_ms: Option<u64>,
        /// Simulated hopper contents in grams (with --sim)
        #[arg(long, value_name = "GRAMS", default_value_t = DEFAULT_SIM_HOPPER_G)]
        hopper_g: f32,
    },
    /// Send one command to the device and print its replies
    Send {
        #[arg(value_enum)]
        verb: Verb,
        /// Amount for `dispense`
        #[arg(long)]
        grams: Option<f32>,
        /// Use the simulated dispenser instead of the serial device
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Open the device link and the store once
    SelfCheck {
        /// Use the simulated dispenser instead of the serial device
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Print the effective configuration as JSON
    Health,
}
