//! Human-readable error descriptions, structured JSON errors and exit codes.

use feeder_core::{BuildError, FeederError};
use feeder_hardware::HwError;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the CLI itself, before or around the controller.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid arguments: {0}")]
    Usage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stable process exit codes.
pub mod exit {
    pub const ERROR: i32 = 1;
    /// Bad config or arguments (clap uses 2 for usage errors too).
    pub const CONFIG: i32 = 2;
    pub const LINK: i32 = 3;
    pub const STORE: i32 = 4;
}

/// Coarse error class shared by `humanize`, the exit code and the JSON `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Config,
    Link,
    Store,
    Other,
}

fn classify(err: &eyre::Report) -> Class {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::Config(_) | CliError::Usage(_) => Class::Config,
                CliError::Store(_) => Class::Store,
            };
        }
        if cause.downcast_ref::<BuildError>().is_some() {
            return Class::Config;
        }
        if cause.downcast_ref::<StoreError>().is_some() {
            return Class::Store;
        }
        if cause.downcast_ref::<HwError>().is_some() {
            return Class::Link;
        }
        if let Some(fe) = cause.downcast_ref::<FeederError>() {
            return match fe {
                FeederError::Link(_) | FeederError::Disconnected | FeederError::Protocol(_) => {
                    Class::Link
                }
                FeederError::Store(_) | FeederError::Detection(_) => Class::Store,
                FeederError::Config(_) => Class::Config,
                FeederError::State(_) => Class::Other,
            };
        }
    }
    Class::Other
}

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSink => "What happened: The controller has no device link.\nLikely causes: The serial device or simulator was not wired into the builder.\nHow to fix: Check [device].path or pass --sim.".to_string(),
            BuildError::MissingStore | BuildError::MissingDetection => "What happened: The controller has no command store.\nLikely causes: The JSON store could not be attached.\nHow to fix: Check [store].path and its permissions.".to_string(),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(cli) = err.downcast_ref::<CliError>() {
        match cli {
            CliError::Config(msg) => {
                return format!(
                    "What happened: The configuration could not be used ({msg}).\nLikely causes: Wrong --config path, TOML syntax error, or an out-of-range value.\nHow to fix: Fix the file and rerun; `feeder health` prints the effective values."
                );
            }
            CliError::Usage(msg) => {
                return format!("What happened: {msg}.\nHow to fix: See `feeder --help`.");
            }
            CliError::Store(_) => {}
        }
    }

    let msg = format!("{err:#}");
    match classify(err) {
        Class::Link => {
            let disconnected = err.chain().any(|c| {
                matches!(c.downcast_ref::<HwError>(), Some(HwError::Disconnected))
                    || matches!(c.downcast_ref::<FeederError>(), Some(FeederError::Disconnected))
            });
            if disconnected {
                return "What happened: The dispenser link is disconnected.\nLikely causes: Cable unplugged or the board reset.\nHow to fix: Reconnect the dispenser and rerun.".to_string();
            }
            format!(
                "What happened: The dispenser link failed ({msg}).\nLikely causes: Wrong [device].path, missing permissions on the serial node, or wrong baud rate.\nHow to fix: Check the device path and that your user can open it (e.g. the dialout group), or pass --sim."
            )
        }
        Class::Store => format!(
            "What happened: The command store could not be read or written ({msg}).\nLikely causes: Missing directory, no write permission, or a corrupt JSON document.\nHow to fix: Check [store].path; delete the file to start from an empty store."
        ),
        Class::Config | Class::Other => {
            let mut cause = String::new();
            if let Some(src) = err.source() {
                cause = format!(" Cause: {src}");
            }
            format!(
                "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Error: {msg}"
            )
        }
    }
}

pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match classify(err) {
        Class::Config => exit::CONFIG,
        Class::Link => exit::LINK,
        Class::Store => exit::STORE,
        Class::Other => exit::ERROR,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let reason = match classify(err) {
        Class::Config => "config",
        Class::Link => "device_link",
        Class::Store => "store",
        Class::Other => "error",
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
