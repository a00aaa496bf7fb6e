mod cli;
mod error_fmt;
mod link;
mod store;

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel as xch;
use eyre::WrapErr;
use feeder_config::Config;
use feeder_core::hw_error::map_link_error;
use feeder_core::{Controller, ControllerCfg, DeviceCommand, DeviceEvent, EventIngestor};
use feeder_traits::{CommandSink, DetectionSource, EventSource};
use serde_json::json;

use crate::cli::{Cli, Commands, DEFAULT_SIM_HOPPER_G, FILE_GUARD, JSON_MODE, Verb};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use crate::store::JsonFileStore;

/// Replies collected by `send` before giving up on a chatty device.
const MAX_REPLIES: usize = 64;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run_cli(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run_cli(cli: Cli) -> eyre::Result<()> {
    let cfg = feeder_config::load_file(&cli.config)
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            sim,
            for_ms,
            hopper_g,
        } => cmd_run(&cfg, sim, for_ms, hopper_g, cli.json),
        Commands::Send { verb, grams, sim } => cmd_send(&cfg, verb, grams, sim, cli.json),
        Commands::SelfCheck { sim } => cmd_self_check(&cfg, sim, cli.json),
        Commands::Health => {
            println!("{}", health_json(&cfg));
            Ok(())
        }
    }
}

/// Precedence: `RUST_LOG`, then `--log-level`, then `[logging].level`, then info.
fn init_tracing(cli: &Cli, logging: &feeder_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| OsString::from("feeder.log"), OsStr::to_os_string);
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}

fn open_store(cfg: &Config) -> eyre::Result<Arc<JsonFileStore>> {
    let store = JsonFileStore::open(&cfg.store.path).map_err(CliError::from)?;
    Ok(Arc::new(store))
}

fn cmd_run(
    cfg: &Config,
    sim: bool,
    for_ms: Option<u64>,
    hopper_g: f32,
    json: bool,
) -> eyre::Result<()> {
    let store = open_store(cfg)?;
    let (sink, events) = link::open(cfg, sim, hopper_g)?;

    let mut controller = Controller::builder()
        .with_sink(sink)
        .with_store(store.clone())
        .with_detection(store.clone())
        .with_config(ControllerCfg::from(cfg))
        .build()?;

    let ingestor = EventIngestor::spawn(
        events,
        controller.event_handler(),
        Duration::from_millis(cfg.device.read_timeout_ms),
    );

    let (stop_tx, stop_rx) = xch::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .wrap_err("install Ctrl-C handler")?;

    tracing::info!(
        target_species = %cfg.species.target,
        rival_species = %cfg.species.rival,
        store = %store.path().display(),
        "feeder running"
    );
    let stats = feeder_core::run(&mut controller, &stop_rx, for_ms.map(Duration::from_millis));

    let lines = ingestor.lines_seen();
    let malformed = ingestor
        .counters()
        .malformed
        .load(std::sync::atomic::Ordering::Relaxed);
    drop(ingestor);

    let final_status = store.load().ok().and_then(|d| d.dispenser.status);
    if json {
        println!(
            "{}",
            json!({
                "ticks": stats.ticks,
                "skipped": stats.skipped,
                "commands": stats.commands,
                "statuses": stats.statuses,
                "device_lines": lines,
                "malformed_lines": malformed,
                "status": final_status,
            })
        );
    } else {
        println!(
            "stopped after {} ticks ({} skipped), {} commands, {} status writes, {} device lines",
            stats.ticks, stats.skipped, stats.commands, stats.statuses, lines
        );
        if let Some(status) = final_status {
            println!("last status: {status}");
        }
    }
    Ok(())
}

fn cmd_send(
    cfg: &Config,
    verb: Verb,
    grams: Option<f32>,
    sim: bool,
    json: bool,
) -> eyre::Result<()> {
    let command = match verb {
        Verb::Open => DeviceCommand::OpenLid,
        Verb::Close => DeviceCommand::CloseLid,
        Verb::Dispense => {
            let amount_g = grams
                .ok_or_else(|| CliError::Usage("dispense requires --grams".to_string()))?;
            if !amount_g.is_finite() || amount_g <= 0.0 {
                return Err(CliError::Usage(format!("--grams must be > 0, got {amount_g}")).into());
            }
            DeviceCommand::Dispense { amount_g }
        }
    };

    let (mut sink, mut events) = link::open(cfg, sim, DEFAULT_SIM_HOPPER_G)?;
    let line = command.to_string();
    sink.send_line(&line).map_err(|e| map_link_error(&*e))?;
    tracing::debug!(%line, "sent");

    let timeout = Duration::from_millis(cfg.device.read_timeout_ms);
    let mut replies = Vec::new();
    while replies.len() < MAX_REPLIES {
        let Some(reply) = events.read_line(timeout).map_err(|e| map_link_error(&*e))? else {
            break;
        };
        let terminal = matches!(
            DeviceEvent::parse(&reply),
            Ok(DeviceEvent::DispenseDone | DeviceEvent::ForcedClosed)
        );
        replies.push(reply);
        if terminal {
            break;
        }
    }

    if json {
        println!("{}", json!({ "sent": line, "replies": replies }));
    } else {
        println!("> {line}");
        for r in &replies {
            println!("< {r}");
        }
        if replies.is_empty() {
            println!("(no reply within {} ms)", cfg.device.read_timeout_ms);
        }
    }
    Ok(())
}

fn cmd_self_check(cfg: &Config, sim: bool, json: bool) -> eyre::Result<()> {
    let store = open_store(cfg)?;
    let target = store
        .detection(cfg.species.target.trim())
        .map_err(|e| eyre::eyre!("read detection: {e}"))?;
    let (_sink, mut events) = link::open(cfg, sim, DEFAULT_SIM_HOPPER_G)?;
    let idle_line = events
        .read_line(Duration::from_millis(cfg.device.read_timeout_ms))
        .map_err(|e| map_link_error(&*e))?;

    let link_name = if sim {
        "sim".to_string()
    } else {
        cfg.device.path.display().to_string()
    };
    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "store": store.path().display().to_string(),
                "link": link_name,
                "target_detected": target.detected,
                "pending_line": idle_line,
            })
        );
    } else {
        println!("store: {} (ok)", store.path().display());
        println!("link: {link_name} (ok)");
        println!(
            "{} detected: {}",
            cfg.species.target.trim(),
            target.detected
        );
    }
    Ok(())
}

fn health_json(cfg: &Config) -> serde_json::Value {
    let t = &cfg.timing;
    let p = &cfg.policy;
    json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "device": {
            "path": cfg.device.path.display().to_string(),
            "baud": cfg.device.baud,
            "read_timeout_ms": cfg.device.read_timeout_ms,
        },
        "species": {
            "target": cfg.species.target.trim(),
            "rival": cfg.species.rival.trim(),
            "min_confidence": cfg.species.min_confidence,
        },
        "timing": {
            "poll_ms": t.poll_ms,
            "confirmation_ms": t.confirmation_ms,
            "feeding_window_ms": t.feeding_window_ms,
            "open_settle_ms": t.open_settle_ms,
            "dispense_timeout_ms": t.dispense_timeout_ms,
            "grace_ms": t.grace_ms,
            "rival_settle_ms": t.rival_settle_ms,
            "owner_absence_ms": t.owner_absence_ms,
        },
        "policy": {
            "reopen_after_rival": p.reopen_after_rival,
            "abort_dispense_on_rival": p.abort_dispense_on_rival,
            "watchdog_status": match p.watchdog_status {
                feeder_config::WatchdogStatus::OutOfStock => "out_of_stock",
                feeder_config::WatchdogStatus::ErrorNoFood => "error_no_food",
            },
            "skip_when_bowl_full": p.skip_when_bowl_full,
            "close_on_start": p.close_on_start,
        },
        "low_food": {
            "enabled": cfg.low_food.enabled,
            "threshold_g": cfg.low_food.threshold_g,
            "hysteresis_g": cfg.low_food.hysteresis_g,
        },
        "store": cfg.store.path.display().to_string(),
    })
}
