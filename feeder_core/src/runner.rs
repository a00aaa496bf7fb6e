//! Fixed-rate control loop.

use std::time::{Duration, Instant};

use crossbeam_channel as xch;

use crate::controller::Controller;

/// Totals for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    /// Cycles skipped because presence could not be read.
    pub skipped: u64,
    pub commands: u64,
    pub statuses: u64,
}

/// Drive `controller` at its configured poll period until `shutdown` fires
/// (or its sender is dropped) or `run_for` elapses. Startup resync runs
/// first; the lid is closed on the way out.
pub fn run(
    controller: &mut Controller,
    shutdown: &xch::Receiver<()>,
    run_for: Option<Duration>,
) -> RunStats {
    let mut stats = RunStats::default();
    let started = Instant::now();
    let poll = controller.config().timing.poll;
    tracing::info!(poll_ms = crate::util::duration_ms(poll), "controller loop starting");

    let boot = controller.start();
    stats.commands += boot.commands.len() as u64;

    let ticker = xch::tick(poll);
    loop {
        xch::select! {
            recv(shutdown) -> _ => {
                tracing::info!("shutdown requested");
                break;
            }
            recv(ticker) -> _ => {
                let report = controller.tick();
                stats.ticks += 1;
                if report.skipped {
                    stats.skipped += 1;
                }
                stats.commands += report.commands.len() as u64;
                stats.statuses += report.statuses.len() as u64;
            }
        }
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            tracing::info!("run duration reached");
            break;
        }
    }

    controller.shutdown();
    tracing::info!(
        ticks = stats.ticks,
        skipped = stats.skipped,
        commands = stats.commands,
        "controller loop stopped"
    );
    stats
}
