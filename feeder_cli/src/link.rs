//! Device link selection: simulator, serial tty, or (feature `hardware`) the Pi UART.

use eyre::WrapErr;
use feeder_config::Config;
use feeder_hardware::{SimConfig, SimulatedFeeder};
use feeder_traits::{CommandSink, EventSource};

pub type Sink = Box<dyn CommandSink + Send>;
pub type Events = Box<dyn EventSource + Send>;

/// Open both halves of the device link.
pub fn open(cfg: &Config, sim: bool, hopper_g: f32) -> eyre::Result<(Sink, Events)> {
    if sim {
        tracing::info!(hopper_g, "using simulated dispenser");
        let feeder = SimulatedFeeder::new(SimConfig {
            hopper_g,
            ..SimConfig::default()
        });
        let (sink, events) = feeder.split();
        return Ok((Box::new(sink), Box::new(events)));
    }
    open_device(cfg)
}

#[cfg(feature = "hardware")]
fn open_device(cfg: &Config) -> eyre::Result<(Sink, Events)> {
    let path = &cfg.device.path;
    let (sink, events) = feeder_hardware::open_uart(path, cfg.device.baud)
        .wrap_err_with(|| format!("open device link {}", path.display()))?;
    Ok((Box::new(sink), Box::new(events)))
}

#[cfg(not(feature = "hardware"))]
fn open_device(cfg: &Config) -> eyre::Result<(Sink, Events)> {
    let path = &cfg.device.path;
    let (sink, events) = feeder_hardware::open_tty(path)
        .wrap_err_with(|| format!("open device link {}", path.display()))?;
    Ok((Box::new(sink), Box::new(events)))
}
