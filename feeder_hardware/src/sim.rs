//! Simulated feeder firmware.
//!
//! Accepts the same text commands as the real dispenser and answers on an
//! in-process channel: lid acknowledgements, a few `LIVE` progress lines, a
//! final `WEIGHT` and `DONE`. An empty hopper swallows `DISPENSE` without a
//! reply, which is what trips the controller's watchdog in the field.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel as xch;
use feeder_traits::{BoxError, CommandSink, EventSource};

use crate::error::HwError;

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Food left in the hopper.
    pub hopper_g: f32,
    /// `LIVE` lines emitted per dispense.
    pub live_steps: u32,
    /// Echo `OPEN`/`CLOSED` after lid commands.
    pub ack_lid: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hopper_g: 500.0,
            live_steps: 3,
            ack_lid: true,
        }
    }
}

#[derive(Debug)]
struct Device {
    cfg: SimConfig,
    bowl_g: f32,
    lid_open: bool,
    connected: bool,
    commands: u64,
}

/// Handle to the simulated device. Clones share one device.
#[derive(Debug, Clone)]
pub struct SimulatedFeeder {
    dev: Arc<Mutex<Device>>,
    tx: xch::Sender<String>,
    rx: xch::Receiver<String>,
}

impl SimulatedFeeder {
    pub fn new(cfg: SimConfig) -> Self {
        let (tx, rx) = xch::unbounded();
        Self {
            dev: Arc::new(Mutex::new(Device {
                cfg,
                bowl_g: 0.0,
                lid_open: false,
                connected: true,
                commands: 0,
            })),
            tx,
            rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Device> {
        self.dev.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write and read halves of the link, as the controller sees them.
    pub fn split(&self) -> (SimSink, SimEvents) {
        (SimSink { dev: self.clone() }, SimEvents { dev: self.clone() })
    }

    pub fn hopper_g(&self) -> f32 {
        self.lock().cfg.hopper_g
    }

    pub fn set_hopper_g(&self, grams: f32) {
        self.lock().cfg.hopper_g = grams.max(0.0);
    }

    pub fn bowl_g(&self) -> f32 {
        self.lock().bowl_g
    }

    pub fn lid_open(&self) -> bool {
        self.lock().lid_open
    }

    /// Commands accepted so far.
    pub fn commands(&self) -> u64 {
        self.lock().commands
    }

    /// The animal eats; the scale reports the new bowl weight.
    pub fn eat(&self, grams: f32) {
        let bowl = {
            let mut dev = self.lock();
            dev.bowl_g = (dev.bowl_g - grams).max(0.0);
            dev.bowl_g
        };
        self.emit(format!("LIVE {bowl:.1}"));
    }

    /// Lid closed by the device itself (jam, obstruction, local button).
    pub fn force_close(&self) {
        self.lock().lid_open = false;
        self.emit("FORCED_CLOSED".to_string());
    }

    /// Simulate the cable being pulled or plugged back.
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    fn emit(&self, line: String) {
        let _ = self.tx.send(line);
    }

    fn execute(&self, line: &str) -> Result<(), HwError> {
        let mut dev = self.lock();
        if !dev.connected {
            return Err(HwError::Disconnected);
        }
        let mut parts = line.split_whitespace();
        let keyword = parts.next().unwrap_or_default().to_ascii_uppercase();
        let mut out = Vec::new();
        match keyword.as_str() {
            "OPEN_LID" => {
                dev.lid_open = true;
                if dev.cfg.ack_lid {
                    out.push("OPEN".to_string());
                }
            }
            "CLOSE_LID" => {
                dev.lid_open = false;
                if dev.cfg.ack_lid {
                    out.push("CLOSED".to_string());
                }
            }
            "DISPENSE" => {
                let requested: f32 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .filter(|g: &f32| g.is_finite() && *g > 0.0)
                    .ok_or_else(|| HwError::UnknownCommand(line.to_string()))?;
                if dev.cfg.hopper_g <= 0.0 {
                    tracing::warn!(requested, "sim hopper empty; motor spins without output");
                } else {
                    let dispensed = requested.min(dev.cfg.hopper_g);
                    dev.cfg.hopper_g -= dispensed;
                    let start = dev.bowl_g;
                    let steps = dev.cfg.live_steps;
                    for i in 1..=steps {
                        #[allow(clippy::cast_precision_loss)]
                        let frac = i as f32 / steps as f32;
                        out.push(format!("LIVE {:.1}", start + dispensed * frac));
                    }
                    dev.bowl_g = start + dispensed;
                    out.push(format!("WEIGHT {:.1}", dev.bowl_g));
                    out.push("DONE".to_string());
                    tracing::debug!(dispensed, hopper_g = dev.cfg.hopper_g, "sim dispensed");
                }
            }
            _ => return Err(HwError::UnknownCommand(line.to_string())),
        }
        dev.commands += 1;
        drop(dev);
        for l in out {
            self.emit(l);
        }
        Ok(())
    }
}

/// Write half of the simulated link.
#[derive(Debug)]
pub struct SimSink {
    dev: SimulatedFeeder,
}

impl CommandSink for SimSink {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        self.dev.execute(line).map_err(Into::into)
    }
}

/// Read half of the simulated link.
#[derive(Debug)]
pub struct SimEvents {
    dev: SimulatedFeeder,
}

impl EventSource for SimEvents {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        if !self.dev.lock().connected {
            std::thread::sleep(timeout);
            return Err(HwError::Disconnected.into());
        }
        match self.dev.rx.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => Err(HwError::Disconnected.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ev: &mut SimEvents) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(l) = ev.read_line(Duration::from_millis(1)).unwrap() {
            out.push(l);
        }
        out
    }

    #[test]
    fn dispense_reports_progress_and_done() {
        let sim = SimulatedFeeder::new(SimConfig {
            live_steps: 2,
            ..SimConfig::default()
        });
        let (mut sink, mut ev) = sim.split();
        sink.send_line("DISPENSE 50").unwrap();
        assert_eq!(
            drain(&mut ev),
            vec!["LIVE 25.0", "LIVE 50.0", "WEIGHT 50.0", "DONE"]
        );
        assert!((sim.hopper_g() - 450.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_hopper_never_answers() {
        let sim = SimulatedFeeder::new(SimConfig {
            hopper_g: 0.0,
            ..SimConfig::default()
        });
        let (mut sink, mut ev) = sim.split();
        sink.send_line("DISPENSE 50").unwrap();
        assert!(drain(&mut ev).is_empty());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let sim = SimulatedFeeder::new(SimConfig::default());
        let (mut sink, _ev) = sim.split();
        assert!(sink.send_line("SPIN").is_err());
        assert!(sink.send_line("DISPENSE -3").is_err());
        assert_eq!(sim.commands(), 0);
    }
}
