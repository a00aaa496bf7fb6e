//! Test and helper mocks for feeder_core

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel as xch;
use feeder_traits::{BoxError, CommandSink, EventSource};

use crate::protocol::DeviceCommand;

/// Sink that records every line and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded lines decoded back into commands; undecodable lines are skipped.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.lines()
            .iter()
            .filter_map(|l| DeviceCommand::parse(l).ok())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CommandSink for RecordingSink {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device link disconnected",
            )));
        }
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

/// Event source fed from a channel; `read_line` blocks up to the timeout.
#[derive(Debug)]
pub struct ChannelEvents {
    rx: xch::Receiver<String>,
}

/// Sender for scripting device lines plus the matching source.
pub fn event_channel() -> (xch::Sender<String>, ChannelEvents) {
    let (tx, rx) = xch::unbounded();
    (tx, ChannelEvents { rx })
}

impl EventSource for ChannelEvents {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "device link disconnected",
            ))),
        }
    }
}

/// Event source that never produces a line.
pub struct SilentEvents;

impl EventSource for SilentEvents {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}
