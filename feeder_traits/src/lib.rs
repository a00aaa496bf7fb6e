//! Port traits between the feeder controller and the outside world.
//!
//! The controller never talks to a serial port, a database or a camera
//! directly. It sees four narrow seams:
//!
//! - [`CommandSink`]: outbound half of the device link (one text command per call)
//! - [`EventSource`]: inbound half of the device link (one text line per call)
//! - [`CommandStore`]: the shared feed-request / status / telemetry record
//! - [`DetectionSource`]: per-species presence as reported upstream
//!
//! Errors cross these boundaries as boxed trait objects so adapters can
//! surface whatever their transport produces.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Write side of the device link.
pub trait CommandSink {
    /// Send one command line. Implementations append the line terminator.
    fn send_line(&mut self, line: &str) -> Result<(), BoxError>;
}

/// Read side of the device link.
pub trait EventSource {
    /// Block for up to `timeout` waiting for the next complete line.
    /// `Ok(None)` means nothing arrived in time.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError>;
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        (**self).send_line(line)
    }
}

impl<T: EventSource + ?Sized> EventSource for Box<T> {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        (**self).read_line(timeout)
    }
}

/// Manual feed request as stored in the command record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedRequest {
    pub run: bool,
    pub amount_g: f32,
}

/// Point-in-time presence report for one species.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detection {
    pub detected: bool,
    pub confidence: f32,
    /// Wall-clock seconds of the last observation, if the source reports one.
    pub last_seen_s: Option<u64>,
}

/// Shared command/telemetry record. Polled, never pushed.
///
/// Methods take `&self`: both the controller loop and the event ingestor
/// hold the same handle, so implementations synchronize internally.
pub trait CommandStore: Send + Sync {
    fn feed_request(&self) -> Result<FeedRequest, BoxError>;
    fn set_status(&self, status: &str) -> Result<(), BoxError>;
    fn clear_run(&self) -> Result<(), BoxError>;
    fn publish_weight(&self, grams: f32, unix_s: u64) -> Result<(), BoxError>;
}

/// Upstream presence detector, read once per poll for each tracked species.
pub trait DetectionSource: Send + Sync {
    fn detection(&self, species: &str) -> Result<Detection, BoxError>;
}
