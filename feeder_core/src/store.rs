//! In-process command store and detection source.
//!
//! Backs tests, benches and the simulator. Every field lives behind one
//! mutex; clones share the same record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use feeder_traits::{BoxError, CommandStore, Detection, DetectionSource, FeedRequest};

#[derive(Debug, Default)]
struct Record {
    request: FeedRequest,
    status: Option<String>,
    status_history: Vec<String>,
    clear_count: u64,
    weight: Option<(f32, u64)>,
    detections: HashMap<String, Detection>,
    fail_reads: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise `run` with the given amount, as an operator would.
    pub fn request_feed(&self, amount_g: f32) {
        self.lock().request = FeedRequest {
            run: true,
            amount_g,
        };
    }

    pub fn set_run(&self, run: bool) {
        self.lock().request.run = run;
    }

    pub fn run(&self) -> bool {
        self.lock().request.run
    }

    /// Latest status written.
    pub fn status(&self) -> Option<String> {
        self.lock().status.clone()
    }

    /// Every status written, oldest first.
    pub fn status_history(&self) -> Vec<String> {
        self.lock().status_history.clone()
    }

    /// Times `clear_run` was called while `run` was set.
    pub fn clear_count(&self) -> u64 {
        self.lock().clear_count
    }

    /// Last published weight and its unix timestamp.
    pub fn weight(&self) -> Option<(f32, u64)> {
        self.lock().weight
    }

    pub fn set_detected(&self, species: &str, detected: bool) {
        self.set_detection(
            species,
            Detection {
                detected,
                confidence: if detected { 1.0 } else { 0.0 },
                last_seen_s: None,
            },
        );
    }

    pub fn set_detection(&self, species: &str, detection: Detection) {
        self.lock()
            .detections
            .insert(species.to_string(), detection);
    }

    /// Make request and detection reads fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }
}

fn unavailable() -> BoxError {
    Box::new(std::io::Error::other("store unavailable"))
}

impl CommandStore for MemoryStore {
    fn feed_request(&self) -> Result<FeedRequest, BoxError> {
        let rec = self.lock();
        if rec.fail_reads {
            return Err(unavailable());
        }
        Ok(rec.request)
    }

    fn set_status(&self, status: &str) -> Result<(), BoxError> {
        let mut rec = self.lock();
        rec.status = Some(status.to_string());
        rec.status_history.push(status.to_string());
        Ok(())
    }

    fn clear_run(&self) -> Result<(), BoxError> {
        let mut rec = self.lock();
        if rec.request.run {
            rec.clear_count += 1;
        }
        rec.request.run = false;
        Ok(())
    }

    fn publish_weight(&self, grams: f32, unix_s: u64) -> Result<(), BoxError> {
        self.lock().weight = Some((grams, unix_s));
        Ok(())
    }
}

impl DetectionSource for MemoryStore {
    fn detection(&self, species: &str) -> Result<Detection, BoxError> {
        let rec = self.lock();
        if rec.fail_reads {
            return Err(unavailable());
        }
        Ok(rec.detections.get(species).copied().unwrap_or_default())
    }
}
