//! Background device-event ingestion.
//!
//! Spawns a thread that owns the link's [`EventSource`], parses each line and
//! applies it to the shared controller state. Weight readings are forwarded
//! to the store as telemetry.
//!
//! Each `EventIngestor` spawns exactly one thread; dropping it signals
//! shutdown and joins. The thread notices within one read timeout.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use feeder_traits::{Clock, CommandStore, EventSource};

use crate::error::FeederError;
use crate::hw_error::{map_link_error, map_store_error};
use crate::protocol::DeviceEvent;
use crate::state::SharedState;
use crate::status::FeedStatus;

/// Back-off after a failed read so a dead link does not spin the thread.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Applies parsed device events to the controller state.
#[derive(Clone)]
pub struct EventHandler {
    state: SharedState,
    store: Arc<dyn CommandStore>,
    clock: Arc<dyn Clock + Send + Sync>,
    grace: Duration,
}

impl core::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventHandler")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl EventHandler {
    pub fn new(
        state: SharedState,
        store: Arc<dyn CommandStore>,
        clock: Arc<dyn Clock + Send + Sync>,
        grace: Duration,
    ) -> Self {
        Self {
            state,
            store,
            clock,
            grace,
        }
    }

    /// Parse and apply one raw line. Malformed lines are logged and dropped.
    pub fn handle_line(&self, line: &str) -> Result<DeviceEvent, FeederError> {
        match DeviceEvent::parse(line) {
            Ok(event) => {
                self.apply(&event);
                Ok(event)
            }
            Err(e) => {
                tracing::warn!(line, error = %e, "dropping malformed device line");
                Err(e)
            }
        }
    }

    /// Apply one event to the shared state.
    pub fn apply(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::LiveWeight(grams) | DeviceEvent::FinalWeight(grams) => {
                self.state.lock().last_weight_g = Some(*grams);
                tracing::trace!(grams, "weight");
                let ts = self.clock.unix_time_s();
                if let Err(e) = self.store.publish_weight(*grams, ts) {
                    tracing::warn!(error = %map_store_error(&*e), "weight publish failed");
                }
            }
            DeviceEvent::DispenseDone => self.on_done(),
            DeviceEvent::ForcedClosed => self.on_forced_closed(),
            DeviceEvent::LidOpened => {
                self.state.lock().lid_confirmed = true;
                tracing::debug!("device reports lid open");
            }
            DeviceEvent::LidClosed => {
                tracing::debug!("device reports lid closed");
            }
            DeviceEvent::Unrecognized(line) => {
                tracing::debug!(%line, "ignoring unrecognized device line");
            }
        }
    }

    fn on_done(&self) {
        let now = self.clock.now();
        let grace_armed = {
            let mut st = self.state.lock();
            if !st.finish_dispense() {
                tracing::debug!("DONE with no dispense in flight; ignoring");
                return;
            }
            let arm = !self.grace.is_zero() && st.lid_open;
            if arm {
                st.grace_deadline_at = Some(now + self.grace);
            }
            arm
        };
        tracing::info!(grace_armed, "dispense complete");
        self.finish(FeedStatus::Completed);
    }

    fn on_forced_closed(&self) {
        let was_dispensing = {
            let mut st = self.state.lock();
            let was = st.finish_dispense();
            st.mark_closed();
            was
        };
        tracing::warn!(was_dispensing, "device forced the lid closed");
        if was_dispensing {
            self.finish(FeedStatus::ForcedClosed);
        }
    }

    fn finish(&self, status: FeedStatus) {
        if let Err(e) = self.store.set_status(&status.to_string()) {
            tracing::warn!(%status, error = %map_store_error(&*e), "status write failed");
        }
        if let Err(e) = self.store.clear_run() {
            tracing::warn!(error = %map_store_error(&*e), "clearing run flag failed");
        }
    }
}

/// Counters kept by the ingestion thread.
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub lines: AtomicU64,
    pub malformed: AtomicU64,
    pub read_errors: AtomicU64,
}

pub struct EventIngestor {
    counters: Arc<IngestCounters>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl EventIngestor {
    /// Start the ingestion thread. `read_timeout` bounds both each read and
    /// the time to notice shutdown.
    pub fn spawn<E: EventSource + Send + 'static>(
        mut source: E,
        handler: EventHandler,
        read_timeout: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let counters = Arc::new(IngestCounters::default());
        let counters_clone = counters.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("ingestor received shutdown signal");
                    break;
                }
                match source.read_line(read_timeout) {
                    Ok(Some(line)) => {
                        counters_clone.lines.fetch_add(1, Ordering::Relaxed);
                        if handler.handle_line(&line).is_err() {
                            counters_clone.malformed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        counters_clone.read_errors.fetch_add(1, Ordering::Relaxed);
                        let err = map_link_error(&*e);
                        if err == FeederError::Disconnected {
                            tracing::warn!("device link disconnected; waiting");
                        } else {
                            tracing::warn!(error = %err, "device read failed");
                        }
                        if shutdown_clone.load(Ordering::Relaxed) {
                            break;
                        }
                        std::thread::sleep(READ_ERROR_BACKOFF.min(read_timeout));
                    }
                }
            }
            tracing::trace!("ingestor thread exiting cleanly");
        });

        Self {
            counters,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn counters(&self) -> &IngestCounters {
        &self.counters
    }

    /// Lines received so far (well-formed or not).
    pub fn lines_seen(&self) -> u64 {
        self.counters.lines.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EventIngestor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("ingestor thread joined"),
                Err(e) => tracing::warn!(?e, "ingestor thread panicked during shutdown"),
            }
        }
    }
}
