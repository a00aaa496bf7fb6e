//! The poll-driven dispenser controller.
//!
//! Each [`Controller::tick`] reads presence once, decides every lid-side
//! consequence under the state lock, then performs the resulting device and
//! store I/O with the lock released. Feed requests are edge-triggered on the
//! store's `run` flag and handled after the lid pass.

use std::sync::Arc;
use std::time::Instant;

use feeder_traits::{Clock, CommandSink, CommandStore, Detection, DetectionSource};

use crate::config::ControllerCfg;
use crate::error::FeederError;
use crate::fsm::{self, LidAction, Presence};
use crate::hw_error::{map_detection_error, map_link_error, map_store_error};
use crate::ingestor::EventHandler;
use crate::protocol::DeviceCommand;
use crate::state::{ControllerState, SharedState};
use crate::status::FeedStatus;
use crate::util::{LID_WAIT_STEP, duration_ms, elapsed_ms};

/// What one poll did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Presence could not be read; nothing else ran.
    pub skipped: bool,
    pub presence: Presence,
    /// Commands issued to the device, in order (including failed sends).
    pub commands: Vec<DeviceCommand>,
    /// Statuses written to the store, in order.
    pub statuses: Vec<FeedStatus>,
}

/// Side effects decided under the lock and executed after it is released.
#[derive(Debug, Default)]
struct Effects {
    commands: Vec<DeviceCommand>,
    statuses: Vec<FeedStatus>,
    clear_run: bool,
}

impl Effects {
    fn close(&mut self) {
        self.commands.push(DeviceCommand::CloseLid);
    }
}

pub struct Controller {
    pub(crate) sink: Box<dyn CommandSink + Send>,
    pub(crate) store: Arc<dyn CommandStore>,
    pub(crate) detection: Arc<dyn DetectionSource>,
    pub(crate) cfg: ControllerCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) state: SharedState,
    pub(crate) last_run: bool,
    pub(crate) commands_sent: u64,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state.snapshot();
        f.debug_struct("Controller")
            .field("target", &self.cfg.species.target)
            .field("rival", &self.cfg.species.rival)
            .field("lid", &st.lid)
            .field("is_dispensing", &st.is_dispensing)
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn config(&self) -> &ControllerCfg {
        &self.cfg
    }

    /// Handle to the shared state (for the ingestor and for inspection).
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Commands successfully written to the device so far.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Event handler bound to this controller's state, store and clock.
    pub fn event_handler(&self) -> EventHandler {
        EventHandler::new(
            self.state.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.cfg.timing.grace,
        )
    }

    /// Startup resync. With `close_on_start`, the physical lid position is
    /// unknown, so force it shut and start from IDLE.
    pub fn start(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if !self.cfg.policy.close_on_start {
            return report;
        }
        tracing::info!("startup resync: closing lid");
        self.state.lock().mark_closed();
        let _ = self.send(DeviceCommand::CloseLid, &mut report);
        report
    }

    /// One poll of the control loop. Transient failures are logged and the
    /// cycle is skipped or degraded; nothing here is fatal.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let presence = match self.read_presence() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "presence read failed; skipping cycle");
                report.skipped = true;
                return report;
            }
        };
        report.presence = presence;
        let now = self.clock.now();

        let mut fx = Effects::default();
        {
            let mut st = self.state.lock();
            if !st.invariants_hold() {
                resync(&mut st, &mut fx);
            }
            if presence.target {
                st.target_last_seen_at = Some(now);
            }
            if presence.rival {
                st.rival_seen_since.get_or_insert(now);
            } else {
                st.rival_seen_since = None;
            }

            self.run_watchdog(&mut st, now, &mut fx);
            self.rival_override(&mut st, presence, now, &mut fx);
            self.advance_grace(&mut st, presence, now, &mut fx);
            match fsm::advance_lid(
                &mut st,
                presence,
                now,
                &self.cfg.timing,
                self.cfg.policy.reopen_after_rival,
            ) {
                Some(LidAction::Open) => fx.commands.push(DeviceCommand::OpenLid),
                Some(LidAction::Close) => fx.close(),
                None => {}
            }
            self.check_low_food(&mut st, presence, now, &mut fx);
        }
        self.apply(fx, &mut report);

        self.poll_feed_request(presence, &mut report);
        report
    }

    /// Best-effort close on the way out.
    pub fn shutdown(&mut self) {
        let was_open = {
            let mut st = self.state.lock();
            let was_open = st.lid_open;
            st.mark_closed();
            was_open
        };
        if was_open {
            tracing::info!("shutdown: closing lid");
            let mut report = TickReport::default();
            let _ = self.send(DeviceCommand::CloseLid, &mut report);
        }
    }

    fn read_presence(&self) -> Result<Presence, FeederError> {
        let species = &self.cfg.species;
        let target = self
            .detection
            .detection(&species.target)
            .map_err(|e| map_detection_error(&*e))?;
        let rival = self
            .detection
            .detection(&species.rival)
            .map_err(|e| map_detection_error(&*e))?;
        Ok(Presence {
            target: is_present(&target, species.min_confidence),
            rival: is_present(&rival, species.min_confidence),
        })
    }

    fn run_watchdog(&self, st: &mut ControllerState, now: Instant, fx: &mut Effects) {
        if !st.is_dispensing {
            return;
        }
        let Some(started) = st.dispense_started_at else {
            return;
        };
        let elapsed = now.saturating_duration_since(started);
        if elapsed <= self.cfg.timing.dispense_timeout {
            return;
        }
        let status = FeedStatus::from(self.cfg.policy.watchdog_status);
        tracing::error!(
            elapsed_ms = duration_ms(elapsed),
            status = %status,
            "no DONE from device before watchdog; failing dispense"
        );
        st.finish_dispense();
        fx.statuses.push(status);
        fx.clear_run = true;
        if st.lid_open {
            st.mark_closed();
            fx.close();
        }
    }

    fn rival_override(
        &self,
        st: &mut ControllerState,
        presence: Presence,
        now: Instant,
        fx: &mut Effects,
    ) {
        if !presence.rival || !st.lid_open {
            return;
        }
        let timing = &self.cfg.timing;
        if st.is_dispensing && !self.cfg.policy.abort_dispense_on_rival {
            return;
        }
        let since = st.rival_seen_since.unwrap_or(now);
        if now.saturating_duration_since(since) < timing.rival_settle {
            return;
        }
        if !timing.owner_absence.is_zero()
            && st
                .target_last_seen_at
                .is_some_and(|seen| now.saturating_duration_since(seen) < timing.owner_absence)
        {
            return;
        }

        let rival = &self.cfg.species.rival;
        if st.finish_dispense() {
            tracing::warn!(%rival, "rival arrived mid-dispense; aborting");
            fx.statuses.push(FeedStatus::aborted(rival));
            fx.clear_run = true;
        }
        let grace_cancelled = st.grace_deadline_at.is_some();
        st.mark_closed();
        st.closed_by_rival = true;
        fx.close();
        tracing::warn!(%rival, grace_cancelled, "rival at open bowl; closing lid");
    }

    fn advance_grace(
        &self,
        st: &mut ControllerState,
        presence: Presence,
        now: Instant,
        fx: &mut Effects,
    ) {
        let Some(deadline) = st.grace_deadline_at else {
            return;
        };
        if !st.lid_open {
            st.grace_deadline_at = None;
            return;
        }
        if presence.target {
            st.grace_deadline_at = Some(now + self.cfg.timing.grace);
            return;
        }
        if now > deadline {
            tracing::info!("grace period over; closing lid");
            st.mark_closed();
            fx.close();
        }
    }

    fn check_low_food(
        &self,
        st: &mut ControllerState,
        presence: Presence,
        now: Instant,
        fx: &mut Effects,
    ) {
        let low_food = &self.cfg.low_food;
        if !low_food.enabled {
            return;
        }
        let Some(weight_g) = st.last_weight_g else {
            return;
        };
        if st.low_food_latched {
            if weight_g > low_food.rearm_above_g() {
                tracing::info!(weight_g, "bowl refilled; low-food trigger re-armed");
                st.low_food_latched = false;
            }
            return;
        }
        if weight_g > low_food.threshold_g || st.lid_open || st.is_dispensing || presence.rival {
            return;
        }
        tracing::info!(weight_g, threshold_g = low_food.threshold_g, "bowl low; opening lid");
        st.mark_open(now, self.cfg.timing.feeding_window);
        st.low_food_latched = true;
        fx.commands.push(DeviceCommand::OpenLid);
        fx.statuses.push(FeedStatus::LowFoodOpen);
    }

    fn apply(&mut self, fx: Effects, report: &mut TickReport) {
        for cmd in fx.commands {
            let _ = self.send(cmd, report);
        }
        for status in fx.statuses {
            self.write_status(status, report);
        }
        if fx.clear_run {
            self.clear_run();
        }
    }

    fn poll_feed_request(&mut self, presence: Presence, report: &mut TickReport) {
        let request = match self.store.feed_request() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %map_store_error(&*e), "feed request read failed");
                return;
            }
        };
        let rising = request.run && !self.last_run;
        self.last_run = request.run;
        if rising {
            tracing::info!(amount_g = request.amount_g, "feed request");
            self.start_feed(request.amount_g, presence, report);
        }
    }

    /// Handle one rising edge of `run`. A request that arrives while a
    /// dispense is in flight is refused with `error_busy`; the running
    /// dispense keeps going and later writes its own terminal status.
    fn start_feed(&mut self, amount_g: f32, presence: Presence, report: &mut TickReport) {
        if !amount_g.is_finite() || amount_g <= 0.0 {
            tracing::warn!(amount_g, "rejecting feed request with invalid amount");
            self.finish_request(FeedStatus::InvalidAmount, report);
            return;
        }
        let (lid_open, dispensing, weight_g) = {
            let st = self.state.lock();
            (st.lid_open, st.is_dispensing, st.last_weight_g)
        };
        if dispensing {
            tracing::warn!(amount_g, "feed request while a dispense is in flight; refusing");
            self.finish_request(FeedStatus::Busy, report);
            return;
        }
        if presence.rival {
            let rival = self.cfg.species.rival.clone();
            tracing::warn!(%rival, "feed request with rival present; refusing");
            self.finish_request(FeedStatus::aborted(&rival), report);
            return;
        }
        if self.cfg.policy.skip_when_bowl_full && weight_g.is_some_and(|w| w >= amount_g) {
            tracing::info!(?weight_g, amount_g, "bowl already holds the requested amount");
            self.finish_request(FeedStatus::TooMuchFood, report);
            return;
        }

        self.write_status(FeedStatus::Starting, report);
        if !lid_open {
            let now = self.clock.now();
            self.state
                .lock()
                .mark_open(now, self.cfg.timing.feeding_window);
            self.write_status(FeedStatus::Opening, report);
            if self.send(DeviceCommand::OpenLid, report).is_err() {
                self.state.lock().mark_closed();
                self.finish_request(FeedStatus::LinkError, report);
                return;
            }
            self.wait_for_lid();
        }

        {
            let now = self.clock.now();
            let mut st = self.state.lock();
            if !st.lid_open {
                drop(st);
                tracing::warn!("lid closed before dispense could start");
                self.finish_request(FeedStatus::ForcedClosed, report);
                return;
            }
            st.is_dispensing = true;
            st.dispense_started_at = Some(now);
            st.grace_deadline_at = None;
        }
        // Must land before DISPENSE: the ingestor may write `completed` as
        // soon as the device answers.
        self.write_status(FeedStatus::Feeding, report);
        if self
            .send(DeviceCommand::Dispense { amount_g }, report)
            .is_err()
        {
            self.state.lock().finish_dispense();
            self.finish_request(FeedStatus::LinkError, report);
        }
    }

    /// Wait up to `open_settle` for the device to acknowledge the lid.
    fn wait_for_lid(&self) {
        let settle = self.cfg.timing.open_settle;
        let started = self.clock.now();
        loop {
            if self.state.lock().lid_confirmed {
                tracing::debug!(
                    waited_ms = elapsed_ms(self.clock.now(), started),
                    "lid acknowledged"
                );
                return;
            }
            let waited = self.clock.now().saturating_duration_since(started);
            if waited >= settle {
                tracing::debug!(settle_ms = duration_ms(settle), "no lid ack; proceeding");
                return;
            }
            self.clock.sleep(LID_WAIT_STEP.min(settle - waited));
        }
    }

    fn send(&mut self, cmd: DeviceCommand, report: &mut TickReport) -> Result<(), FeederError> {
        let line = cmd.to_string();
        report.commands.push(cmd);
        match self.sink.send_line(&line) {
            Ok(()) => {
                self.commands_sent += 1;
                tracing::info!(command = %line, "sent");
                Ok(())
            }
            Err(e) => {
                let err = map_link_error(&*e);
                tracing::error!(command = %line, error = %err, "device write failed");
                Err(err)
            }
        }
    }

    fn write_status(&self, status: FeedStatus, report: &mut TickReport) {
        let text = status.to_string();
        if let Err(e) = self.store.set_status(&text) {
            tracing::warn!(status = %text, error = %map_store_error(&*e), "status write failed");
        } else {
            tracing::debug!(status = %text, "status");
        }
        report.statuses.push(status);
    }

    fn clear_run(&self) {
        if let Err(e) = self.store.clear_run() {
            tracing::warn!(error = %map_store_error(&*e), "clearing run flag failed");
        }
    }

    fn finish_request(&self, status: FeedStatus, report: &mut TickReport) {
        self.write_status(status, report);
        self.clear_run();
    }
}

fn is_present(d: &Detection, min_confidence: f32) -> bool {
    d.detected && d.confidence >= min_confidence
}

/// Recover from a state where the lid flags disagree: assume the worst,
/// end any dispense and close.
fn resync(st: &mut ControllerState, fx: &mut Effects) {
    tracing::error!(
        lid = %st.lid,
        lid_open = st.lid_open,
        is_dispensing = st.is_dispensing,
        "controller state inconsistent; resyncing closed"
    );
    st.finish_dispense();
    st.mark_closed();
    fx.close();
}
