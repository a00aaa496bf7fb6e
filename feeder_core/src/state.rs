//! Controller state shared by the poll loop and the event ingestor.
//!
//! One value, one lock. Every read-modify-write of lid, dispense and timer
//! fields happens under [`SharedState`]'s mutex; nothing else holds these
//! flags.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lid state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LidState {
    #[default]
    Idle,
    Confirming,
    Open,
}

impl fmt::Display for LidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Confirming => "CONFIRMING",
            Self::Open => "OPEN",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub lid: LidState,
    /// Assumed physical lid position; tracks `lid == Open`.
    pub lid_open: bool,
    /// Set by a LidOpened event since the last open command.
    pub lid_confirmed: bool,
    pub is_dispensing: bool,
    pub confirm_started_at: Option<Instant>,
    pub open_deadline_at: Option<Instant>,
    pub dispense_started_at: Option<Instant>,
    pub target_last_seen_at: Option<Instant>,
    pub grace_deadline_at: Option<Instant>,
    /// Start of the current uninterrupted rival sighting.
    pub rival_seen_since: Option<Instant>,
    /// Last close was forced by the rival (drives the reopen policy).
    pub closed_by_rival: bool,
    /// None until the device reports a weight.
    pub last_weight_g: Option<f32>,
    /// Low-food auto-open fired and has not re-armed yet.
    pub low_food_latched: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to OPEN and arm the feeding window.
    pub fn mark_open(&mut self, now: Instant, window: Duration) {
        self.lid = LidState::Open;
        self.lid_open = true;
        self.lid_confirmed = false;
        self.confirm_started_at = None;
        self.open_deadline_at = Some(now + window);
        self.closed_by_rival = false;
    }

    /// Transition to IDLE with the lid closed; clears every open-side timer.
    pub fn mark_closed(&mut self) {
        self.lid = LidState::Idle;
        self.lid_open = false;
        self.lid_confirmed = false;
        self.confirm_started_at = None;
        self.open_deadline_at = None;
        self.grace_deadline_at = None;
    }

    /// End the in-flight dispense, if any. Returns whether one was active.
    pub fn finish_dispense(&mut self) -> bool {
        let was = self.is_dispensing;
        self.is_dispensing = false;
        self.dispense_started_at = None;
        was
    }

    /// `lid == Open` iff `lid_open`, and dispensing implies open.
    pub fn invariants_hold(&self) -> bool {
        let open_matches = (self.lid == LidState::Open) == self.lid_open;
        let dispense_ok = !self.is_dispensing || self.lid == LidState::Open;
        open_matches && dispense_ok
    }
}

/// Handle to the single synchronization point.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<ControllerState>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state. A panic in the other loop must not wedge this one, so a
    /// poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ControllerState {
        self.lock().clone()
    }
}
