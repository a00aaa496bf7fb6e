//! Lid state machine, evaluated once per poll.
//!
//! ```text
//!            target              target held >= confirmation, no rival
//!   IDLE ------------> CONFIRMING -------------------------------------> OPEN
//!    ^                     |                                              |  target: re-arm window
//!    |   target lost       |                                              |
//!    +---------------------+                                              |
//!    +--------------- window expired and target absent (not dispensing) --+
//! ```
//!
//! Overrides (rival, watchdog, grace) run before this and may already have
//! forced the state to IDLE.

use std::time::Instant;

use crate::config::TimingCfg;
use crate::state::{ControllerState, LidState};
use crate::util::duration_ms;

/// Presence of the two tracked species for this poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub target: bool,
    pub rival: bool,
}

/// Lid command required by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidAction {
    Open,
    Close,
}

/// Advance the lid FSM by one poll.
///
/// `reopen_after_rival` lets a target that stayed through a rival-forced
/// close reopen the lid as soon as the rival leaves, without a fresh
/// confirmation. The target leaving forfeits that.
pub fn advance_lid(
    st: &mut ControllerState,
    presence: Presence,
    now: Instant,
    timing: &TimingCfg,
    reopen_after_rival: bool,
) -> Option<LidAction> {
    match st.lid {
        LidState::Idle | LidState::Confirming if !presence.target => {
            if st.lid == LidState::Confirming {
                tracing::debug!("target lost before confirmation");
            }
            st.lid = LidState::Idle;
            st.confirm_started_at = None;
            st.closed_by_rival = false;
            None
        }
        LidState::Idle | LidState::Confirming
            if reopen_after_rival && st.closed_by_rival && !presence.rival =>
        {
            tracing::info!("target back after rival close; reopening without confirmation");
            st.mark_open(now, timing.feeding_window);
            Some(LidAction::Open)
        }
        LidState::Idle => {
            tracing::debug!("target spotted; confirming");
            st.lid = LidState::Confirming;
            st.confirm_started_at = Some(now);
            confirm(st, presence, now, timing)
        }
        LidState::Confirming => confirm(st, presence, now, timing),
        LidState::Open => {
            if presence.target {
                st.open_deadline_at = Some(now + timing.feeding_window);
                return None;
            }
            let expired = st.open_deadline_at.is_none_or(|deadline| now > deadline);
            if expired && !st.is_dispensing {
                tracing::info!("feeding window expired; closing lid");
                st.mark_closed();
                return Some(LidAction::Close);
            }
            None
        }
    }
}

fn confirm(
    st: &mut ControllerState,
    presence: Presence,
    now: Instant,
    timing: &TimingCfg,
) -> Option<LidAction> {
    if presence.rival {
        // Confirmation only counts rival-free presence.
        st.confirm_started_at = Some(now);
        return None;
    }
    let started = *st.confirm_started_at.get_or_insert(now);
    let held = now.saturating_duration_since(started);
    if held < timing.confirmation {
        return None;
    }
    tracing::info!(held_ms = duration_ms(held), "target confirmed; opening lid");
    st.mark_open(now, timing.feeding_window);
    Some(LidAction::Open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PRESENT: Presence = Presence {
        target: true,
        rival: false,
    };
    const ABSENT: Presence = Presence {
        target: false,
        rival: false,
    };

    fn timing() -> TimingCfg {
        TimingCfg {
            confirmation: Duration::from_secs(5),
            feeding_window: Duration::from_secs(600),
            ..TimingCfg::default()
        }
    }

    #[test]
    fn confirms_after_window_not_before() {
        let t = timing();
        let mut st = ControllerState::new();
        let t0 = Instant::now();
        assert_eq!(advance_lid(&mut st, PRESENT, t0, &t, false), None);
        assert_eq!(st.lid, LidState::Confirming);
        let almost = t0 + Duration::from_millis(4_999);
        assert_eq!(advance_lid(&mut st, PRESENT, almost, &t, false), None);
        let at = t0 + Duration::from_secs(5);
        assert_eq!(
            advance_lid(&mut st, PRESENT, at, &t, false),
            Some(LidAction::Open)
        );
        assert!(st.lid_open);
    }

    #[test]
    fn zero_confirmation_opens_on_first_sighting() {
        let t = TimingCfg {
            confirmation: Duration::ZERO,
            ..timing()
        };
        let mut st = ControllerState::new();
        assert_eq!(
            advance_lid(&mut st, PRESENT, Instant::now(), &t, false),
            Some(LidAction::Open)
        );
    }

    #[test]
    fn rival_blocks_confirmation() {
        let t = timing();
        let mut st = ControllerState::new();
        let t0 = Instant::now();
        let both = Presence {
            target: true,
            rival: true,
        };
        advance_lid(&mut st, both, t0, &t, false);
        let late = t0 + Duration::from_secs(30);
        assert_eq!(advance_lid(&mut st, both, late, &t, false), None);
        assert_eq!(st.lid, LidState::Confirming);
        assert_eq!(advance_lid(&mut st, PRESENT, late, &t, false), None);
        let confirmed = late + Duration::from_secs(5);
        assert_eq!(
            advance_lid(&mut st, PRESENT, confirmed, &t, false),
            Some(LidAction::Open)
        );
    }

    #[test]
    fn open_window_slides_and_then_closes() {
        let t = timing();
        let mut st = ControllerState::new();
        let t0 = Instant::now();
        st.mark_open(t0, t.feeding_window);
        let later = t0 + Duration::from_secs(500);
        assert_eq!(advance_lid(&mut st, PRESENT, later, &t, false), None);
        assert_eq!(st.open_deadline_at, Some(later + t.feeding_window));
        let at_deadline = later + t.feeding_window;
        assert_eq!(advance_lid(&mut st, ABSENT, at_deadline, &t, false), None);
        let past = at_deadline + Duration::from_millis(1);
        assert_eq!(
            advance_lid(&mut st, ABSENT, past, &t, false),
            Some(LidAction::Close)
        );
        assert_eq!(st.lid, LidState::Idle);
    }

    #[test]
    fn never_closes_mid_dispense() {
        let t = timing();
        let mut st = ControllerState::new();
        let t0 = Instant::now();
        st.mark_open(t0, Duration::from_millis(1));
        st.is_dispensing = true;
        let past = t0 + Duration::from_secs(1);
        assert_eq!(advance_lid(&mut st, ABSENT, past, &t, false), None);
        assert!(st.lid_open);
    }

    #[test]
    fn reopen_policy_skips_confirmation() {
        let t = timing();
        let mut st = ControllerState {
            closed_by_rival: true,
            ..ControllerState::default()
        };
        let t0 = Instant::now();
        assert_eq!(advance_lid(&mut st, PRESENT, t0, &t, false), None);
        st.lid = LidState::Idle;
        assert_eq!(
            advance_lid(&mut st, PRESENT, t0, &t, true),
            Some(LidAction::Open)
        );
        assert!(!st.closed_by_rival);
    }
}
