mod common;

use std::time::Duration;

use common::{CAT, Rig};
use feeder_core::LidState;
use feeder_traits::Detection;

#[test]
fn opens_once_after_confirmation_window() {
    let mut rig = Rig::new(Rig::default_cfg());
    rig.cat(true);
    rig.tick();
    assert_eq!(rig.state().lid, LidState::Confirming);

    rig.run_ms(4_800);
    assert_eq!(rig.opens(), 0, "must not open before 5s");

    let report = rig.step();
    assert!(report.commands.iter().any(|c| c.is_open()));
    assert_eq!(rig.state().lid, LidState::Open);

    rig.run_ms(1_000);
    assert_eq!(rig.opens(), 1, "continuous presence must not re-send OPEN_LID");
}

#[test]
fn losing_target_restarts_confirmation() {
    let mut rig = Rig::new(Rig::default_cfg());
    rig.cat(true);
    rig.tick();
    rig.run_ms(3_000);
    rig.cat(false);
    rig.step();
    assert_eq!(rig.state().lid, LidState::Idle);

    rig.cat(true);
    rig.step();
    rig.run_ms(4_800);
    assert_eq!(rig.opens(), 0);
    rig.step();
    assert_eq!(rig.opens(), 1);
}

#[test]
fn window_expiry_closes_when_target_gone() {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.feeding_window = Duration::from_secs(2);
    let mut rig = Rig::new(cfg);
    rig.cat(true);
    rig.tick();
    assert_eq!(rig.opens(), 1);

    rig.cat(false);
    rig.run_ms(2_000);
    assert_eq!(rig.closes(), 0, "deadline is inclusive");
    rig.step();
    assert_eq!(rig.closes(), 1);
    let st = rig.state();
    assert_eq!(st.lid, LidState::Idle);
    assert!(!st.lid_open);
}

#[test]
fn presence_keeps_sliding_the_window() {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.feeding_window = Duration::from_secs(2);
    let mut rig = Rig::new(cfg);
    rig.cat(true);
    rig.tick();
    rig.run_ms(10_000);
    assert_eq!(rig.closes(), 0);
    assert!(rig.state().lid_open);
}

#[test]
fn startup_resync_closes_lid() {
    let mut rig = Rig::new(Rig::default_cfg());
    let report = rig.controller.start();
    assert_eq!(report.commands.len(), 1);
    assert_eq!(rig.sink.lines(), vec!["CLOSE_LID".to_string()]);
    assert_eq!(rig.state().lid, LidState::Idle);
}

#[test]
fn startup_resync_can_be_disabled() {
    let mut cfg = Rig::default_cfg();
    cfg.policy.close_on_start = false;
    let mut rig = Rig::new(cfg);
    assert!(rig.controller.start().commands.is_empty());
    assert!(rig.sink.lines().is_empty());
}

#[test]
fn low_confidence_detection_counts_as_absent() {
    let mut cfg = Rig::quick_cfg();
    cfg.species.min_confidence = 0.6;
    let mut rig = Rig::new(cfg);
    rig.store.set_detection(
        CAT,
        Detection {
            detected: true,
            confidence: 0.5,
            last_seen_s: Some(1_700_000_000),
        },
    );
    rig.tick();
    assert_eq!(rig.opens(), 0);

    rig.store.set_detection(
        CAT,
        Detection {
            detected: true,
            confidence: 0.9,
            last_seen_s: Some(1_700_000_001),
        },
    );
    rig.step();
    assert_eq!(rig.opens(), 1);
}

#[test]
fn unreadable_presence_skips_the_cycle() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.cat(true);
    rig.store.set_fail_reads(true);
    let report = rig.tick();
    assert!(report.skipped);
    assert!(report.commands.is_empty());
    assert_eq!(rig.state().lid, LidState::Idle);

    rig.store.set_fail_reads(false);
    assert!(!rig.step().skipped);
    assert_eq!(rig.opens(), 1);
}

#[test]
fn inconsistent_state_is_resynced_closed() {
    let mut rig = Rig::new(Rig::quick_cfg());
    {
        let state = rig.controller.state();
        let mut st = state.lock();
        st.lid_open = true;
    }
    rig.tick();
    let st = rig.state();
    assert!(st.invariants_hold());
    assert_eq!(rig.closes(), 1);
}
