mod common;

use std::time::Duration;

use common::Rig;
use feeder_core::{FeedStatus, LidState, WatchdogStatus};

/// Step until the dispense ends; returns how long after the dispense started
/// the watchdog fired.
fn step_until_failed(rig: &mut Rig) -> (Duration, FeedStatus) {
    let started = rig.clock.elapsed();
    for _ in 0..200 {
        let report = rig.step();
        if let Some(status) = report.statuses.into_iter().find(FeedStatus::is_terminal) {
            return (rig.clock.elapsed() - started, status);
        }
    }
    panic!("watchdog never fired");
}

#[test]
fn missing_done_fails_within_one_poll_of_deadline() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);

    let (after, status) = step_until_failed(&mut rig);
    assert_eq!(status, FeedStatus::OutOfStock);
    assert!(after > Duration::from_secs(10));
    assert!(after <= Duration::from_secs(10) + rig.poll());

    assert_eq!(rig.store.status().as_deref(), Some("out_of_stock"));
    assert!(!rig.store.run());
    let st = rig.state();
    assert!(!st.is_dispensing);
    assert_eq!(st.lid, LidState::Idle);
    assert_eq!(rig.closes(), 1);
}

#[test]
fn watchdog_status_is_configurable() {
    let mut cfg = Rig::quick_cfg();
    cfg.policy.watchdog_status = WatchdogStatus::ErrorNoFood;
    cfg.timing.dispense_timeout = Duration::from_secs(2);
    let mut rig = Rig::new(cfg);
    rig.start_dispense(50.0);
    let (_, status) = step_until_failed(&mut rig);
    assert_eq!(status, FeedStatus::ErrorNoFood);
    assert_eq!(rig.store.status().as_deref(), Some("error_no_food"));
}

#[test]
fn late_done_after_watchdog_is_ignored() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);
    step_until_failed(&mut rig);
    assert_eq!(rig.store.clear_count(), 1);

    rig.device("DONE");
    assert_eq!(rig.store.status().as_deref(), Some("out_of_stock"));
    assert_eq!(rig.store.clear_count(), 1);
}

#[test]
fn next_request_after_failure_is_served() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);
    step_until_failed(&mut rig);

    rig.step();
    rig.store.request_feed(20.0);
    rig.step();
    assert_eq!(rig.dispenses(), 2);
    assert_eq!(rig.store.status().as_deref(), Some("feeding"));
}

#[test]
fn done_before_deadline_disarms_watchdog() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);
    rig.run_ms(5_000);
    rig.device("DONE");
    let reports = rig.run_ms(20_000);
    assert!(reports.iter().all(|r| r.statuses.is_empty()));
    assert_eq!(rig.store.status().as_deref(), Some("completed"));
}
