mod common;

use std::time::Duration;

use common::Rig;
use feeder_core::{ControllerCfg, FeedStatus, LidState};

fn cfg_with_confirmation(ms: u64) -> ControllerCfg {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.confirmation = Duration::from_millis(ms);
    cfg
}

fn open_with_cat(rig: &mut Rig) {
    rig.cat(true);
    rig.tick();
    let confirm = rig.controller.config().timing.confirmation;
    rig.run_ms(u64::try_from(confirm.as_millis()).unwrap());
    assert!(rig.state().lid_open, "cat should have opened the lid");
}

#[test]
fn rival_closes_open_lid_on_next_poll() {
    let mut rig = Rig::new(cfg_with_confirmation(1_000));
    open_with_cat(&mut rig);

    rig.dog(true);
    let report = rig.step();
    assert!(report.commands.iter().any(|c| c.is_close()));
    let st = rig.state();
    assert!(!st.lid_open);
    assert!(st.closed_by_rival);
}

#[test]
fn no_reopen_while_rival_present_and_reconfirm_after() {
    let mut rig = Rig::new(cfg_with_confirmation(1_000));
    open_with_cat(&mut rig);
    rig.dog(true);
    rig.step();
    rig.run_ms(3_000);
    assert_eq!(rig.opens(), 1, "lid must stay shut while the rival is present");

    rig.dog(false);
    rig.step();
    assert_eq!(rig.opens(), 1, "fresh confirmation required");
    rig.run_ms(1_000);
    assert_eq!(rig.opens(), 2);
}

#[test]
fn reopen_policy_skips_reconfirmation() {
    let mut cfg = cfg_with_confirmation(1_000);
    cfg.policy.reopen_after_rival = true;
    let mut rig = Rig::new(cfg);
    open_with_cat(&mut rig);
    rig.dog(true);
    rig.step();
    rig.run_ms(1_000);
    assert_eq!(rig.opens(), 1);

    rig.dog(false);
    rig.step();
    assert_eq!(rig.opens(), 2);
}

#[test]
fn rival_while_closed_sends_nothing() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.dog(true);
    rig.run_ms(2_000);
    assert!(rig.sink.lines().is_empty());
}

#[test]
fn rival_aborts_in_flight_dispense() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);

    rig.dog(true);
    let report = rig.step();
    assert!(report.statuses.contains(&FeedStatus::aborted("dog")));
    assert_eq!(rig.store.status().as_deref(), Some("aborted_dog_detected"));
    assert!(!rig.store.run());
    assert_eq!(rig.closes(), 1);
    let st = rig.state();
    assert!(!st.is_dispensing);
    assert_eq!(st.lid, LidState::Idle);

    // Late DONE from the aborted dispense changes nothing.
    rig.device("DONE");
    assert_eq!(rig.store.status().as_deref(), Some("aborted_dog_detected"));
}

#[test]
fn dispense_can_be_allowed_to_finish() {
    let mut cfg = Rig::quick_cfg();
    cfg.policy.abort_dispense_on_rival = false;
    let mut rig = Rig::new(cfg);
    rig.start_dispense(50.0);

    rig.dog(true);
    rig.step();
    assert_eq!(rig.closes(), 0);
    assert!(rig.state().is_dispensing);

    rig.device("DONE");
    assert_eq!(rig.store.status().as_deref(), Some("completed"));
    rig.step();
    assert_eq!(rig.closes(), 1);
}

#[test]
fn rival_settle_delays_close() {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.rival_settle = Duration::from_secs(1);
    let mut rig = Rig::new(cfg);
    open_with_cat(&mut rig);

    rig.dog(true);
    rig.run_ms(800);
    assert_eq!(rig.closes(), 0);

    // A gap resets the settle clock.
    rig.dog(false);
    rig.step();
    rig.dog(true);
    rig.run_ms(800);
    assert_eq!(rig.closes(), 0);
    rig.run_ms(400);
    assert_eq!(rig.closes(), 1);
}

#[test]
fn owner_absence_defers_close_until_target_leaves() {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.owner_absence = Duration::from_secs(5);
    let mut rig = Rig::new(cfg);
    open_with_cat(&mut rig);

    rig.dog(true);
    rig.run_ms(10_000);
    assert_eq!(rig.closes(), 0, "owner still eating");

    rig.cat(false);
    rig.run_ms(4_600);
    assert_eq!(rig.closes(), 0);
    rig.run_ms(400);
    assert_eq!(rig.closes(), 1);
}

#[test]
fn request_with_rival_present_is_refused() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.dog(true);
    rig.store.request_feed(50.0);
    let report = rig.tick();
    assert_eq!(report.statuses, vec![FeedStatus::aborted("dog")]);
    assert_eq!(rig.opens(), 0);
    assert_eq!(rig.dispenses(), 0);
    assert!(!rig.store.run());
}

#[test]
fn rival_cancels_grace_period() {
    let mut cfg = Rig::quick_cfg();
    cfg.timing.grace = Duration::from_secs(20);
    let mut rig = Rig::new(cfg);
    rig.start_dispense(50.0);
    rig.device("DONE");
    assert!(rig.state().grace_deadline_at.is_some());

    rig.dog(true);
    rig.step();
    let st = rig.state();
    assert!(st.grace_deadline_at.is_none());
    assert!(!st.lid_open);
    assert_eq!(rig.closes(), 1);
}
