mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Rig;
use feeder_core::mocks::{SilentEvents, event_channel};
use feeder_core::{DeviceEvent, EventHandler, EventIngestor, LidState, MemoryStore, SharedState};
use feeder_traits::MonotonicClock;

#[test]
fn duplicate_done_is_idempotent() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);

    rig.device("DONE");
    rig.device("DONE");
    assert_eq!(rig.store.clear_count(), 1);
    let completed = rig
        .store
        .status_history()
        .iter()
        .filter(|s| *s == "completed")
        .count();
    assert_eq!(completed, 1);
    assert!(rig.state().invariants_hold());
}

#[test]
fn weight_updates_state_and_telemetry() {
    let rig = Rig::new(Rig::quick_cfg());
    rig.clock.advance(Duration::from_secs(3));
    rig.device("LIVE 12.25");
    assert_eq!(rig.state().last_weight_g, Some(12.25));
    let (grams, ts) = rig.store.weight().unwrap();
    assert!((grams - 12.25).abs() < f32::EPSILON);
    assert_eq!(ts, 1_700_000_003);
}

#[test]
fn forced_close_mid_dispense_ends_request() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.start_dispense(50.0);
    rig.device("FORCED_CLOSED");
    let st = rig.state();
    assert!(!st.is_dispensing);
    assert!(!st.lid_open);
    assert_eq!(st.lid, LidState::Idle);
    assert_eq!(rig.store.status().as_deref(), Some("forced_closed"));
    assert!(!rig.store.run());
}

#[test]
fn forced_close_while_idle_writes_no_status() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.cat(true);
    rig.tick();
    rig.device("FORCED_CLOSED");
    assert!(!rig.state().lid_open);
    assert!(rig.store.status().is_none());
}

#[test]
fn unknown_and_malformed_lines_change_nothing() {
    let rig = Rig::new(Rig::quick_cfg());
    let before = rig.state();
    assert!(matches!(
        rig.events.handle_line("HX711 tare ok"),
        Ok(DeviceEvent::Unrecognized(_))
    ));
    assert!(rig.events.handle_line("LIVE").is_err());
    assert!(rig.events.handle_line("WEIGHT nan").is_err());
    let after = rig.state();
    assert_eq!(after.last_weight_g, before.last_weight_g);
    assert_eq!(after.lid, before.lid);
    assert!(rig.store.status_history().is_empty());
}

#[test]
fn lid_closed_echo_is_informational() {
    let mut rig = Rig::new(Rig::quick_cfg());
    rig.cat(true);
    rig.tick();
    rig.device("LID_CLOSED");
    assert!(rig.state().lid_open);
}

fn handler(state: &SharedState, store: &MemoryStore) -> EventHandler {
    EventHandler::new(
        state.clone(),
        Arc::new(store.clone()),
        Arc::new(MonotonicClock::new()),
        Duration::ZERO,
    )
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn thread_applies_lines_from_source() {
    let state = SharedState::new();
    let store = MemoryStore::new();
    let (tx, source) = event_channel();
    let ingestor = EventIngestor::spawn(source, handler(&state, &store), Duration::from_millis(20));

    tx.send("LIVE 7.5".into()).unwrap();
    tx.send("garbage that is ignored".into()).unwrap();
    tx.send("WEIGHT x".into()).unwrap();
    assert!(wait_for(|| ingestor.lines_seen() == 3));
    assert_eq!(state.snapshot().last_weight_g, Some(7.5));
    assert_eq!(
        ingestor
            .counters()
            .malformed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    drop(ingestor);
}

#[test]
fn thread_exits_on_drop() {
    let state = SharedState::new();
    let store = MemoryStore::new();
    let ingestor =
        EventIngestor::spawn(SilentEvents, handler(&state, &store), Duration::from_millis(20));
    assert!(ingestor.is_running());
    let t0 = Instant::now();
    drop(ingestor);
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn disconnected_link_keeps_thread_alive_until_drop() {
    let state = SharedState::new();
    let store = MemoryStore::new();
    let (tx, source) = event_channel();
    let ingestor = EventIngestor::spawn(source, handler(&state, &store), Duration::from_millis(20));
    drop(tx);
    assert!(wait_for(|| {
        ingestor
            .counters()
            .read_errors
            .load(std::sync::atomic::Ordering::Relaxed)
            > 1
    }));
    assert!(ingestor.is_running());
    drop(ingestor);
}

#[test]
fn multiple_ingestors_dont_leak_threads() {
    let state = SharedState::new();
    let store = MemoryStore::new();
    for _ in 0..10 {
        let ingestor =
            EventIngestor::spawn(SilentEvents, handler(&state, &store), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(2));
        drop(ingestor);
    }
}
