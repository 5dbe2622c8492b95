use super::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

fn recording_gate(sensor: Arc<SimulatedProximity>) -> (ProximityGate, Arc<Mutex<Vec<ProximityReading>>>) {
    let readings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&readings);
    let callback: ReadingCallback = Arc::new(move |reading| sink.lock().push(reading));
    (ProximityGate::new(sensor, callback), readings)
}

fn reading(distance: f32) -> ProximityReading {
    ProximityReading {
        distance,
        timestamp: Instant::now(),
    }
}

#[test]
fn test_gate_defaults_to_far_until_initialized() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    let (mut gate, _) = recording_gate(sensor);

    assert!(!gate.is_near());
    gate.enable().unwrap();
    assert!(!gate.is_near());
    assert!(!gate.state().initialized);
}

#[test]
fn test_first_reading_initializes_then_changes_are_reported() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    let (mut gate, _) = recording_gate(sensor);
    gate.enable().unwrap();

    assert_eq!(
        gate.on_reading(reading(0.0)),
        Some(ProximityTransition::Init { near: true })
    );
    assert!(gate.is_near());

    // same state again is not a change
    assert_eq!(gate.on_reading(reading(1.0)), None);

    match gate.on_reading(reading(5.0)) {
        Some(ProximityTransition::Changed { near, .. }) => assert!(!near),
        other => panic!("Expected a change to far, got {:?}", other),
    }
    assert!(!gate.is_near());
}

#[test]
fn test_enable_and_disable_are_idempotent() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    let (mut gate, readings) = recording_gate(Arc::clone(&sensor));

    gate.enable().unwrap();
    gate.enable().unwrap();
    assert!(gate.is_enabled());
    assert!(sensor.is_registered());

    assert!(sensor.set_near(true));
    assert_eq!(readings.lock().len(), 1);

    gate.disable();
    gate.disable();
    assert!(!gate.is_enabled());
    assert!(!sensor.is_registered());
    assert!(!sensor.set_near(true));
    assert_eq!(readings.lock().len(), 1);
}

#[test]
fn test_disable_resets_state_and_ignores_stale_readings() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    let (mut gate, _) = recording_gate(sensor);

    gate.enable().unwrap();
    gate.on_reading(reading(0.0));
    assert!(gate.is_near());

    gate.disable();
    assert!(!gate.is_near());
    assert_eq!(gate.on_reading(reading(0.0)), None);
}

#[test]
fn test_dropping_gate_releases_registration() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    {
        let (mut gate, _) = recording_gate(Arc::clone(&sensor));
        gate.enable().unwrap();
        assert!(sensor.is_registered());
    }
    assert!(!sensor.is_registered());
}

#[test]
fn test_near_latch_survives_until_cleared() {
    let sensor = Arc::new(SimulatedProximity::new(5.0));
    let (mut gate, _) = recording_gate(sensor);
    gate.enable().unwrap();

    gate.on_reading(reading(10.0));
    assert!(!gate.saw_near_since_armed());

    gate.on_reading(reading(0.0));
    gate.on_reading(reading(10.0));
    assert!(!gate.is_near());
    assert!(gate.saw_near_since_armed());

    gate.clear_near_latch();
    assert!(!gate.saw_near_since_armed());
}

#[test]
fn test_free_fall_reports_only_while_armed() {
    let sensor = SimulatedFreeFall::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    assert!(!sensor.trigger());

    let guard = sensor
        .arm(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    assert!(sensor.is_armed());
    assert!(sensor.trigger());

    drop(guard);
    assert!(!sensor.is_armed());
    assert!(!sensor.trigger());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
