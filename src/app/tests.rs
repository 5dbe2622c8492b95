use super::*;
use crate::config::PopupcamConfig;
use crate::events::PopupcamEvent;
use crate::feedback::RecordingFeedback;
use crate::motor::{CameraState, MotorCall};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> PopupcamConfig {
    let mut config = PopupcamConfig::default();
    config.motor.boot_grace_ms = 0;
    config.simulator.travel_ms = 0;
    config.feedback.preferences_path = dir
        .path()
        .join("preferences.toml")
        .to_string_lossy()
        .into_owned();
    config
}

async fn create_orchestrator(dir: &TempDir) -> PopupcamOrchestrator {
    let mut orchestrator = PopupcamOrchestrator::new(create_test_config(dir))
        .await
        .unwrap();
    orchestrator.set_feedback(Arc::new(RecordingFeedback::new()));
    orchestrator
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let dir = TempDir::new().unwrap();
    let orchestrator = create_orchestrator(&dir).await;

    assert!(orchestrator.motor_handle().is_none());
    assert!(orchestrator.get_all_component_states().await.is_empty());
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;

    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 2);
    assert_eq!(states.get("motor"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("events"), Some(&ComponentState::Stopped));
    assert!(orchestrator.motor_handle().is_some());
}

#[tokio::test]
async fn test_start_without_initialize_fails() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;

    assert!(orchestrator.start().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_started_daemon_opens_camera() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("motor").await,
        Some(ComponentState::Running)
    );

    let handle = orchestrator.motor_handle().unwrap();
    let camera_id = orchestrator.config().debounce.front_camera_id.clone();
    handle.camera_unavailable(&*camera_id).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.camera_state, CameraState::Open);
    assert_eq!(
        orchestrator.simulated_motor().commands(),
        vec![MotorCall::Popup]
    );

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_retracts_open_camera() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let handle = orchestrator.motor_handle().unwrap();
    let camera_id = orchestrator.config().debounce.front_camera_id.clone();
    handle.camera_unavailable(&*camera_id).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let exit_code = orchestrator.shutdown().await.unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(orchestrator.simulated_motor().count(MotorCall::Takeback), 1);
    assert_eq!(
        orchestrator.get_component_state("motor").await,
        Some(ComponentState::Stopped)
    );
    assert!(handle.snapshot().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_exits_on_shutdown_request() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let event_bus = orchestrator.event_bus();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = event_bus.publish(PopupcamEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "test".to_string(),
        });
    });

    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        orchestrator.get_component_state("events").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_run_twice_fails() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = create_orchestrator(&dir).await;
    orchestrator.shutdown_sender.take();

    assert!(orchestrator.run().await.is_err());
}
