use super::*;
use crate::config::PopupcamConfig;
use crate::events::{EventBus, EventFilter, EventReceiver, PopupcamEvent};
use crate::feedback::{CalibrationResult, FeedbackCall, RecordingFeedback, UserChoice};
use crate::sensors::{SimulatedFreeFall, SimulatedProximity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn test_config() -> PopupcamConfig {
    let mut config = PopupcamConfig::default();
    config.motor.boot_grace_ms = 0;
    config
}

async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

struct Harness {
    handle: MotorHandle,
    motor: Arc<SimulatedMotor>,
    connector: Arc<SimulatedConnector>,
    feedback: Arc<RecordingFeedback>,
    proximity: Arc<SimulatedProximity>,
    free_fall: Arc<SimulatedFreeFall>,
    event_bus: Arc<EventBus>,
}

impl Harness {
    async fn start(config: PopupcamConfig, motor: SimulatedMotor) -> Self {
        let motor = Arc::new(motor);
        let connector = Arc::new(SimulatedConnector::new(Arc::clone(&motor)));
        let feedback = Arc::new(RecordingFeedback::new());
        let proximity = Arc::new(SimulatedProximity::new(5.0));
        let free_fall = Arc::new(SimulatedFreeFall::new());
        let event_bus = Arc::new(EventBus::new(64));

        let (actor, handle) = MotorActor::builder(config)
            .with_connector(connector.clone())
            .with_feedback(feedback.clone())
            .with_event_bus(Arc::clone(&event_bus))
            .with_proximity(proximity.clone())
            .with_free_fall(free_fall.clone())
            .build()
            .unwrap();
        tokio::spawn(actor.run());
        wait(1).await;

        Self {
            handle,
            motor,
            connector,
            feedback,
            proximity,
            free_fall,
            event_bus,
        }
    }

    async fn started() -> Self {
        Self::start(test_config(), SimulatedMotor::new(Duration::ZERO)).await
    }

    async fn snapshot(&self) -> ControllerSnapshot {
        self.handle.snapshot().await.unwrap()
    }

    fn jam_dialogs(&self) -> Vec<(bool, bool)> {
        self.feedback
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                FeedbackCall::JamError {
                    needs_calibration,
                    was_closing,
                } => Some((needs_calibration, was_closing)),
                _ => None,
            })
            .collect()
    }
}

fn is_dialog(call: &FeedbackCall) -> bool {
    matches!(
        call,
        FeedbackCall::JamError { .. }
            | FeedbackCall::CalibrationResult(_)
            | FeedbackCall::FrequencyWarning
    )
}

#[tokio::test(start_paused = true)]
async fn test_camera_blip_moves_nothing() {
    let harness = Harness::started().await;

    harness.handle.camera_unavailable("1").unwrap();
    wait(40).await;
    harness.handle.camera_available("1").unwrap();
    wait(500).await;

    assert!(harness.motor.commands().is_empty());
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_camera_use_opens_then_release_closes() {
    let harness = Harness::started().await;

    harness.handle.camera_unavailable("1").unwrap();
    wait(150).await;
    assert_eq!(harness.motor.commands(), vec![MotorCall::Popup]);
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Open);

    wait(1300).await;
    harness.handle.camera_available("1").unwrap();
    wait(150).await;
    assert_eq!(
        harness.motor.commands(),
        vec![MotorCall::Popup, MotorCall::Takeback]
    );
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_other_cameras_are_ignored() {
    let harness = Harness::started().await;

    harness.handle.camera_unavailable("0").unwrap();
    wait(500).await;

    assert!(harness.motor.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_busy_holds_second_command_until_settled() {
    let harness = Harness::started().await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    harness.handle.request_transition(Direction::Close).unwrap();
    wait(10).await;

    let snapshot = harness.snapshot().await;
    assert!(snapshot.busy);
    assert_eq!(snapshot.phase, ControllerPhase::CommandInFlight(Direction::Open));
    assert_eq!(snapshot.queued, Some(Direction::Close));

    wait(1080).await;
    assert_eq!(harness.motor.commands(), vec![MotorCall::Popup]);
    assert!(harness.snapshot().await.busy);

    wait(200).await;
    assert_eq!(
        harness.motor.commands(),
        vec![MotorCall::Popup, MotorCall::Takeback]
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeated_open_is_issued_once() {
    let harness = Harness::started().await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    harness.handle.request_transition(Direction::Open).unwrap();
    wait(3000).await;

    assert_eq!(harness.motor.count(MotorCall::Popup), 1);
    assert!(!harness.snapshot().await.busy);
}

#[tokio::test(start_paused = true)]
async fn test_third_popup_jam_requires_calibration() {
    let harness = Harness::started().await;

    for _ in 0..3 {
        harness.motor.notify(MotorStatus::PopupJammed);
        wait(10).await;
    }

    assert_eq!(
        harness.jam_dialogs(),
        vec![(false, false), (false, false), (true, false)]
    );
    assert_eq!(harness.snapshot().await.failures.popup_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn test_popup_ok_resets_popup_counter() {
    let harness = Harness::started().await;

    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    harness.motor.notify(MotorStatus::PopupOk);
    wait(10).await;
    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;

    assert_eq!(
        harness.jam_dialogs(),
        vec![(false, false), (false, false), (false, false)]
    );
    let failures = harness.snapshot().await.failures;
    assert_eq!(failures.popup_failures, 1);
    assert_eq!(failures.takeback_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_jam_suppressed_while_dialog_open() {
    let harness = Harness::started().await;
    harness.feedback.hold_dialogs(true);

    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;

    assert_eq!(harness.jam_dialogs().len(), 1);
    assert!(harness.snapshot().await.dialog_showing);

    harness.feedback.release_dialog();
    wait(10).await;
    assert!(!harness.snapshot().await.dialog_showing);

    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    assert_eq!(harness.jam_dialogs().len(), 2);
    harness.feedback.release_dialog();
}

#[tokio::test(start_paused = true)]
async fn test_errors_suppressed_during_boot_grace() {
    let mut config = test_config();
    config.motor.boot_grace_ms = 1200;
    let harness = Harness::start(config, SimulatedMotor::new(Duration::ZERO)).await;

    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    assert!(harness.jam_dialogs().is_empty());

    wait(1300).await;
    harness.motor.notify(MotorStatus::PopupJammed);
    wait(10).await;
    assert_eq!(harness.jam_dialogs(), vec![(false, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_open_issued_once_when_clear() {
    let harness = Harness::started().await;

    harness.proximity.set_near(true);
    wait(10).await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    assert!(harness.motor.commands().is_empty());
    assert!(harness.snapshot().await.deferred_open);
    assert_eq!(harness.feedback.count(|c| *c == FeedbackCall::ObstructionShown), 1);

    harness.proximity.set_near(false);
    wait(10).await;
    harness.proximity.set_near(true);
    wait(10).await;
    harness.proximity.set_near(false);
    wait(2000).await;

    assert_eq!(harness.motor.count(MotorCall::Popup), 1);
    assert!(!harness.snapshot().await.deferred_open);
    assert_eq!(
        harness.feedback.count(|c| *c == FeedbackCall::ObstructionDismissed),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_deferred_open() {
    let harness = Harness::started().await;

    harness.proximity.set_near(true);
    wait(10).await;
    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    harness.handle.request_transition(Direction::Close).unwrap();
    wait(10).await;
    harness.proximity.set_near(false);
    wait(2000).await;

    assert_eq!(harness.motor.count(MotorCall::Popup), 0);
    assert!(!harness.snapshot().await.deferred_open);
}

#[tokio::test(start_paused = true)]
async fn test_pressed_forces_single_takeback_while_busy() {
    let harness = Harness::started().await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    assert!(harness.snapshot().await.busy);

    harness.motor.notify(MotorStatus::Pressed);
    wait(10).await;

    assert_eq!(harness.motor.count(MotorCall::Takeback), 1);
    let snapshot = harness.snapshot().await;
    assert_eq!(snapshot.camera_state, CameraState::Closed);
    assert!(!snapshot.free_fall_armed);
    assert_eq!(harness.feedback.count(|c| *c == FeedbackCall::Home), 1);

    wait(3000).await;
    assert_eq!(harness.motor.count(MotorCall::Takeback), 1);
}

#[tokio::test(start_paused = true)]
async fn test_device_lost_is_rebound_on_next_command() {
    let harness = Harness::started().await;
    assert_eq!(harness.connector.connect_count(), 1);

    harness.motor.disconnect();
    wait(10).await;
    assert!(!harness.snapshot().await.device_bound);

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;

    assert_eq!(harness.connector.connect_count(), 2);
    assert_eq!(harness.motor.count(MotorCall::Popup), 1);
    assert!(harness.snapshot().await.device_bound);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_is_silent_noop() {
    let harness = Harness::started().await;

    harness.connector.set_reachable(false);
    harness.motor.disconnect();
    wait(10).await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(2000).await;

    assert!(harness.motor.commands().is_empty());
    assert_eq!(harness.feedback.count(is_dialog), 0);
    let snapshot = harness.snapshot().await;
    assert!(!snapshot.device_bound);
    assert!(!snapshot.busy);
}

#[tokio::test(start_paused = true)]
async fn test_failed_call_still_settles() {
    let harness = Harness::started().await;
    harness.motor.set_failing(true);

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    assert!(harness.snapshot().await.busy);
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Unknown);

    wait(1300).await;
    assert!(!harness.snapshot().await.busy);
    assert_eq!(harness.feedback.count(is_dialog), 0);
}

#[tokio::test(start_paused = true)]
async fn test_calibrate_now_from_jam_dialog() {
    let harness = Harness::started().await;
    harness.feedback.set_jam_choice(UserChoice::CalibrateNow);
    harness.motor.set_status(MotorStatus::RequestCalib);

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;

    assert_eq!(harness.jam_dialogs(), vec![(true, false)]);
    assert_eq!(harness.motor.count(MotorCall::Calibrate), 1);
    assert!(harness
        .feedback
        .calls()
        .contains(&FeedbackCall::CalibrationResult(CalibrationResult::Succeeded)));
    assert!(!harness.snapshot().await.calibrating);
}

#[tokio::test(start_paused = true)]
async fn test_request_during_calibration_shows_notice() {
    let harness = Harness::start(test_config(), SimulatedMotor::new(Duration::from_secs(2))).await;

    harness.handle.calibrate().unwrap();
    wait(10).await;
    assert_eq!(
        harness.snapshot().await.phase,
        ControllerPhase::CalibratingInFlight
    );

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    assert_eq!(harness.motor.count(MotorCall::Popup), 0);
    assert!(harness
        .feedback
        .calls()
        .contains(&FeedbackCall::CalibrationResult(CalibrationResult::InProgress)));
    assert!(!harness.snapshot().await.busy);

    wait(2500).await;
    assert!(harness
        .feedback
        .calls()
        .contains(&FeedbackCall::CalibrationResult(CalibrationResult::Succeeded)));
    assert_eq!(harness.snapshot().await.phase, ControllerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failed_calibration_is_reported() {
    let harness = Harness::started().await;
    harness.motor.fail_calibration(true);

    harness.handle.calibrate().unwrap();
    wait(10).await;

    assert!(harness
        .feedback
        .calls()
        .contains(&FeedbackCall::CalibrationResult(CalibrationResult::Failed)));
    assert!(!harness.snapshot().await.calibrating);
}

#[tokio::test(start_paused = true)]
async fn test_free_fall_while_open_retracts() {
    let harness = Harness::started().await;
    assert!(!harness.free_fall.trigger());

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    assert!(harness.free_fall.is_armed());

    assert!(harness.free_fall.trigger());
    wait(10).await;

    assert_eq!(harness.motor.count(MotorCall::Takeback), 1);
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Closed);
    assert!(!harness.free_fall.is_armed());
    assert_eq!(harness.feedback.count(|c| *c == FeedbackCall::Home), 1);
}

#[tokio::test(start_paused = true)]
async fn test_screen_off_closes_open_camera() {
    let harness = Harness::started().await;

    harness.handle.screen_state(false).unwrap();
    wait(10).await;
    assert!(harness.motor.commands().is_empty());

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(1300).await;
    harness.handle.screen_state(false).unwrap();
    wait(10).await;

    assert_eq!(
        harness.motor.commands(),
        vec![MotorCall::Popup, MotorCall::Takeback]
    );
}

#[tokio::test(start_paused = true)]
async fn test_frequent_operation_warns() {
    let mut config = test_config();
    config.frequency.capacity = 3;
    let harness = Harness::start(config, SimulatedMotor::new(Duration::ZERO)).await;

    for direction in [Direction::Open, Direction::Close, Direction::Open] {
        harness.handle.request_transition(direction).unwrap();
        wait(1300).await;
    }

    assert_eq!(
        harness.feedback.count(|c| *c == FeedbackCall::FrequencyWarning),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_boot_retracts_extended_camera() {
    let harness = Harness::start(
        test_config(),
        SimulatedMotor::with_status(MotorStatus::PopupOk, Duration::ZERO),
    )
    .await;

    assert_eq!(harness.motor.commands(), vec![MotorCall::Takeback]);
    assert_eq!(harness.snapshot().await.camera_state, CameraState::Closed);
    assert!(harness.proximity.is_registered());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_retracts_and_releases_sensors() {
    let harness = Harness::started().await;

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;
    harness.handle.shutdown().await.unwrap();

    assert_eq!(
        harness.motor.commands(),
        vec![MotorCall::Popup, MotorCall::Takeback]
    );
    assert!(!harness.proximity.is_registered());
    assert!(!harness.free_fall.is_armed());
    assert!(harness.handle.snapshot().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_published() {
    let harness = Harness::started().await;
    let mut receiver = EventReceiver::new(
        harness.event_bus.subscribe(),
        EventFilter::EventTypes(vec!["command_issued"]),
        "test".to_string(),
    );

    harness.handle.request_transition(Direction::Open).unwrap();
    wait(10).await;

    match receiver.try_recv().unwrap() {
        Some(PopupcamEvent::CommandIssued {
            direction, forced, ..
        }) => {
            assert_eq!(direction, Direction::Open);
            assert!(!forced);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

fn controller(
    motor: &Arc<SimulatedMotor>,
    feedback: &Arc<RecordingFeedback>,
) -> (MotorController, mpsc::UnboundedReceiver<ControlMessage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let controller = MotorController::new(
        &test_config(),
        Arc::new(SimulatedConnector::new(Arc::clone(motor))),
        feedback.clone(),
        Arc::new(EventBus::new(16)),
        sender,
    );
    (controller, receiver)
}

/// Deliver dismissed dialogs back to the controller, dropping everything else
async fn close_dialogs(
    controller: &mut MotorController,
    receiver: &mut mpsc::UnboundedReceiver<ControlMessage>,
) {
    wait(1).await;
    while let Ok(message) = receiver.try_recv() {
        if let ControlMessage::DialogClosed { kind, choice } = message {
            controller.on_dialog_closed(kind, choice).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_takeback_jam_retries_below_cap() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    motor.jam_next(Direction::Close, 10);
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, mut receiver) = controller(&motor, &feedback);
    controller.boot().await;

    for _ in 0..3 {
        controller.on_status(1, MotorStatus::TakebackJammed).await;
        close_dialogs(&mut controller, &mut receiver).await;
    }

    // the third jam hits the cap and gets no retry
    assert_eq!(motor.count(MotorCall::Takeback), 2);
    assert_eq!(controller.failures().takeback_failures, 3);
    assert_eq!(
        feedback.count(|c| *c
            == FeedbackCall::JamError {
                needs_calibration: true,
                was_closing: true
            }),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_is_ignored() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, _receiver) = controller(&motor, &feedback);
    controller.boot().await;

    controller.on_status(7, MotorStatus::PopupJammed).await;
    controller.on_device_lost(7);

    assert_eq!(controller.failures(), FailureCounters::default());
    assert!(controller.snapshot().device_bound);
    assert_eq!(feedback.count(is_dialog), 0);
}

#[tokio::test(start_paused = true)]
async fn test_counters_saturate_at_cap() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, mut receiver) = controller(&motor, &feedback);
    controller.boot().await;

    for _ in 0..5 {
        controller.on_status(1, MotorStatus::PopupJammed).await;
        close_dialogs(&mut controller, &mut receiver).await;
    }

    assert_eq!(controller.failures().popup_failures, 3);
    assert_eq!(controller.failures().takeback_failures, 0);
}

fn pending_target(controller: &MotorController) -> Option<Direction> {
    controller.snapshot().pending.map(|pending| pending.target)
}

async fn settle(controller: &mut MotorController) {
    wait(1300).await;
    controller.on_tick().await;
}

#[tokio::test(start_paused = true)]
async fn test_pending_command_cleared_by_terminal_status() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, _receiver) = controller(&motor, &feedback);
    controller.boot().await;
    assert_eq!(pending_target(&controller), None);

    controller.request_transition(Direction::Open).await;
    assert_eq!(pending_target(&controller), Some(Direction::Open));
    controller.on_status(1, MotorStatus::PopupOk).await;
    assert_eq!(pending_target(&controller), None);

    settle(&mut controller).await;
    controller.request_transition(Direction::Close).await;
    assert_eq!(pending_target(&controller), Some(Direction::Close));
    controller.on_status(1, MotorStatus::TakebackOk).await;
    assert_eq!(pending_target(&controller), None);

    settle(&mut controller).await;
    controller.request_transition(Direction::Open).await;
    assert_eq!(pending_target(&controller), Some(Direction::Open));
    controller.on_status(1, MotorStatus::PopupJammed).await;
    assert_eq!(pending_target(&controller), None);
}

#[tokio::test(start_paused = true)]
async fn test_forced_takeback_replaces_pending_open() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, _receiver) = controller(&motor, &feedback);
    controller.boot().await;

    controller.request_transition(Direction::Open).await;
    let opened = controller.snapshot().pending.unwrap();
    assert_eq!(opened.target, Direction::Open);

    wait(10).await;
    controller.on_status(1, MotorStatus::Pressed).await;

    let forced = controller.snapshot().pending.unwrap();
    assert_eq!(forced.target, Direction::Close);
    assert!(forced.issued_at > opened.issued_at);
    assert_eq!(controller.camera_state(), CameraState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_request_reports_interrupted_direction() {
    let motor = Arc::new(SimulatedMotor::new(Duration::ZERO));
    let feedback = Arc::new(RecordingFeedback::new());
    let (mut controller, mut receiver) = controller(&motor, &feedback);
    controller.boot().await;

    // takeback left unconfirmed, then the motor asks for calibration
    controller.on_status(1, MotorStatus::Pressed).await;
    assert_eq!(pending_target(&controller), Some(Direction::Close));
    motor.set_status(MotorStatus::RequestCalib);
    settle(&mut controller).await;

    controller.request_transition(Direction::Open).await;
    close_dialogs(&mut controller, &mut receiver).await;

    assert_eq!(
        feedback.count(|c| *c
            == FeedbackCall::JamError {
                needs_calibration: true,
                was_closing: true
            }),
        1
    );
    assert_eq!(motor.count(MotorCall::Popup), 0);
}

#[test]
fn test_status_codes() {
    for status in [
        MotorStatus::PopupOk,
        MotorStatus::PopupJammed,
        MotorStatus::TakebackOk,
        MotorStatus::TakebackJammed,
        MotorStatus::Pressed,
        MotorStatus::CalibOk,
        MotorStatus::CalibError,
        MotorStatus::RequestCalib,
    ] {
        assert_eq!(MotorStatus::try_from(status.code()), Ok(status));
    }
    assert!(MotorStatus::try_from(16).is_err());

    assert!(MotorStatus::CalibOk.permits(Direction::Open));
    assert!(MotorStatus::CalibOk.permits(Direction::Close));
    assert!(!MotorStatus::PopupOk.permits(Direction::Open));
    assert!(!MotorStatus::Pressed.is_error());
}
