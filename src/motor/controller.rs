use super::device::{MotorConnector, MotorDevice};
use super::messages::ControlMessage;
use super::types::{
    CameraState, ControllerPhase, ControllerSnapshot, Direction, FailureCounters, MotorStatus,
    PendingCommand,
};
use crate::config::{MotorConfig, PopupcamConfig};
use crate::error::DeviceError;
use crate::events::{EventBus, PopupcamEvent};
use crate::feedback::{present_dialog, CalibrationResult, DialogKind, FeedbackSink, UserChoice};
use crate::frequency::FrequencyGuard;
use crate::sensors::{
    FreeFallCapability, ProximityCapability, ProximityGate, ProximityReading, ProximityTransition,
    SensorGuard,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Settle window after a device call
#[derive(Debug, Clone, Copy)]
struct Busy {
    until: Instant,
    command: Option<Direction>,
}

/// Owns the popup motor and every piece of state around it.
///
/// All methods are called from the motor actor, one message at a time, so
/// device calls and status notifications are never interleaved.
pub struct MotorController {
    motor: MotorConfig,
    light_duration: Duration,

    connector: Arc<dyn MotorConnector>,
    device: Option<Arc<dyn MotorDevice>>,
    generation: u64,

    feedback: Arc<dyn FeedbackSink>,
    event_bus: Arc<EventBus>,
    mailbox: mpsc::UnboundedSender<ControlMessage>,

    proximity: Option<ProximityGate>,
    free_fall: Option<Arc<dyn FreeFallCapability>>,
    free_fall_guard: Option<SensorGuard>,
    frequency: FrequencyGuard,

    camera_state: CameraState,
    pending: Option<PendingCommand>,
    failures: FailureCounters,
    calibrating: bool,
    dialog_showing: bool,
    deferred_open: bool,
    queued: Option<Direction>,
    busy: Option<Busy>,
    retry_at: Option<Instant>,
    errors_armed_at: Option<Instant>,
}

impl MotorController {
    pub fn new(
        config: &PopupcamConfig,
        connector: Arc<dyn MotorConnector>,
        feedback: Arc<dyn FeedbackSink>,
        event_bus: Arc<EventBus>,
        mailbox: mpsc::UnboundedSender<ControlMessage>,
    ) -> Self {
        Self {
            motor: config.motor.clone(),
            light_duration: config.feedback.light_duration(),
            connector,
            device: None,
            generation: 0,
            feedback,
            event_bus,
            mailbox,
            proximity: None,
            free_fall: None,
            free_fall_guard: None,
            frequency: FrequencyGuard::from_config(&config.frequency),
            camera_state: CameraState::Unknown,
            pending: None,
            failures: FailureCounters::default(),
            calibrating: false,
            dialog_showing: false,
            deferred_open: false,
            queued: None,
            busy: None,
            retry_at: None,
            errors_armed_at: None,
        }
    }

    /// Gate opening on a proximity sensor; readings come back through the mailbox
    pub fn with_proximity(mut self, sensor: Arc<dyn ProximityCapability>) -> Self {
        let mailbox = self.mailbox.clone();
        self.proximity = Some(ProximityGate::new(
            sensor,
            Arc::new(move |reading| {
                let _ = mailbox.send(ControlMessage::ProximityReading(reading));
            }),
        ));
        self
    }

    /// Retract on drops detected while the camera is out
    pub fn with_free_fall(mut self, sensor: Arc<dyn FreeFallCapability>) -> Self {
        self.free_fall = Some(sensor);
        self
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera_state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.busy, Some(busy) if Instant::now() < busy.until)
    }

    pub fn failures(&self) -> FailureCounters {
        self.failures
    }

    pub fn phase(&self) -> ControllerPhase {
        if self.calibrating {
            return ControllerPhase::CalibratingInFlight;
        }
        match self.busy {
            Some(Busy {
                command: Some(target),
                until,
            }) if Instant::now() < until => ControllerPhase::CommandInFlight(target),
            _ => ControllerPhase::Idle,
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            camera_state: self.camera_state,
            phase: self.phase(),
            busy: self.is_busy(),
            calibrating: self.calibrating,
            dialog_showing: self.dialog_showing,
            deferred_open: self.deferred_open,
            queued: self.queued,
            pending: self.pending,
            failures: self.failures,
            device_bound: self.device.is_some(),
            free_fall_armed: self.free_fall_guard.is_some(),
        }
    }

    /// Earliest settle or retry deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        let settle = self.busy.map(|busy| busy.until);
        match (settle, self.retry_at) {
            (Some(settle), Some(retry)) => Some(settle.min(retry)),
            (settle, retry) => settle.or(retry),
        }
    }

    /// Bind the motor, retract a camera left extended, and arm the sensors
    pub async fn boot(&mut self) {
        let now = Instant::now();
        self.errors_armed_at = Some(now + self.motor.boot_grace());

        if let Some(gate) = self.proximity.as_mut() {
            if let Err(e) = gate.enable() {
                warn!("Proximity gate unavailable: {}", e);
            }
        }

        let Some(device) = self.acquire_device().await else {
            warn!("Motor not available at boot; will bind on first command");
            return;
        };

        match device.status().await {
            Ok(status @ (MotorStatus::PopupOk | MotorStatus::TakebackJammed)) => {
                info!("Camera found extended at boot ({:?}), retracting", status);
                self.set_camera_state(CameraState::Closed);
                match device.takeback().await {
                    Ok(()) => {
                        self.busy = Some(Busy {
                            until: now + self.motor.settle_delay(),
                            command: Some(Direction::Close),
                        });
                        self.pending = Some(PendingCommand {
                            target: Direction::Close,
                            issued_at: now,
                        });
                    }
                    Err(e) => {
                        warn!("Boot takeback failed: {}", e);
                        self.note_device_error(&e);
                    }
                }
            }
            Ok(status) => debug!("Motor status at boot: {:?}", status),
            Err(e) => {
                warn!("Could not read motor status at boot: {}", e);
                self.note_device_error(&e);
            }
        }
    }

    /// Retract if open and release the sensors
    pub async fn shutdown(&mut self) {
        if self.camera_state == CameraState::Open {
            info!("Retracting camera before shutdown");
            self.force_takeback().await;
        }
        self.disarm_free_fall();
        if let Some(gate) = self.proximity.as_mut() {
            gate.disable();
        }
    }

    pub async fn request_transition(&mut self, target: Direction) {
        if target == Direction::Open && self.proximity_near() {
            if !self.deferred_open {
                info!("Camera obstructed, deferring open until clear");
                self.feedback.show_obstruction_notice();
                self.publish(PopupcamEvent::OpenDeferred {
                    timestamp: SystemTime::now(),
                });
            }
            self.deferred_open = true;
            self.queued = None;
            return;
        }
        self.clear_deferred_open();

        if self.is_busy() {
            debug!("Motor busy, queueing {}", target);
            self.queued = Some(target);
            if self.retry_at.is_none() {
                self.retry_at = Some(Instant::now() + self.motor.retry_poll());
            }
            return;
        }

        self.issue(target).await;
    }

    /// Handle any settle or retry deadline that has passed
    pub async fn on_tick(&mut self) {
        let now = Instant::now();

        if matches!(self.busy, Some(busy) if busy.until <= now) {
            debug!("Motor settled");
            self.busy = None;
        }

        if matches!(self.retry_at, Some(at) if at <= now) {
            self.retry_at = None;
            if let Some(target) = self.queued {
                if self.is_busy() {
                    self.retry_at = Some(now + self.motor.retry_poll());
                } else {
                    self.queued = None;
                    self.request_transition(target).await;
                }
            }
        }
    }

    pub async fn on_status(&mut self, generation: u64, status: MotorStatus) {
        if generation != self.generation {
            debug!(
                "Ignoring {:?} from stale motor handle {} (current {})",
                status, generation, self.generation
            );
            return;
        }
        debug!("Motor status notification: {:?}", status);

        match status {
            MotorStatus::CalibOk | MotorStatus::CalibError => {
                let success = status == MotorStatus::CalibOk;
                self.calibrating = false;
                self.busy = None;
                info!(
                    "Calibration {}",
                    if success { "succeeded" } else { "failed" }
                );
                self.publish(PopupcamEvent::CalibrationFinished {
                    success,
                    timestamp: SystemTime::now(),
                });
                self.show_dialog(DialogKind::Calibration(if success {
                    CalibrationResult::Succeeded
                } else {
                    CalibrationResult::Failed
                }));
            }
            MotorStatus::Pressed => {
                info!("Camera pushed in by hand, retracting");
                self.force_takeback().await;
                self.feedback.go_home();
            }
            MotorStatus::PopupJammed | MotorStatus::TakebackJammed => {
                self.pending = None;
                self.handle_error(status).await;
            }
            MotorStatus::PopupOk => {
                self.pending = None;
                self.failures.popup_failures = 0;
            }
            MotorStatus::TakebackOk => {
                self.pending = None;
                self.failures.takeback_failures = 0;
            }
            MotorStatus::RequestCalib => {
                info!("Motor requests calibration");
            }
        }
    }

    pub async fn on_proximity_reading(&mut self, reading: ProximityReading) {
        let Some(gate) = self.proximity.as_mut() else {
            return;
        };

        let near = match gate.on_reading(reading) {
            Some(ProximityTransition::Init { near }) => {
                debug!("Proximity initialized: near={}", near);
                near
            }
            Some(ProximityTransition::Changed { near, .. }) => {
                debug!("Proximity changed: near={}", near);
                near
            }
            None => return,
        };

        self.publish(PopupcamEvent::ProximityChanged {
            near,
            timestamp: SystemTime::now(),
        });

        if !near && self.deferred_open {
            info!("Camera no longer obstructed, opening");
            self.request_transition(Direction::Open).await;
        }
    }

    pub async fn on_free_fall(&mut self) {
        if self.free_fall_guard.is_none() {
            debug!("Ignoring free-fall while disarmed");
            return;
        }
        warn!("Free-fall detected, retracting camera");
        self.force_takeback().await;
        self.feedback.go_home();
    }

    pub async fn on_screen_state(&mut self, interactive: bool) {
        if !interactive && self.camera_state == CameraState::Open {
            info!("Screen off with camera open, closing");
            self.request_transition(Direction::Close).await;
        }
    }

    pub fn on_device_lost(&mut self, generation: u64) {
        if generation != self.generation || self.device.is_none() {
            debug!("Ignoring loss of stale motor handle {}", generation);
            return;
        }
        self.device = None;
        self.publish(PopupcamEvent::DeviceConnection {
            connected: false,
            timestamp: SystemTime::now(),
        });
    }

    pub async fn on_dialog_closed(&mut self, kind: DialogKind, choice: UserChoice) {
        debug!("Dialog {} closed: {:?}", kind.name(), choice);
        self.dialog_showing = false;
        if choice == UserChoice::CalibrateNow {
            self.calibrate().await;
        }
    }

    pub async fn calibrate(&mut self) {
        if self.calibrating {
            debug!("Calibration already running");
            return;
        }
        let Some(device) = self.acquire_device().await else {
            warn!("Cannot calibrate: motor not available");
            return;
        };

        self.calibrating = true;
        info!("Starting motor calibration");
        self.publish(PopupcamEvent::CalibrationStarted {
            timestamp: SystemTime::now(),
        });

        if let Err(e) = device.calibrate().await {
            warn!("Calibration call failed: {}", e);
            self.calibrating = false;
            self.note_device_error(&e);
        }
    }

    async fn issue(&mut self, target: Direction) {
        let Some(device) = self.acquire_device().await else {
            warn!("Motor not available, dropping {} request", target);
            return;
        };

        let now = Instant::now();
        self.busy = Some(Busy {
            until: now + self.motor.settle_delay(),
            command: None,
        });

        let status = match device.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Motor status query failed: {}", e);
                self.note_device_error(&e);
                return;
            }
        };

        if self.calibrating {
            info!("Calibration in progress, ignoring {} request", target);
            self.busy = None;
            self.feedback.go_home();
            self.show_dialog(DialogKind::Calibration(CalibrationResult::InProgress));
            return;
        }

        if !status.permits(target) {
            debug!("Motor status {:?} does not allow {}", status, target);
            self.busy = None;
            if status.is_error() {
                self.handle_error(status).await;
            }
            return;
        }

        match target {
            Direction::Open => self.failures.takeback_failures = 0,
            Direction::Close => self.failures.popup_failures = 0,
        }
        self.feedback.light_indicator(self.light_duration);
        self.feedback.play_feedback(target);

        let result = match target {
            Direction::Open => device.popup().await,
            Direction::Close => device.takeback().await,
        };
        if let Err(e) = result {
            warn!("Motor {} call failed: {}", target, e);
            self.note_device_error(&e);
            return;
        }

        info!("Camera {} issued", target);
        self.actuated(target, now, false);
    }

    /// Retract immediately, ignoring busy and any queued request
    async fn force_takeback(&mut self) {
        self.set_camera_state(CameraState::Closed);
        self.queued = None;
        self.clear_deferred_open();

        let Some(device) = self.acquire_device().await else {
            warn!("Motor not available, cannot force takeback");
            return;
        };

        self.feedback.light_indicator(self.light_duration);
        self.feedback.play_feedback(Direction::Close);
        if let Err(e) = device.takeback().await {
            warn!("Forced takeback failed: {}", e);
            self.note_device_error(&e);
            return;
        }

        self.actuated(Direction::Close, Instant::now(), true);
    }

    /// Bookkeeping after the device accepted a move
    fn actuated(&mut self, target: Direction, now: Instant, forced: bool) {
        self.busy = Some(Busy {
            until: now + self.motor.settle_delay(),
            command: Some(target),
        });
        self.pending = Some(PendingCommand {
            target,
            issued_at: now,
        });
        self.set_camera_state(target.target_state());
        self.publish(PopupcamEvent::CommandIssued {
            direction: target,
            forced,
            timestamp: SystemTime::now(),
        });

        match target {
            Direction::Open => self.arm_free_fall(),
            Direction::Close => self.disarm_free_fall(),
        }

        self.frequency.record_actuation(now);
        if self.frequency.is_frequent_now(now) && self.show_dialog(DialogKind::FrequencyWarning)
        {
            warn!("Popup camera operated too frequently");
            self.publish(PopupcamEvent::FrequentOperation {
                timestamp: SystemTime::now(),
            });
        }
    }

    async fn handle_error(&mut self, status: MotorStatus) {
        if self.dialog_showing {
            debug!("Dialog already showing, ignoring {:?}", status);
            return;
        }
        if matches!(self.errors_armed_at, Some(at) if Instant::now() < at) {
            debug!("Ignoring {:?} during boot grace period", status);
            return;
        }

        let needs_calibration = match status {
            MotorStatus::RequestCalib | MotorStatus::CalibError => true,
            MotorStatus::PopupJammed => {
                let max = self.motor.popup_max_failures;
                self.failures.popup_failures = (self.failures.popup_failures + 1).min(max);
                self.failures.popup_failures >= max
            }
            MotorStatus::TakebackJammed => {
                let max = self.motor.takeback_max_failures;
                self.failures.takeback_failures = (self.failures.takeback_failures + 1).min(max);
                if self.failures.takeback_failures < max {
                    self.retry_takeback().await;
                }
                self.failures.takeback_failures >= max
            }
            _ => return,
        };

        let was_closing = match status {
            MotorStatus::TakebackJammed => true,
            MotorStatus::PopupJammed => false,
            _ => match self.pending {
                Some(pending) => pending.target == Direction::Close,
                None => self.camera_state == CameraState::Closed,
            },
        };

        warn!(
            "Motor error {:?} (popup failures {}, takeback failures {}), calibration needed: {}",
            status,
            self.failures.popup_failures,
            self.failures.takeback_failures,
            needs_calibration
        );
        self.publish(PopupcamEvent::MotorJammed {
            status,
            needs_calibration,
            timestamp: SystemTime::now(),
        });

        self.feedback.go_home();
        self.show_dialog(DialogKind::Jam {
            needs_calibration,
            was_closing,
        });
    }

    /// One takeback attempt after a takeback jam; failures are not counted again
    async fn retry_takeback(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };
        debug!("Retrying takeback after jam");
        if let Err(e) = device.takeback().await {
            debug!("Takeback retry failed: {}", e);
            self.note_device_error(&e);
        }
    }

    /// Claim the single dialog slot; false when another dialog holds it
    fn show_dialog(&mut self, kind: DialogKind) -> bool {
        if self.dialog_showing {
            debug!("Dialog {} suppressed, another is showing", kind.name());
            return false;
        }
        self.dialog_showing = true;

        let feedback = Arc::clone(&self.feedback);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let choice = present_dialog(feedback.as_ref(), kind).await;
            let _ = mailbox.send(ControlMessage::DialogClosed { kind, choice });
        });
        true
    }

    async fn acquire_device(&mut self) -> Option<Arc<dyn MotorDevice>> {
        if let Some(device) = &self.device {
            return Some(Arc::clone(device));
        }

        let device = match self.connector.connect().await {
            Ok(device) => device,
            Err(e) => {
                warn!("Failed to bind motor device: {}", e);
                return None;
            }
        };

        self.generation += 1;
        let generation = self.generation;

        let mailbox = self.mailbox.clone();
        device.set_status_callback(Arc::new(move |status| {
            let _ = mailbox.send(ControlMessage::MotorStatus { generation, status });
        }));
        let mailbox = self.mailbox.clone();
        device.on_device_lost(Arc::new(move || {
            let _ = mailbox.send(ControlMessage::DeviceLost { generation });
        }));

        info!("Bound motor device (generation {})", generation);
        self.device = Some(Arc::clone(&device));
        self.publish(PopupcamEvent::DeviceConnection {
            connected: true,
            timestamp: SystemTime::now(),
        });
        Some(device)
    }

    fn note_device_error(&mut self, error: &DeviceError) {
        if error.is_connection_loss() && self.device.take().is_some() {
            self.publish(PopupcamEvent::DeviceConnection {
                connected: false,
                timestamp: SystemTime::now(),
            });
        }
    }

    fn proximity_near(&self) -> bool {
        self.proximity.as_ref().is_some_and(|gate| gate.is_near())
    }

    fn clear_deferred_open(&mut self) {
        if self.deferred_open {
            self.deferred_open = false;
            self.feedback.dismiss_obstruction_notice();
        }
    }

    fn arm_free_fall(&mut self) {
        if self.free_fall_guard.is_some() {
            return;
        }
        let Some(sensor) = &self.free_fall else {
            return;
        };
        let mailbox = self.mailbox.clone();
        match sensor.arm(Arc::new(move || {
            let _ = mailbox.send(ControlMessage::FreeFall);
        })) {
            Ok(guard) => self.free_fall_guard = Some(guard),
            Err(e) => warn!("Failed to arm free-fall sensor: {}", e),
        }
    }

    fn disarm_free_fall(&mut self) {
        self.free_fall_guard = None;
    }

    fn set_camera_state(&mut self, state: CameraState) {
        if self.camera_state == state {
            return;
        }
        let from = self.camera_state;
        self.camera_state = state;
        self.publish(PopupcamEvent::StateChanged {
            from,
            to: state,
            timestamp: SystemTime::now(),
        });
    }

    fn publish(&self, event: PopupcamEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            debug!("Event not delivered: {}", e);
        }
    }
}
