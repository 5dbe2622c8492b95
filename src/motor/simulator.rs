use super::device::{DeathCallback, MotorConnector, MotorDevice, StatusCallback};
use super::types::{Direction, MotorStatus};
use crate::config::SimulatorConfig;
use crate::error::DeviceError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Call made against the simulated motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCall {
    Status,
    Popup,
    Takeback,
    Calibrate,
}

#[derive(Default)]
struct SimState {
    status: Option<MotorStatus>,
    calls: Vec<MotorCall>,
    connected: bool,
    failing: bool,
    popup_jams: u32,
    takeback_jams: u32,
    calibration_fails: bool,
    status_callback: Option<StatusCallback>,
    death_callback: Option<DeathCallback>,
}

/// In-process popup motor.
///
/// Moves take `travel` and then report their outcome through the status
/// callback, the same way the vendor HAL does. Jams, call failures and
/// connection loss can be injected.
pub struct SimulatedMotor {
    state: Arc<Mutex<SimState>>,
    travel: Duration,
}

impl SimulatedMotor {
    /// A retracted motor
    pub fn new(travel: Duration) -> Self {
        Self::with_status(MotorStatus::TakebackOk, travel)
    }

    pub fn with_status(status: MotorStatus, travel: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                status: Some(status),
                connected: true,
                ..SimState::default()
            })),
            travel,
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(Duration::from_millis(config.travel_ms))
    }

    pub fn current_status(&self) -> MotorStatus {
        self.state.lock().status.unwrap_or(MotorStatus::RequestCalib)
    }

    /// Change the reported status without notifying
    pub fn set_status(&self, status: MotorStatus) {
        self.state.lock().status = Some(status);
    }

    /// Change the status and notify the listener, like an unsolicited HAL event
    pub fn notify(&self, status: MotorStatus) {
        Self::settle(&self.state, status);
    }

    /// Make the next `count` moves in `direction` jam
    pub fn jam_next(&self, direction: Direction, count: u32) {
        let mut state = self.state.lock();
        match direction {
            Direction::Open => state.popup_jams = count,
            Direction::Close => state.takeback_jams = count,
        }
    }

    /// Make every call fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn fail_calibration(&self, fail: bool) {
        self.state.lock().calibration_fails = fail;
    }

    /// Drop the connection and fire the death listener
    pub fn disconnect(&self) {
        let callback = {
            let mut state = self.state.lock();
            state.connected = false;
            state.status_callback = None;
            state.death_callback.take()
        };
        info!("Simulated motor disconnected");
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn calls(&self) -> Vec<MotorCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: MotorCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Moves only; status queries are left out
    pub fn commands(&self) -> Vec<MotorCall> {
        self.state
            .lock()
            .calls
            .iter()
            .copied()
            .filter(|call| *call != MotorCall::Status)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn reconnect(&self) {
        let mut state = self.state.lock();
        if !state.connected {
            debug!("Simulated motor reconnected");
        }
        state.connected = true;
    }

    fn begin(&self, call: MotorCall) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(DeviceError::Disconnected);
        }
        state.calls.push(call);
        if state.failing {
            return Err(DeviceError::CallFailed {
                operation: match call {
                    MotorCall::Status => "status",
                    MotorCall::Popup => "popup",
                    MotorCall::Takeback => "takeback",
                    MotorCall::Calibrate => "calibrate",
                },
                details: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn outcome(&self, call: MotorCall) -> MotorStatus {
        let mut state = self.state.lock();
        match call {
            MotorCall::Popup if state.popup_jams > 0 => {
                state.popup_jams -= 1;
                MotorStatus::PopupJammed
            }
            MotorCall::Popup => MotorStatus::PopupOk,
            MotorCall::Takeback if state.takeback_jams > 0 => {
                state.takeback_jams -= 1;
                MotorStatus::TakebackJammed
            }
            MotorCall::Takeback => MotorStatus::TakebackOk,
            MotorCall::Calibrate if state.calibration_fails => MotorStatus::CalibError,
            MotorCall::Calibrate => MotorStatus::CalibOk,
            MotorCall::Status => state.status.unwrap_or(MotorStatus::RequestCalib),
        }
    }

    /// Finish a move after the travel time
    fn complete(&self, call: MotorCall) {
        let outcome = self.outcome(call);
        if self.travel.is_zero() {
            Self::settle(&self.state, outcome);
            return;
        }

        let state = Arc::clone(&self.state);
        let travel = self.travel;
        tokio::spawn(async move {
            tokio::time::sleep(travel).await;
            Self::settle(&state, outcome);
        });
    }

    fn settle(state: &Mutex<SimState>, status: MotorStatus) {
        let callback = {
            let mut state = state.lock();
            if !state.connected {
                return;
            }
            state.status = Some(status);
            state.status_callback.clone()
        };
        debug!("Simulated motor status: {:?}", status);
        if let Some(callback) = callback {
            callback(status);
        }
    }
}

#[async_trait]
impl MotorDevice for SimulatedMotor {
    async fn status(&self) -> Result<MotorStatus, DeviceError> {
        self.begin(MotorCall::Status)?;
        Ok(self.current_status())
    }

    async fn popup(&self) -> Result<(), DeviceError> {
        self.begin(MotorCall::Popup)?;
        self.complete(MotorCall::Popup);
        Ok(())
    }

    async fn takeback(&self) -> Result<(), DeviceError> {
        self.begin(MotorCall::Takeback)?;
        self.complete(MotorCall::Takeback);
        Ok(())
    }

    async fn calibrate(&self) -> Result<(), DeviceError> {
        self.begin(MotorCall::Calibrate)?;
        self.complete(MotorCall::Calibrate);
        Ok(())
    }

    fn set_status_callback(&self, callback: StatusCallback) {
        self.state.lock().status_callback = Some(callback);
    }

    fn on_device_lost(&self, callback: DeathCallback) {
        self.state.lock().death_callback = Some(callback);
    }
}

/// Hands out the simulated motor; reachability can be toggled
pub struct SimulatedConnector {
    motor: Arc<SimulatedMotor>,
    reachable: AtomicBool,
    connects: AtomicUsize,
}

impl SimulatedConnector {
    pub fn new(motor: Arc<SimulatedMotor>) -> Self {
        Self {
            motor,
            reachable: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn motor(&self) -> Arc<SimulatedMotor> {
        Arc::clone(&self.motor)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Successful connections so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MotorConnector for SimulatedConnector {
    async fn connect(&self) -> Result<Arc<dyn MotorDevice>, DeviceError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable);
        }
        self.motor.reconnect();
        self.connects.fetch_add(1, Ordering::SeqCst);
        let device: Arc<dyn MotorDevice> = self.motor.clone();
        Ok(device)
    }
}
