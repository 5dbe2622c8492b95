use super::types::{ComponentState, ShutdownReason};
use crate::config::PopupcamConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::feedback::{DaemonFeedback, FeedbackSink, PreferenceStore};
use crate::keyboard_input::KeyboardInputHandler;
use crate::motor::{MotorActor, MotorConnector, MotorHandle, SimulatedConnector, SimulatedMotor};
use crate::sensors::{ProximityCapability, SimulatedFreeFall, SimulatedProximity};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Range reported by the simulated proximity sensor
const SIMULATED_PROXIMITY_RANGE: f32 = 5.0;

/// Main application coordinator that wires the motor actor to its collaborators
pub struct PopupcamOrchestrator {
    pub(super) config: PopupcamConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) preferences: Arc<PreferenceStore>,

    // Hardware
    pub(super) motor: Arc<SimulatedMotor>,
    pub(super) connector: Arc<dyn MotorConnector>,
    pub(super) feedback: Arc<dyn FeedbackSink>,
    pub(super) proximity: Arc<dyn ProximityCapability>,
    pub(super) simulated_proximity: Option<Arc<SimulatedProximity>>,
    pub(super) free_fall: Arc<SimulatedFreeFall>,

    // Components
    pub(super) motor_actor: Option<MotorActor>,
    pub(super) motor_handle: Option<MotorHandle>,
    pub(super) motor_task: Option<JoinHandle<()>>,
    pub(super) event_logger: Option<JoinHandle<()>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl PopupcamOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub async fn new(config: PopupcamConfig) -> Result<Self> {
        let capacity = config.system.event_bus_capacity;
        let event_bus = Arc::new(if tracing::enabled!(tracing::Level::DEBUG) {
            EventBus::with_debug_logging(capacity)
        } else {
            EventBus::new(capacity)
        });
        let preferences = Arc::new(PreferenceStore::load(&config.feedback.preferences_path));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let motor = Arc::new(SimulatedMotor::from_config(&config.simulator));
        let connector: Arc<dyn MotorConnector> =
            Arc::new(SimulatedConnector::new(Arc::clone(&motor)));
        let feedback: Arc<dyn FeedbackSink> = Arc::new(DaemonFeedback::new(
            &config.feedback,
            Arc::clone(&preferences),
            Arc::clone(&event_bus),
        ));
        let (proximity, simulated_proximity) = open_proximity(&config, Arc::clone(&event_bus))?;

        Ok(Self {
            config,
            event_bus,
            preferences,
            motor,
            connector,
            feedback,
            proximity,
            simulated_proximity,
            free_fall: Arc::new(SimulatedFreeFall::new()),
            motor_actor: None,
            motor_handle: None,
            motor_task: None,
            event_logger: None,
            keyboard_handler: None,
            keyboard_enabled: false, // Disabled by default, enable via set_keyboard_enabled()
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard simulation
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Replace the feedback sink; takes effect at `initialize`
    pub fn set_feedback(&mut self, feedback: Arc<dyn FeedbackSink>) {
        self.feedback = feedback;
    }

    /// Replace the motor connector; takes effect at `initialize`
    pub fn set_connector(&mut self, connector: Arc<dyn MotorConnector>) {
        self.connector = connector;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Handle to the running motor actor, available after `initialize`
    pub fn motor_handle(&self) -> Option<MotorHandle> {
        self.motor_handle.clone()
    }

    pub fn simulated_motor(&self) -> Arc<SimulatedMotor> {
        Arc::clone(&self.motor)
    }

    pub fn config(&self) -> &PopupcamConfig {
        &self.config
    }
}

#[cfg(all(target_os = "linux", feature = "proximity_input"))]
fn open_proximity(
    config: &PopupcamConfig,
    event_bus: Arc<EventBus>,
) -> Result<(Arc<dyn ProximityCapability>, Option<Arc<SimulatedProximity>>)> {
    if let Some(device) = &config.proximity.device {
        let sensor = crate::sensors::EvdevProximity::open(device)?.with_event_bus(event_bus);
        info!("Using proximity sensor at {}", device);
        return Ok((Arc::new(sensor), None));
    }
    Ok(simulated_proximity())
}

#[cfg(not(all(target_os = "linux", feature = "proximity_input")))]
fn open_proximity(
    config: &PopupcamConfig,
    _event_bus: Arc<EventBus>,
) -> Result<(Arc<dyn ProximityCapability>, Option<Arc<SimulatedProximity>>)> {
    if let Some(device) = &config.proximity.device {
        info!(
            "Proximity device {} ignored; built without proximity_input",
            device
        );
    }
    Ok(simulated_proximity())
}

fn simulated_proximity() -> (Arc<dyn ProximityCapability>, Option<Arc<SimulatedProximity>>) {
    let sensor = Arc::new(SimulatedProximity::new(SIMULATED_PROXIMITY_RANGE));
    (sensor.clone(), Some(sensor))
}
