use super::controller::MotorController;
use super::device::MotorConnector;
use super::messages::ControlMessage;
use super::types::{ControllerSnapshot, Direction};
use crate::config::PopupcamConfig;
use crate::debounce::CameraActivityDebouncer;
use crate::error::{PopupcamError, Result};
use crate::events::EventBus;
use crate::feedback::FeedbackSink;
use crate::sensors::{FreeFallCapability, ProximityCapability};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Single task that owns the motor controller and the camera debouncer.
///
/// Messages are handled strictly in arrival order. Debounce, settle and retry
/// delays are deadlines raced against the mailbox, so nothing blocks and no
/// timers pile up.
pub struct MotorActor {
    controller: MotorController,
    debouncer: CameraActivityDebouncer,
    mailbox: mpsc::UnboundedReceiver<ControlMessage>,
}

impl MotorActor {
    pub fn builder(config: PopupcamConfig) -> MotorActorBuilder {
        MotorActorBuilder::new(config)
    }

    /// Boot the controller and process messages until shutdown
    pub async fn run(mut self) {
        info!("Motor actor starting");
        self.controller.boot().await;

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;

                _ = wait_for(deadline) => self.on_deadline().await,

                message = self.mailbox.recv() => match message {
                    Some(ControlMessage::Shutdown { response }) => {
                        self.controller.shutdown().await;
                        let _ = response.send(());
                        break;
                    }
                    Some(message) => self.handle(message).await,
                    None => {
                        self.controller.shutdown().await;
                        break;
                    }
                },
            }
        }

        info!("Motor actor stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.debouncer.next_deadline(), self.controller.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn on_deadline(&mut self) {
        if let Some(direction) = self.debouncer.poll(Instant::now()) {
            self.controller.request_transition(direction).await;
        }
        self.controller.on_tick().await;
    }

    async fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::CameraAvailable { camera_id } => {
                self.debouncer
                    .on_hardware_available(&camera_id, Instant::now());
            }
            ControlMessage::CameraUnavailable { camera_id } => {
                self.debouncer
                    .on_hardware_unavailable(&camera_id, Instant::now());
            }
            ControlMessage::RequestTransition { target } => {
                self.controller.request_transition(target).await;
            }
            ControlMessage::ScreenState { interactive } => {
                self.controller.on_screen_state(interactive).await;
            }
            ControlMessage::ProximityReading(reading) => {
                self.controller.on_proximity_reading(reading).await;
            }
            ControlMessage::FreeFall => self.controller.on_free_fall().await,
            ControlMessage::MotorStatus { generation, status } => {
                self.controller.on_status(generation, status).await;
            }
            ControlMessage::DeviceLost { generation } => {
                self.controller.on_device_lost(generation);
            }
            ControlMessage::DialogClosed { kind, choice } => {
                self.controller.on_dialog_closed(kind, choice).await;
            }
            ControlMessage::Calibrate => self.controller.calibrate().await,
            ControlMessage::Snapshot { response } => {
                let _ = response.send(self.controller.snapshot());
            }
            ControlMessage::Shutdown { response } => {
                // handled by the run loop
                let _ = response.send(());
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Builder for the motor actor and its handle
pub struct MotorActorBuilder {
    config: PopupcamConfig,
    connector: Option<Arc<dyn MotorConnector>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    event_bus: Option<Arc<EventBus>>,
    proximity: Option<Arc<dyn ProximityCapability>>,
    free_fall: Option<Arc<dyn FreeFallCapability>>,
}

impl MotorActorBuilder {
    pub fn new(config: PopupcamConfig) -> Self {
        Self {
            config,
            connector: None,
            feedback: None,
            event_bus: None,
            proximity: None,
            free_fall: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn MotorConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_proximity(mut self, sensor: Arc<dyn ProximityCapability>) -> Self {
        self.proximity = Some(sensor);
        self
    }

    pub fn with_free_fall(mut self, sensor: Arc<dyn FreeFallCapability>) -> Self {
        self.free_fall = Some(sensor);
        self
    }

    pub fn build(self) -> Result<(MotorActor, MotorHandle)> {
        let connector = self
            .connector
            .ok_or_else(|| PopupcamError::component("motor", "Motor connector is required"))?;
        let feedback = self
            .feedback
            .ok_or_else(|| PopupcamError::component("motor", "Feedback sink is required"))?;
        let event_bus = self.event_bus.unwrap_or_else(|| {
            Arc::new(EventBus::new(self.config.system.event_bus_capacity))
        });

        let (sender, mailbox) = mpsc::unbounded_channel();
        let mut controller =
            MotorController::new(&self.config, connector, feedback, event_bus, sender.clone());
        if let Some(sensor) = self.proximity {
            controller = controller.with_proximity(sensor);
        }
        if let Some(sensor) = self.free_fall {
            controller = controller.with_free_fall(sensor);
        }

        let actor = MotorActor {
            controller,
            debouncer: CameraActivityDebouncer::from_config(&self.config.debounce),
            mailbox,
        };
        Ok((actor, MotorHandle { sender }))
    }
}

/// Cloneable front door to the motor actor
#[derive(Clone)]
pub struct MotorHandle {
    sender: mpsc::UnboundedSender<ControlMessage>,
}

impl MotorHandle {
    pub fn camera_available(&self, camera_id: impl Into<String>) -> Result<()> {
        self.send(ControlMessage::CameraAvailable {
            camera_id: camera_id.into(),
        })
    }

    pub fn camera_unavailable(&self, camera_id: impl Into<String>) -> Result<()> {
        self.send(ControlMessage::CameraUnavailable {
            camera_id: camera_id.into(),
        })
    }

    pub fn request_transition(&self, target: Direction) -> Result<()> {
        self.send(ControlMessage::RequestTransition { target })
    }

    pub fn screen_state(&self, interactive: bool) -> Result<()> {
        self.send(ControlMessage::ScreenState { interactive })
    }

    pub fn calibrate(&self) -> Result<()> {
        self.send(ControlMessage::Calibrate)
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot> {
        let (message, response) = ControlMessage::snapshot();
        self.send(message)?;
        response.await.map_err(|_| Self::stopped())
    }

    /// Ask the actor to retract and stop; resolves once it has
    pub async fn shutdown(&self) -> Result<()> {
        let (message, response) = ControlMessage::shutdown();
        self.send(message)?;
        response.await.map_err(|_| Self::stopped())
    }

    pub fn send(&self, message: ControlMessage) -> Result<()> {
        debug!("Sending {:?}", message);
        self.sender.send(message).map_err(|_| Self::stopped())
    }

    fn stopped() -> PopupcamError {
        PopupcamError::component("motor", "Motor actor is not running")
    }
}
