use super::{ComponentState, PopupcamOrchestrator};
use crate::error::{EventBusError, PopupcamError, Result};
use crate::events::{EventFilter, EventReceiver};
use crate::keyboard_input::{KeyboardInputHandler, SimulationControls};
use crate::motor::MotorActor;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl PopupcamOrchestrator {
    /// Build all system components without starting them
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing popup camera components");

        let (actor, handle) = MotorActor::builder(self.config.clone())
            .with_connector(Arc::clone(&self.connector))
            .with_feedback(Arc::clone(&self.feedback))
            .with_event_bus(Arc::clone(&self.event_bus))
            .with_proximity(Arc::clone(&self.proximity))
            .with_free_fall(self.free_fall.clone())
            .build()?;

        if self.keyboard_enabled {
            self.keyboard_handler = Some(KeyboardInputHandler::new(SimulationControls {
                motor_handle: handle.clone(),
                motor: Arc::clone(&self.motor),
                proximity: self.simulated_proximity.clone(),
                free_fall: Arc::clone(&self.free_fall),
                preferences: Arc::clone(&self.preferences),
                event_bus: Arc::clone(&self.event_bus),
                camera_id: self.config.debounce.front_camera_id.clone(),
            }));
        }

        self.motor_actor = Some(actor);
        self.motor_handle = Some(handle);

        let mut states = self.component_states.lock().await;
        states.insert("motor".to_string(), ComponentState::Stopped);
        states.insert("events".to_string(), ComponentState::Stopped);
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting popup camera daemon");

        // Subscribe before the motor boots so its first events are logged
        self.set_component_state("events", ComponentState::Starting)
            .await;
        self.event_logger = Some(self.spawn_event_logger());
        self.set_component_state("events", ComponentState::Running)
            .await;

        self.set_component_state("motor", ComponentState::Starting)
            .await;
        let actor = self.motor_actor.take().ok_or_else(|| {
            error!("Motor actor missing; was initialize() called?");
            PopupcamError::component("motor", "Motor actor not initialized")
        })?;
        self.motor_task = Some(tokio::spawn(actor.run()));
        self.set_component_state("motor", ComponentState::Running)
            .await;
        info!("Motor controller started");

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
            }
        }

        info!("Popup camera daemon started successfully");
        Ok(())
    }

    fn spawn_event_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::All,
            "event_logger".to_string(),
        );
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => info!("{}", event.description()),
                        Err(EventBusError::Lagged(n)) => warn!("Event logger skipped {} events", n),
                        Err(e) => {
                            debug!("Event logger stopping: {}", e);
                            break;
                        }
                    },
                }
            }
        })
    }
}
