use crate::error::EventBusError;
use crate::motor::{CameraState, Direction, MotorStatus};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the popup camera system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PopupcamEvent {
    /// The controller's logical camera state changed
    StateChanged {
        from: CameraState,
        to: CameraState,
        timestamp: SystemTime,
    },
    /// A motion command was sent to the motor
    CommandIssued {
        direction: Direction,
        forced: bool,
        timestamp: SystemTime,
    },
    /// An open request was held back because something covers the camera
    OpenDeferred { timestamp: SystemTime },
    /// The motor reported a mechanical failure
    MotorJammed {
        status: MotorStatus,
        needs_calibration: bool,
        timestamp: SystemTime,
    },
    /// Calibration was started
    CalibrationStarted { timestamp: SystemTime },
    /// Calibration finished
    CalibrationFinished { success: bool, timestamp: SystemTime },
    /// Too many actuations in a short period
    FrequentOperation { timestamp: SystemTime },
    /// Proximity sensor changed state
    ProximityChanged { near: bool, timestamp: SystemTime },
    /// Motor device handle was bound or lost
    DeviceConnection {
        connected: bool,
        timestamp: SystemTime,
    },
    /// A dialog was shown to the user
    DialogShown { kind: String, timestamp: SystemTime },
    /// Return to the home screen was requested
    HomeRequested { timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl PopupcamEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            PopupcamEvent::StateChanged { timestamp, .. } => *timestamp,
            PopupcamEvent::CommandIssued { timestamp, .. } => *timestamp,
            PopupcamEvent::OpenDeferred { timestamp } => *timestamp,
            PopupcamEvent::MotorJammed { timestamp, .. } => *timestamp,
            PopupcamEvent::CalibrationStarted { timestamp } => *timestamp,
            PopupcamEvent::CalibrationFinished { timestamp, .. } => *timestamp,
            PopupcamEvent::FrequentOperation { timestamp } => *timestamp,
            PopupcamEvent::ProximityChanged { timestamp, .. } => *timestamp,
            PopupcamEvent::DeviceConnection { timestamp, .. } => *timestamp,
            PopupcamEvent::DialogShown { timestamp, .. } => *timestamp,
            PopupcamEvent::HomeRequested { timestamp } => *timestamp,
            PopupcamEvent::SystemError { .. } => SystemTime::now(),
            PopupcamEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PopupcamEvent::StateChanged { from, to, .. } => {
                format!("Camera state {:?} -> {:?}", from, to)
            }
            PopupcamEvent::CommandIssued {
                direction, forced, ..
            } => {
                if *forced {
                    format!("Forced {} command issued", direction)
                } else {
                    format!("{} command issued", direction)
                }
            }
            PopupcamEvent::OpenDeferred { .. } => "Open deferred: camera obstructed".to_string(),
            PopupcamEvent::MotorJammed {
                status,
                needs_calibration,
                ..
            } => {
                format!(
                    "Motor reported {:?} (calibration {})",
                    status,
                    if *needs_calibration {
                        "required"
                    } else {
                        "not required"
                    }
                )
            }
            PopupcamEvent::CalibrationStarted { .. } => "Calibration started".to_string(),
            PopupcamEvent::CalibrationFinished { success, .. } => {
                format!(
                    "Calibration {}",
                    if *success { "succeeded" } else { "failed" }
                )
            }
            PopupcamEvent::FrequentOperation { .. } => "Camera operated too frequently".to_string(),
            PopupcamEvent::ProximityChanged { near, .. } => {
                format!("Proximity {}", if *near { "near" } else { "far" })
            }
            PopupcamEvent::DeviceConnection { connected, .. } => {
                format!(
                    "Motor device {}",
                    if *connected { "bound" } else { "lost" }
                )
            }
            PopupcamEvent::DialogShown { kind, .. } => format!("Dialog shown: {}", kind),
            PopupcamEvent::HomeRequested { .. } => "Home screen requested".to_string(),
            PopupcamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            PopupcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PopupcamEvent::StateChanged { .. } => "state_changed",
            PopupcamEvent::CommandIssued { .. } => "command_issued",
            PopupcamEvent::OpenDeferred { .. } => "open_deferred",
            PopupcamEvent::MotorJammed { .. } => "motor_jammed",
            PopupcamEvent::CalibrationStarted { .. } => "calibration_started",
            PopupcamEvent::CalibrationFinished { .. } => "calibration_finished",
            PopupcamEvent::FrequentOperation { .. } => "frequent_operation",
            PopupcamEvent::ProximityChanged { .. } => "proximity_changed",
            PopupcamEvent::DeviceConnection { .. } => "device_connection",
            PopupcamEvent::DialogShown { .. } => "dialog_shown",
            PopupcamEvent::HomeRequested { .. } => "home_requested",
            PopupcamEvent::SystemError { .. } => "system_error",
            PopupcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for observing the controller, built on broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<PopupcamEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PopupcamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing never blocks; with no subscribers the event is dropped and
    /// `Ok(0)` is returned, since observation is optional.
    pub fn publish(&self, event: PopupcamEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            PopupcamEvent::MotorJammed { status, .. } => {
                warn!("Motor jammed: {:?}", status);
            }
            PopupcamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            PopupcamEvent::DeviceConnection { connected, .. } => {
                if *connected {
                    info!("Motor device bound");
                } else {
                    warn!("Motor device lost");
                }
            }
            PopupcamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&PopupcamEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &PopupcamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named receiver that only yields events passing its filter
pub struct EventReceiver {
    receiver: broadcast::Receiver<PopupcamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<PopupcamEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<PopupcamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<PopupcamEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
