use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopupcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Motor device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Feedback error: {0}")]
    Feedback(#[from] FeedbackError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PopupcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by the motor device or its connection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Motor service is not available")]
    Unavailable,

    #[error("Motor device disconnected")]
    Disconnected,

    #[error("Motor call {operation} failed: {details}")]
    CallFailed {
        operation: &'static str,
        details: String,
    },

    #[error("Unknown motor status code: {0}")]
    UnknownStatus(i32),
}

impl DeviceError {
    /// Whether the handle that produced this error should be dropped
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, DeviceError::Disconnected | DeviceError::Unavailable)
    }
}

#[derive(Error, Debug, Clone)]
pub enum SensorError {
    #[error("Sensor {0} is not present")]
    NotPresent(String),

    #[error("Failed to open sensor device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Sensor device {0} does not report distance")]
    UnsupportedDevice(String),
}

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Failed to write LED {path}: {source}")]
    LedWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start sound player {player}: {source}")]
    SoundPlayer {
        player: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid preferences file {path}: {details}")]
    Preferences { path: String, details: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PopupcamError>;
