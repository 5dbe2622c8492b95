pub mod app;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod feedback;
pub mod frequency;
pub mod keyboard_input;
pub mod motor;
pub mod sensors;

pub use app::{ComponentState, PopupcamOrchestrator, ShutdownReason};
pub use config::PopupcamConfig;
pub use debounce::CameraActivityDebouncer;
pub use error::{DeviceError, EventBusError, FeedbackError, PopupcamError, Result, SensorError};
pub use events::{EventBus, EventFilter, EventReceiver, PopupcamEvent};
pub use feedback::{DaemonFeedback, FeedbackSink, RecordingFeedback, UserChoice};
pub use frequency::FrequencyGuard;
pub use keyboard_input::{KeyCommand, KeyboardInputHandler};
pub use motor::{
    CameraState, ControllerSnapshot, Direction, MotorActor, MotorConnector, MotorDevice,
    MotorHandle, MotorStatus, SimulatedConnector, SimulatedMotor,
};
