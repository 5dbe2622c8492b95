mod actor;
mod controller;
mod device;
mod messages;
mod simulator;
mod types;
#[cfg(test)]
mod tests;

pub use actor::{MotorActor, MotorActorBuilder, MotorHandle};
pub use controller::MotorController;
pub use device::{DeathCallback, MotorConnector, MotorDevice, StatusCallback};
pub use messages::ControlMessage;
pub use simulator::{MotorCall, SimulatedConnector, SimulatedMotor};
pub use types::{
    CameraState, ControllerPhase, ControllerSnapshot, Direction, FailureCounters, MotorStatus,
    PendingCommand,
};
