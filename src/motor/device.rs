use super::types::MotorStatus;
use crate::error::DeviceError;
use async_trait::async_trait;
use std::sync::Arc;

/// Invoked with every unsolicited status the motor reports
pub type StatusCallback = Arc<dyn Fn(MotorStatus) + Send + Sync>;

/// Invoked once when the connection to the motor is lost
pub type DeathCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to the popup motor.
///
/// Every call may fail; callers treat failures as transient and carry on.
#[async_trait]
pub trait MotorDevice: Send + Sync {
    async fn status(&self) -> Result<MotorStatus, DeviceError>;

    async fn popup(&self) -> Result<(), DeviceError>;

    async fn takeback(&self) -> Result<(), DeviceError>;

    async fn calibrate(&self) -> Result<(), DeviceError>;

    /// Replace the status listener
    fn set_status_callback(&self, callback: StatusCallback);

    /// Register the listener for connection loss
    fn on_device_lost(&self, callback: DeathCallback);
}

/// Acquires a fresh motor handle
#[async_trait]
pub trait MotorConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MotorDevice>, DeviceError>;
}
