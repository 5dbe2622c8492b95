use super::guard::SensorGuard;
use crate::error::SensorError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type FreeFallCallback = Arc<dyn Fn() + Send + Sync>;

/// Drop detector; reports only while armed
pub trait FreeFallCapability: Send + Sync {
    fn arm(&self, callback: FreeFallCallback) -> Result<SensorGuard, SensorError>;
}

/// Free-fall sensor triggered from code
#[derive(Default)]
pub struct SimulatedFreeFall {
    armed: Mutex<Option<(FreeFallCallback, CancellationToken)>>,
}

impl SimulatedFreeFall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a drop; returns false when the sensor is not armed
    pub fn trigger(&self) -> bool {
        let armed = self.armed.lock();
        match armed.as_ref() {
            Some((callback, token)) if !token.is_cancelled() => {
                callback();
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .map(|(_, token)| !token.is_cancelled())
            .unwrap_or(false)
    }
}

impl FreeFallCapability for SimulatedFreeFall {
    fn arm(&self, callback: FreeFallCallback) -> Result<SensorGuard, SensorError> {
        let guard = SensorGuard::new("simulated-freefall");
        *self.armed.lock() = Some((callback, guard.token()));
        Ok(guard)
    }
}
