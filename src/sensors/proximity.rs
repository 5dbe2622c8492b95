use super::guard::SensorGuard;
use crate::error::SensorError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Raw distance sample from a proximity sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityReading {
    pub distance: f32,
    pub timestamp: Instant,
}

pub type ReadingCallback = Arc<dyn Fn(ProximityReading) + Send + Sync>;

/// Proximity sensor as seen by the gate
pub trait ProximityCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Readings below this distance count as near
    fn max_range(&self) -> f32;

    /// Start delivering readings until the returned guard is dropped
    fn register(&self, callback: ReadingCallback) -> Result<SensorGuard, SensorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProximityState {
    pub near: bool,
    pub initialized: bool,
}

/// What a reading meant to the gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProximityTransition {
    /// First reading after enabling
    Init { near: bool },
    /// Near/far flipped
    Changed { near: bool, timestamp: Instant },
}

/// Near/far gate in front of a proximity sensor
pub struct ProximityGate {
    sensor: Arc<dyn ProximityCapability>,
    callback: ReadingCallback,
    registration: Option<SensorGuard>,
    state: ProximityState,
    near_latch: bool,
}

impl ProximityGate {
    pub fn new(sensor: Arc<dyn ProximityCapability>, callback: ReadingCallback) -> Self {
        Self {
            sensor,
            callback,
            registration: None,
            state: ProximityState::default(),
            near_latch: false,
        }
    }

    pub fn enable(&mut self) -> Result<(), SensorError> {
        if self.registration.is_some() {
            return Ok(());
        }
        let guard = self.sensor.register(Arc::clone(&self.callback))?;
        info!("Proximity sensor {} enabled", self.sensor.name());
        self.registration = Some(guard);
        Ok(())
    }

    pub fn disable(&mut self) {
        if let Some(guard) = self.registration.take() {
            drop(guard);
            info!("Proximity sensor {} disabled", self.sensor.name());
        }
        self.state = ProximityState::default();
    }

    pub fn is_enabled(&self) -> bool {
        self.registration.is_some()
    }

    /// Fold one reading into the gate state
    pub fn on_reading(&mut self, reading: ProximityReading) -> Option<ProximityTransition> {
        if self.registration.is_none() {
            debug!("Dropping proximity reading while disabled");
            return None;
        }

        let near = reading.distance < self.sensor.max_range();
        if near {
            self.near_latch = true;
        }

        if !self.state.initialized {
            self.state = ProximityState {
                near,
                initialized: true,
            };
            return Some(ProximityTransition::Init { near });
        }

        if near == self.state.near {
            return None;
        }
        self.state.near = near;
        Some(ProximityTransition::Changed {
            near,
            timestamp: reading.timestamp,
        })
    }

    pub fn is_near(&self) -> bool {
        self.state.initialized && self.state.near
    }

    pub fn saw_near_since_armed(&self) -> bool {
        self.near_latch
    }

    pub fn clear_near_latch(&mut self) {
        self.near_latch = self.is_near();
    }

    pub fn state(&self) -> ProximityState {
        self.state
    }
}

impl Drop for ProximityGate {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Proximity sensor driven from code: keyboard simulation and tests
pub struct SimulatedProximity {
    max_range: f32,
    registration: Mutex<Option<(ReadingCallback, CancellationToken)>>,
}

impl SimulatedProximity {
    pub fn new(max_range: f32) -> Self {
        Self {
            max_range,
            registration: Mutex::new(None),
        }
    }

    /// Deliver a reading if anyone is registered
    pub fn emit(&self, distance: f32) -> bool {
        let registration = self.registration.lock();
        match registration.as_ref() {
            Some((callback, token)) if !token.is_cancelled() => {
                callback(ProximityReading {
                    distance,
                    timestamp: Instant::now(),
                });
                true
            }
            _ => false,
        }
    }

    pub fn set_near(&self, near: bool) -> bool {
        if near {
            self.emit(0.0)
        } else {
            self.emit(self.max_range)
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration
            .lock()
            .as_ref()
            .map(|(_, token)| !token.is_cancelled())
            .unwrap_or(false)
    }
}

impl ProximityCapability for SimulatedProximity {
    fn name(&self) -> &str {
        "simulated-proximity"
    }

    fn max_range(&self) -> f32 {
        self.max_range
    }

    fn register(&self, callback: ReadingCallback) -> Result<SensorGuard, SensorError> {
        let guard = SensorGuard::new(self.name());
        *self.registration.lock() = Some((callback, guard.token()));
        Ok(guard)
    }
}
