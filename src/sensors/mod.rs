mod freefall;
mod guard;
#[cfg(all(target_os = "linux", feature = "proximity_input"))]
mod input;
mod proximity;
#[cfg(test)]
mod tests;

pub use freefall::{FreeFallCallback, FreeFallCapability, SimulatedFreeFall};
pub use guard::SensorGuard;
#[cfg(all(target_os = "linux", feature = "proximity_input"))]
pub use input::EvdevProximity;
pub use proximity::{
    ProximityCapability, ProximityGate, ProximityReading, ProximityState, ProximityTransition,
    ReadingCallback, SimulatedProximity,
};
