//! Messages accepted by the motor actor.
//!
//! Every event source (camera availability, sensors, screen state, the motor
//! device itself, dialogs) is turned into a `ControlMessage` and sent to one
//! mailbox, so the controller sees a single ordered stream.

use super::types::{ControllerSnapshot, Direction, MotorStatus};
use crate::feedback::{DialogKind, UserChoice};
use crate::sensors::ProximityReading;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum ControlMessage {
    /// Camera subsystem reports the camera free again
    CameraAvailable { camera_id: String },

    /// Camera subsystem reports the camera taken by a client
    CameraUnavailable { camera_id: String },

    /// Move the camera directly, bypassing the debouncer
    RequestTransition { target: Direction },

    /// Screen became interactive or went off
    ScreenState { interactive: bool },

    ProximityReading(ProximityReading),

    /// Drop detected by the free-fall sensor
    FreeFall,

    /// Unsolicited status from the device bound as `generation`
    MotorStatus { generation: u64, status: MotorStatus },

    /// The device bound as `generation` went away
    DeviceLost { generation: u64 },

    /// A dialog was dismissed with `choice`
    DialogClosed { kind: DialogKind, choice: UserChoice },

    /// Start motor calibration
    Calibrate,

    /// Report the controller state
    Snapshot {
        response: oneshot::Sender<ControllerSnapshot>,
    },

    /// Retract if open and stop the actor
    Shutdown { response: oneshot::Sender<()> },
}

impl ControlMessage {
    pub fn snapshot() -> (Self, oneshot::Receiver<ControllerSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::Snapshot { response: tx }, rx)
    }

    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
