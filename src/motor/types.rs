use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Direction of travel requested from the motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Open => Direction::Close,
            Direction::Close => Direction::Open,
        }
    }

    /// Camera state reached once a command in this direction is issued
    pub fn target_state(self) -> CameraState {
        match self {
            Direction::Open => CameraState::Open,
            Direction::Close => CameraState::Closed,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Open => write!(f, "open"),
            Direction::Close => write!(f, "close"),
        }
    }
}

/// Logical position of the popup camera as tracked by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraState {
    Open,
    Closed,
    #[default]
    Unknown,
}

/// Status reported by the motor device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorStatus {
    PopupOk,
    PopupJammed,
    TakebackOk,
    TakebackJammed,
    Pressed,
    CalibOk,
    CalibError,
    RequestCalib,
}

impl MotorStatus {
    /// Vendor HAL status code
    pub fn code(self) -> i32 {
        match self {
            MotorStatus::PopupOk => 11,
            MotorStatus::PopupJammed => 12,
            MotorStatus::TakebackOk => 13,
            MotorStatus::TakebackJammed => 14,
            MotorStatus::Pressed => 15,
            MotorStatus::CalibOk => 17,
            MotorStatus::CalibError => 18,
            MotorStatus::RequestCalib => 19,
        }
    }

    /// Statuses that send the controller into error escalation
    pub fn is_error(self) -> bool {
        matches!(
            self,
            MotorStatus::RequestCalib
                | MotorStatus::PopupJammed
                | MotorStatus::TakebackJammed
                | MotorStatus::CalibError
        )
    }

    /// Whether the motor is ready to move in `direction`
    pub fn permits(self, direction: Direction) -> bool {
        match direction {
            Direction::Open => matches!(self, MotorStatus::TakebackOk | MotorStatus::CalibOk),
            Direction::Close => matches!(self, MotorStatus::PopupOk | MotorStatus::CalibOk),
        }
    }
}

impl TryFrom<i32> for MotorStatus {
    type Error = DeviceError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            11 => Ok(MotorStatus::PopupOk),
            12 => Ok(MotorStatus::PopupJammed),
            13 => Ok(MotorStatus::TakebackOk),
            14 => Ok(MotorStatus::TakebackJammed),
            15 => Ok(MotorStatus::Pressed),
            17 => Ok(MotorStatus::CalibOk),
            18 => Ok(MotorStatus::CalibError),
            19 => Ok(MotorStatus::RequestCalib),
            other => Err(DeviceError::UnknownStatus(other)),
        }
    }
}

/// Command issued to the device and not yet confirmed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommand {
    pub target: Direction,
    pub issued_at: Instant,
}

/// Per-direction jam counters, each saturating at its cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureCounters {
    pub popup_failures: u32,
    pub takeback_failures: u32,
}

/// Externally visible phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    CommandInFlight(Direction),
    CalibratingInFlight,
}

/// Point-in-time view of the controller, used for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub camera_state: CameraState,
    pub phase: ControllerPhase,
    pub busy: bool,
    pub calibrating: bool,
    pub dialog_showing: bool,
    pub deferred_open: bool,
    pub queued: Option<Direction>,
    pub pending: Option<PendingCommand>,
    pub failures: FailureCounters,
    pub device_bound: bool,
    pub free_fall_armed: bool,
}
