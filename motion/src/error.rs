use std::path::PathBuf;

use hardware::{HardwareError, ImuError};
use thiserror::Error;

/// Errors from the motion controllers and their coordinator.
#[derive(Error, Debug)]
pub enum MotionError {
    /// Orientation data stopped arriving or could not be read.
    #[error("orientation sensor: {0}")]
    Imu(#[from] ImuError),

    /// Actuator bus or gyro device failure.
    #[error("hardware: {0}")]
    Hardware(#[from] HardwareError),

    /// The raw-control handle was used after its mode ended.
    #[error("raw motor control is no longer active")]
    ModeInactive,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type MotionResult<T> = Result<T, MotionError>;

/// Why [`crate::AbsoluteController::wait`] returned without converging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("wait cancelled")]
    Cancelled,

    /// The control loop exited, e.g. after an IMU stall or a mode switch.
    #[error("heading controller stopped")]
    ControllerStopped,
}
