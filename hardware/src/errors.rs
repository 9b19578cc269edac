use std::time::Duration;

use embedded_hal::i2c::ErrorKind;
use thiserror::Error;

/// Errors from the actuator bus and its devices.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("I2C transaction with {device} failed: {kind:?}")]
    I2c {
        device: &'static str,
        kind: ErrorKind,
    },

    #[error("failed to open I2C bus {path}: {message}")]
    Open { path: String, message: String },

    #[error("invalid port {0}, must be 0-15")]
    InvalidPort(usize),

    #[error("value {0} out of range, must be 0.0-1.0")]
    InvalidValue(f64),

    #[error("motor controller calibration did not finish within {0:?}")]
    CalibrationTimeout(Duration),

    #[error("bus loop is not running")]
    NotRunning,
}

pub type HardwareResult<T> = Result<T, HardwareError>;

/// Map a HAL error into a [`HardwareError`] tagged with the device name.
pub(crate) fn i2c_error<E: embedded_hal::i2c::Error>(device: &'static str) -> impl Fn(E) -> HardwareError {
    move |e| HardwareError::I2c {
        device,
        kind: e.kind(),
    }
}

/// Errors from orientation acquisition.
#[derive(Error, Debug)]
pub enum ImuError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("no orientation report within {0:?}, acquisition loop has stalled")]
    Stalled(Duration),
}

pub type ImuResult<T> = Result<T, ImuError>;
