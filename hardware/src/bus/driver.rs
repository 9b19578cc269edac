//! Device seams used by the bus loop.
//!
//! A [`BusBackend`] opens fresh device handles at the start of every bus
//! session. Handles are dropped when a session fails, so a backend must be
//! able to open them again.

use std::time::Duration;

use super::setpoint::MotorSetpoint;
use super::telemetry::{MotorTelemetry, PowerReading};
use crate::errors::HardwareResult;

/// Four-wheel motor controller with a hardware watchdog
pub trait MotorDriver: Send {
    /// Arm the watchdog. Called once per session before any speed write.
    fn enable_watchdog(&mut self, timeout: Duration) -> HardwareResult<()>;

    fn write_setpoint(&mut self, setpoint: &MotorSetpoint) -> HardwareResult<()>;

    fn pet_watchdog(&mut self) -> HardwareResult<()>;

    /// Raw wrapping travel counters in wheel order
    fn travel_counters(&mut self) -> HardwareResult<[i16; 4]>;

    fn telemetry(&mut self) -> HardwareResult<MotorTelemetry>;

    /// Stop the motors at the end of a session.
    fn release(&mut self) -> HardwareResult<()>;
}

/// Servo/PWM output controller
pub trait ServoDriver: Send {
    fn set_servo(&mut self, port: usize, value: f64) -> HardwareResult<()>;

    fn set_pwm(&mut self, port: usize, value: f64) -> HardwareResult<()>;

    /// True for the stand-in used while the real controller is unavailable.
    fn is_stub(&self) -> bool {
        false
    }
}

/// Stand-in servo driver that discards every write
#[derive(Debug, Default)]
pub struct NullServo;

impl ServoDriver for NullServo {
    fn set_servo(&mut self, _port: usize, _value: f64) -> HardwareResult<()> {
        Ok(())
    }

    fn set_pwm(&mut self, _port: usize, _value: f64) -> HardwareResult<()> {
        Ok(())
    }

    fn is_stub(&self) -> bool {
        true
    }
}

pub trait PowerMonitor: Send {
    fn name(&self) -> &str;

    fn read(&mut self) -> HardwareResult<PowerReading>;
}

/// Opens the devices on the actuator bus
pub trait BusBackend: Send {
    fn open_motors(&mut self) -> HardwareResult<Box<dyn MotorDriver>>;

    /// Open and configure the servo controller.
    fn open_servos(&mut self) -> HardwareResult<Box<dyn ServoDriver>>;

    /// Open every power monitor that responds; missing ones are skipped.
    fn open_power_monitors(&mut self) -> Vec<Box<dyn PowerMonitor>>;
}
