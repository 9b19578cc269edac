//! Single-writer actuator bus.
//!
//! [`BusController`] runs the only thread that talks to the motor, servo
//! and power monitor devices. Devices are reached through the
//! [`BusBackend`] seam: [`LinuxBackend`] on the robot and
//! [`crate::mock::MockBackend`] in tests.

mod config;
mod controller;
mod driver;
mod linux;
mod setpoint;
mod telemetry;

pub use config::BusConfig;
pub use controller::BusController;
pub use driver::{BusBackend, MotorDriver, NullServo, PowerMonitor, ServoDriver};
pub use linux::LinuxBackend;
pub use setpoint::{validate_servo, MotorSetpoint, ServoTable, ServoValue, NUM_SERVO_PORTS};
pub use telemetry::{FaultFlags, LogTelemetry, MotorTelemetry, PowerReading, TelemetrySink};
