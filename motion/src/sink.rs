//! Where the controllers send their motor output.

use hardware::bus::{BusController, MotorSetpoint};
use hardware::HardwareResult;

/// Actuator surface the coordinator drives
///
/// Implemented by [`BusController`] on the robot and by recorders in tests.
pub trait MotorSink: Send + Sync {
    fn set_motor_setpoint(&self, setpoint: MotorSetpoint);

    fn set_servo(&self, port: usize, value: f64) -> HardwareResult<()>;

    fn set_pwm(&self, port: usize, value: f64) -> HardwareResult<()>;
}

impl MotorSink for BusController {
    fn set_motor_setpoint(&self, setpoint: MotorSetpoint) {
        BusController::set_motor_setpoint(self, setpoint)
    }

    fn set_servo(&self, port: usize, value: f64) -> HardwareResult<()> {
        BusController::set_servo(self, port, value)
    }

    fn set_pwm(&self, port: usize, value: f64) -> HardwareResult<()> {
        BusController::set_pwm(self, port, value)
    }
}
