//! Drivers for the devices on the robot's I2C buses.
//!
//! Every driver is generic over [`embedded_hal::i2c::I2c`] so the same code
//! runs against `linux_embedded_hal::I2cdev` on the robot and
//! [`crate::mock::MockI2c`] in tests.

mod distance;
mod ina219;
mod mpu6050;
mod pca9685;
mod pico_bldc;

pub use distance::DistanceTracker;
pub use ina219::{calibration_value, Ina219, INA219_ADDRESSES};
pub use mpu6050::{Mpu6050, MPU6050_ADDR};
pub use pca9685::{Pca9685, PCA9685_ADDR};
pub use pico_bldc::{
    motor_speed_to_rps, rps_to_motor_speed, CtrlFlags, PicoBldc, Register, StatusFlags,
    PICO_BLDC_ADDR, SPEED_SCALE_FACTOR,
};

use embedded_hal::i2c::I2c;

use crate::errors::{i2c_error, HardwareResult};

/// Write a big-endian 16-bit register.
pub(crate) fn write_u16<I: I2c>(
    i2c: &mut I,
    device: &'static str,
    address: u8,
    reg: u8,
    value: u16,
) -> HardwareResult<()> {
    let [hi, lo] = value.to_be_bytes();
    i2c.write(address, &[reg, hi, lo]).map_err(i2c_error(device))
}

/// Read a big-endian 16-bit register.
pub(crate) fn read_u16<I: I2c>(
    i2c: &mut I,
    device: &'static str,
    address: u8,
    reg: u8,
) -> HardwareResult<u16> {
    let mut buf = [0u8; 2];
    i2c.write_read(address, &[reg], &mut buf)
        .map_err(i2c_error(device))?;
    Ok(u16::from_be_bytes(buf))
}

/// Write a single 8-bit register.
pub(crate) fn write_u8<I: I2c>(
    i2c: &mut I,
    device: &'static str,
    address: u8,
    reg: u8,
    value: u8,
) -> HardwareResult<()> {
    i2c.write(address, &[reg, value]).map_err(i2c_error(device))
}
