//! INA219 bus voltage / current / power monitor.

use embedded_hal::i2c::I2c;

use super::{read_u16, write_u16};
use crate::bus::{PowerMonitor, PowerReading};
use crate::errors::HardwareResult;

/// Addresses of the monitors fitted to the robot
pub const INA219_ADDRESSES: [u8; 2] = [0x41, 0x44];

const DEVICE: &str = "ina219";

const REG_BUS_VOLTAGE: u8 = 2;
const REG_POWER: u8 = 3;
const REG_CURRENT: u8 = 4;
const REG_CALIBRATION: u8 = 5;

const BUS_VOLTAGE_LSB: f64 = 0.004;

/// Calibration register value for the chosen current resolution.
///
/// From the datasheet: `trunc(0.04096 / (current_lsb * r_shunt))`.
pub fn calibration_value(current_lsb: f64, shunt_ohms: f64) -> u16 {
    (0.04096 / (current_lsb * shunt_ohms)) as u16
}

pub struct Ina219<I> {
    i2c: I,
    address: u8,
    name: String,
    current_lsb: f64,
}

impl<I: I2c> Ina219<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            name: format!("ina219@{address:#04x}"),
            current_lsb: 0.0,
        }
    }

    /// Program the calibration register for full resolution up to `max_current` amps.
    pub fn configure(&mut self, shunt_ohms: f64, max_current: f64) -> HardwareResult<()> {
        self.current_lsb = max_current / (1u32 << 15) as f64;
        let cal = calibration_value(self.current_lsb, shunt_ohms);
        tracing::debug!("{} calibration value: {cal:#x}", self.name);
        write_u16(&mut self.i2c, DEVICE, self.address, REG_CALIBRATION, cal)
    }

    pub fn bus_voltage(&mut self) -> HardwareResult<f64> {
        let raw = read_u16(&mut self.i2c, DEVICE, self.address, REG_BUS_VOLTAGE)?;
        Ok((raw >> 3) as f64 * BUS_VOLTAGE_LSB)
    }

    pub fn current(&mut self) -> HardwareResult<f64> {
        let raw = read_u16(&mut self.i2c, DEVICE, self.address, REG_CURRENT)?;
        Ok(raw as i16 as f64 * self.current_lsb)
    }

    pub fn power(&mut self) -> HardwareResult<f64> {
        let raw = read_u16(&mut self.i2c, DEVICE, self.address, REG_POWER)?;
        Ok(raw as f64 * self.current_lsb * 20.0)
    }
}

impl<I: I2c + Send> PowerMonitor for Ina219<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> HardwareResult<PowerReading> {
        Ok(PowerReading {
            name: self.name.clone(),
            voltage: self.bus_voltage()?,
            current: self.current()?,
            power: self.power()?,
        })
    }
}
