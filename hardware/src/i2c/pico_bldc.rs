//! Pico-BLDC four channel brushless motor controller
//!
//! Registers are 16 bits wide, big-endian, one register per address. Motor
//! speeds are signed fixed point rotations per second with 10 fractional
//! bits. The controller carries its own watchdog that stops the motors when
//! the control word is not refreshed in time.

use std::thread;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use embedded_hal::i2c::I2c;
use tracing::{debug, error, info, warn};

use super::{read_u16, write_u16};
use crate::bus::{MotorDriver, MotorSetpoint, MotorTelemetry, PowerReading};
use crate::errors::{HardwareError, HardwareResult};

/// Default 7-bit bus address
pub const PICO_BLDC_ADDR: u8 = 0x42;

/// Speed register LSBs per rotation per second
pub const SPEED_SCALE_FACTOR: f64 = 1024.0;

const DEVICE: &str = "pico-bldc";

const BATT_V_LSB: f64 = 0.004;
const CURRENT_LSB: f64 = 0.000_183_105_468_8;
const POWER_LSB: f64 = CURRENT_LSB * 20.0;
const TEMPERATURE_LSB: f64 = 0.01;

/// Control word is rewritten at least this often while driving
const CTRL_REFRESH: Duration = Duration::from_millis(100);
const CALIBRATION_POLL: Duration = Duration::from_millis(10);

/// Register map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Ctrl = 0,
    Status,
    WatchdogTimeout,
    FaultCount,
    Mot0V,
    Mot1V,
    Mot2V,
    Mot3V,
    Mot0Calib,
    Mot1Calib,
    Mot2Calib,
    Mot3Calib,
    BattV,
    Current,
    Power,
    Temperature,
    Mot0Travel,
    Mot1Travel,
    Mot2Travel,
    Mot3Travel,
}

impl Register {
    fn offset(self, n: u8) -> u8 {
        self as u8 + n
    }
}

bitflags! {
    /// Control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtrlFlags: u16 {
        const ENABLE_I2C_CONTROL = 1 << 0;
        const RUN = 1 << 1;
        /// Self-clearing
        const DO_CALIB = 1 << 2;
        /// Self-clearing, zeroes all motor speeds
        const RESET = 1 << 3;
        const WATCHDOG_ENABLE = 1 << 4;
    }
}

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u16 {
        const FAULT = 1 << 0;
        const CALIB_DONE = 1 << 1;
        const WATCHDOG_EXPIRED = 1 << 2;
    }
}

/// Motor channel for each wheel, in [`MotorSetpoint::as_array`] order.
const WHEEL_CHANNELS: [u8; 4] = [3, 0, 2, 1];

/// Convert rotations per second to the controller's fixed-point speed.
pub fn rps_to_motor_speed(rps: f64) -> i16 {
    (rps * SPEED_SCALE_FACTOR).clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

pub fn motor_speed_to_rps(speed: i16) -> f64 {
    speed as f64 / SPEED_SCALE_FACTOR
}

/// Driver for the Pico-BLDC motor controller
pub struct PicoBldc<I> {
    i2c: I,
    address: u8,
    watchdog_enabled: bool,
    /// Last control word written, empty until the first configure
    last_ctrl: CtrlFlags,
    last_ctrl_time: Option<Instant>,
    calibration_timeout: Duration,
}

impl<I: I2c> PicoBldc<I> {
    pub fn new(i2c: I, address: u8, calibration_timeout: Duration) -> Self {
        Self {
            i2c,
            address,
            watchdog_enabled: false,
            last_ctrl: CtrlFlags::empty(),
            last_ctrl_time: None,
            calibration_timeout,
        }
    }

    /// Set the watchdog timeout and (re)write the control word.
    ///
    /// A zero timeout disables the watchdog. Timeouts longer than 65.535 s
    /// saturate.
    pub fn set_watchdog(&mut self, timeout: Duration) -> HardwareResult<()> {
        if timeout.is_zero() {
            self.watchdog_enabled = false;
        } else {
            let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
            self.write_reg(Register::WatchdogTimeout, ms)?;
            self.watchdog_enabled = true;
        }
        self.configure(true)
    }

    /// Write all four wheel speeds.
    pub fn set_motor_speeds(&mut self, setpoint: &MotorSetpoint) -> HardwareResult<()> {
        self.configure(false)?;
        for (channel, speed) in WHEEL_CHANNELS.iter().zip(setpoint.as_array()) {
            self.write_reg(Register::Mot0V.offset(*channel), speed as u16)?;
        }
        Ok(())
    }

    /// Refresh the control word unconditionally, which restarts the watchdog.
    pub fn pet_watchdog(&mut self) -> HardwareResult<()> {
        self.configure(true)
    }

    /// Raw wrapping travel counters in wheel order (FL, FR, BL, BR).
    pub fn raw_travel(&mut self) -> HardwareResult<[i16; 4]> {
        let mut raw = [0i16; 4];
        for (value, channel) in raw.iter_mut().zip(WHEEL_CHANNELS) {
            *value = self.read_reg(Register::Mot0Travel.offset(channel))? as i16;
        }
        Ok(raw)
    }

    pub fn bus_voltage(&mut self) -> HardwareResult<f64> {
        Ok(self.read_reg(Register::BattV)? as f64 * BATT_V_LSB)
    }

    pub fn current_amps(&mut self) -> HardwareResult<f64> {
        Ok(self.read_reg(Register::Current)? as i16 as f64 * CURRENT_LSB)
    }

    pub fn power_watts(&mut self) -> HardwareResult<f64> {
        Ok(self.read_reg(Register::Power)? as f64 * POWER_LSB)
    }

    pub fn temperature_c(&mut self) -> HardwareResult<f64> {
        Ok(self.read_reg(Register::Temperature)? as i16 as f64 * TEMPERATURE_LSB)
    }

    pub fn status(&mut self) -> HardwareResult<StatusFlags> {
        Ok(StatusFlags::from_bits_truncate(
            self.read_reg(Register::Status)?,
        ))
    }

    /// Stop the motors and hand control back to the controller's defaults.
    pub fn release(&mut self) -> HardwareResult<()> {
        let word = CtrlFlags::ENABLE_I2C_CONTROL | CtrlFlags::RESET;
        self.write_reg(Register::Ctrl as u8, word.bits())?;
        self.last_ctrl = CtrlFlags::ENABLE_I2C_CONTROL;
        self.last_ctrl_time = Some(Instant::now());
        Ok(())
    }

    fn configure(&mut self, force: bool) -> HardwareResult<()> {
        let mut word = CtrlFlags::ENABLE_I2C_CONTROL | CtrlFlags::RUN;
        if self.watchdog_enabled {
            word |= CtrlFlags::WATCHDOG_ENABLE;
        }

        let recent = self
            .last_ctrl_time
            .is_some_and(|t| t.elapsed() < CTRL_REFRESH);
        if !force && word == self.last_ctrl && recent {
            return Ok(());
        }

        if self.last_ctrl.is_empty() {
            let calib = self.read_reg(Register::Mot3Calib as u8)?;
            if calib == 0 {
                warn!("Pico-BLDC not calibrated, running calibration");
                word |= CtrlFlags::DO_CALIB;
            }
        }

        self.write_reg(Register::Ctrl as u8, word.bits())?;

        if word.contains(CtrlFlags::DO_CALIB) {
            self.wait_for_calibration()?;
        }

        self.write_reg(Register::Status as u8, StatusFlags::CALIB_DONE.bits())?;

        self.last_ctrl = word - CtrlFlags::RESET - CtrlFlags::DO_CALIB;
        self.last_ctrl_time = Some(Instant::now());
        Ok(())
    }

    fn wait_for_calibration(&mut self) -> HardwareResult<()> {
        let start = Instant::now();
        let mut last_log = start;
        loop {
            match self.status() {
                Ok(status) if status.contains(StatusFlags::CALIB_DONE) => break,
                Ok(status) => {
                    if last_log.elapsed() >= Duration::from_secs(1) {
                        info!("Waiting for calibration to finish, status={status:?}");
                        if status.contains(StatusFlags::FAULT) {
                            warn!("Motor fault during calibration, are the motors powered?");
                        }
                        last_log = Instant::now();
                    }
                }
                Err(e) => debug!("Status read failed during calibration: {e}"),
            }
            if start.elapsed() >= self.calibration_timeout {
                error!("Pico-BLDC calibration timed out");
                return Err(HardwareError::CalibrationTimeout(self.calibration_timeout));
            }
            thread::sleep(CALIBRATION_POLL);
        }

        let mut words = [0u16; 4];
        for (n, word) in words.iter_mut().enumerate() {
            *word = self.read_reg(Register::Mot0Calib.offset(n as u8))?;
        }
        info!("Calibration complete, words: {words:04x?}");
        Ok(())
    }

    fn write_reg(&mut self, reg: impl Into<u8>, value: u16) -> HardwareResult<()> {
        write_u16(&mut self.i2c, DEVICE, self.address, reg.into(), value)
    }

    fn read_reg(&mut self, reg: impl Into<u8>) -> HardwareResult<u16> {
        read_u16(&mut self.i2c, DEVICE, self.address, reg.into())
    }
}

impl From<Register> for u8 {
    fn from(reg: Register) -> u8 {
        reg as u8
    }
}

impl<I: I2c + Send> MotorDriver for PicoBldc<I> {
    fn enable_watchdog(&mut self, timeout: Duration) -> HardwareResult<()> {
        self.set_watchdog(timeout)
    }

    fn write_setpoint(&mut self, setpoint: &MotorSetpoint) -> HardwareResult<()> {
        self.set_motor_speeds(setpoint)
    }

    fn pet_watchdog(&mut self) -> HardwareResult<()> {
        PicoBldc::pet_watchdog(self)
    }

    fn travel_counters(&mut self) -> HardwareResult<[i16; 4]> {
        self.raw_travel()
    }

    fn telemetry(&mut self) -> HardwareResult<MotorTelemetry> {
        let status = self.status()?;
        Ok(MotorTelemetry {
            reading: PowerReading {
                name: "motors".to_string(),
                voltage: self.bus_voltage()?,
                current: self.current_amps()?,
                power: self.power_watts()?,
            },
            temperature_c: self.temperature_c()?,
            fault: status.contains(StatusFlags::FAULT),
            watchdog_expired: status.contains(StatusFlags::WATCHDOG_EXPIRED),
        })
    }

    fn release(&mut self) -> HardwareResult<()> {
        PicoBldc::release(self)
    }
}
