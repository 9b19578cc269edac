//! PCA9685 16-channel PWM controller driving servos at 50 Hz.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use super::write_u8;
use crate::bus::{ServoDriver, NUM_SERVO_PORTS};
use crate::errors::{i2c_error, HardwareError, HardwareResult};

/// Default 7-bit bus address
pub const PCA9685_ADDR: u8 = 0x40;

const DEVICE: &str = "pca9685";

const REG_MODE1: u8 = 0x00;
const REG_LED_BASE: u8 = 0x06;
const REG_PRESCALE: u8 = 0xFE;

/// Prescaler for a 50 Hz output with the internal 25 MHz oscillator
const PRESCALE_50HZ: u8 = 0x79;

const PWM_PERIOD_US: f64 = 20_000.0;
const SERVO_MIN_PULSE_US: f64 = 1000.0;
const SERVO_MAX_PULSE_US: f64 = 2000.0;
const PWM_MAX: f64 = 4095.0;
const SERVO_MIN_COUNTS: f64 = PWM_MAX * SERVO_MIN_PULSE_US / PWM_PERIOD_US;
const SERVO_MAX_COUNTS: f64 = PWM_MAX * SERVO_MAX_PULSE_US / PWM_PERIOD_US;

pub struct Pca9685<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Pca9685<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Put the chip to sleep, set the 50 Hz prescaler, restart with
    /// register auto-increment enabled.
    pub fn configure(&mut self) -> HardwareResult<()> {
        write_u8(&mut self.i2c, DEVICE, self.address, REG_MODE1, 0x11)?;
        write_u8(&mut self.i2c, DEVICE, self.address, REG_PRESCALE, PRESCALE_50HZ)?;
        write_u8(&mut self.i2c, DEVICE, self.address, REG_MODE1, 0x01)?;
        // Oscillator needs 500 us after leaving sleep.
        thread::sleep(Duration::from_millis(1));
        write_u8(&mut self.i2c, DEVICE, self.address, REG_MODE1, 0x81)
    }

    /// Set a servo position, 0.0 to 1.0 across the 1-2 ms pulse range.
    pub fn set_servo(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        let value = value.clamp(0.0, 1.0);
        let counts = SERVO_MIN_COUNTS + value * (SERVO_MAX_COUNTS - SERVO_MIN_COUNTS);
        self.write_counts(port, counts as u16)
    }

    /// Set a raw duty cycle, 0.0 to 1.0.
    pub fn set_pwm(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        let value = value.clamp(0.0, 1.0);
        self.write_counts(port, (PWM_MAX * value) as u16)
    }

    fn write_counts(&mut self, port: usize, counts: u16) -> HardwareResult<()> {
        if port >= NUM_SERVO_PORTS {
            return Err(HardwareError::InvalidPort(port));
        }
        let reg = REG_LED_BASE + (port as u8) * 4;
        let [lo, hi] = counts.to_le_bytes();
        self.i2c
            .write(self.address, &[reg, 0, 0, lo, hi])
            .map_err(i2c_error(DEVICE))
    }
}

impl<I: I2c + Send> ServoDriver for Pca9685<I> {
    fn set_servo(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        Pca9685::set_servo(self, port, value)
    }

    fn set_pwm(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        Pca9685::set_pwm(self, port, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockI2c;

    #[test]
    fn test_configure_sequence() {
        let i2c = MockI2c::new();
        Pca9685::new(i2c.clone(), PCA9685_ADDR).configure().unwrap();
        assert_eq!(
            i2c.writes(PCA9685_ADDR),
            vec![
                vec![REG_MODE1, 0x11],
                vec![REG_PRESCALE, 0x79],
                vec![REG_MODE1, 0x01],
                vec![REG_MODE1, 0x81],
            ]
        );
    }

    #[test]
    fn test_servo_pulse_range() {
        let i2c = MockI2c::new();
        let mut pca = Pca9685::new(i2c.clone(), PCA9685_ADDR);
        pca.set_servo(0, 0.0).unwrap();
        pca.set_servo(15, 1.0).unwrap();
        pca.set_servo(2, 7.0).unwrap();

        let writes = i2c.writes(PCA9685_ADDR);
        // 1 ms of a 20 ms period is 204.75 counts, 2 ms is 409.5
        assert_eq!(writes[0], vec![0x06, 0, 0, 204, 0]);
        assert_eq!(writes[1], vec![0x06 + 60, 0, 0, (409 & 0xFF) as u8, 1]);
        assert_eq!(writes[2], vec![0x06 + 8, 0, 0, (409 & 0xFF) as u8, 1]);
    }

    #[test]
    fn test_pwm_full_scale() {
        let i2c = MockI2c::new();
        let mut pca = Pca9685::new(i2c.clone(), PCA9685_ADDR);
        pca.set_pwm(1, 1.0).unwrap();
        pca.set_pwm(1, -0.5).unwrap();
        let writes = i2c.writes(PCA9685_ADDR);
        assert_eq!(writes[0], vec![0x0A, 0, 0, 0xFF, 0x0F]);
        assert_eq!(writes[1], vec![0x0A, 0, 0, 0, 0]);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let i2c = MockI2c::new();
        let mut pca = Pca9685::new(i2c.clone(), PCA9685_ADDR);
        assert!(matches!(
            pca.set_pwm(16, 0.5),
            Err(HardwareError::InvalidPort(16))
        ));
        assert!(i2c.writes(PCA9685_ADDR).is_empty());
    }
}
