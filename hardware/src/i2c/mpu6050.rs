//! MPU-6050 gyroscope used as a yaw-rate source.
//!
//! Only one gyro axis is pushed into the FIFO. The axis that ends up
//! vertical depends on how the board is mounted, so it is configurable.

use std::time::Duration;

use embedded_hal::i2c::I2c;
use tracing::info;

use super::{read_u16, write_u8};
use crate::errors::{i2c_error, HardwareResult};

/// Default 7-bit bus address
pub const MPU6050_ADDR: u8 = 0x68;

const DEVICE: &str = "mpu6050";

const REG_SAMPLE_RATE_DIV: u8 = 25;
const REG_CONFIG: u8 = 26;
const REG_GYRO_CONFIG: u8 = 27;
const REG_FIFO_ENABLE: u8 = 35;
const REG_GYRO_X: u8 = 67;
const REG_USER_CTRL: u8 = 106;
const REG_FIFO_COUNT: u8 = 114;
const REG_FIFO_RW: u8 = 116;

/// +/-1000 degrees per second full scale
const GYRO_RANGE: u8 = 2;
const SAMPLE_RATE_DIV: u8 = 9;
/// Gyro output rate with the low pass filter enabled
const GYRO_OUTPUT_PERIOD: Duration = Duration::from_millis(1);

const FIFO_EN_XG: u8 = 1 << 6;
const USER_CTRL_FIFO_EN: u8 = 1 << 6;
const USER_CTRL_FIFO_RESET: u8 = 1 << 2;
const FIFO_MAX_READ: usize = 512;

pub struct Mpu6050<I> {
    i2c: I,
    address: u8,
    /// Gyro axis streamed to the FIFO: 0 = X, 1 = Y, 2 = Z
    axis: u8,
    /// Zero-rate offset in raw LSBs
    offset: f64,
}

impl<I: I2c> Mpu6050<I> {
    pub fn new(i2c: I, address: u8, axis: u8) -> Self {
        Self {
            i2c,
            address,
            axis: axis.min(2),
            offset: 0.0,
        }
    }

    pub fn configure(&mut self) -> HardwareResult<()> {
        self.write(REG_GYRO_CONFIG, GYRO_RANGE << 3)?;
        // DLPF on, gyro output rate 1 kHz
        self.write(REG_CONFIG, 1)?;
        self.write(REG_SAMPLE_RATE_DIV, SAMPLE_RATE_DIV)?;
        self.write(REG_FIFO_ENABLE, FIFO_EN_XG >> self.axis)
    }

    /// Average `samples` readings with the robot at rest to find the zero-rate offset.
    pub fn calibrate(&mut self, samples: usize) -> HardwareResult<f64> {
        info!("Calibrating gyro over {samples} samples");
        let samples = samples.max(1);
        let mut sum = 0.0;
        for _ in 0..samples {
            sum += self.read_gyro_raw()? as f64;
        }
        self.offset = sum / samples as f64;
        info!("Gyro offset: {:.2} LSB", self.offset);
        Ok(self.offset)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn read_gyro_raw(&mut self) -> HardwareResult<i16> {
        let reg = REG_GYRO_X + 2 * self.axis;
        Ok(read_u16(&mut self.i2c, DEVICE, self.address, reg)? as i16)
    }

    pub fn reset_fifo(&mut self) -> HardwareResult<()> {
        self.write(REG_USER_CTRL, USER_CTRL_FIFO_EN | USER_CTRL_FIFO_RESET)
    }

    /// Drain the FIFO, returning raw samples oldest first.
    pub fn read_fifo(&mut self) -> HardwareResult<Vec<i16>> {
        let count = (read_u16(&mut self.i2c, DEVICE, self.address, REG_FIFO_COUNT)? & 0x0FFF) as usize;
        let count = count.min(FIFO_MAX_READ) & !1;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; count];
        self.i2c
            .write_read(self.address, &[REG_FIFO_RW], &mut buf)
            .map_err(i2c_error(DEVICE))?;
        Ok(buf
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect())
    }

    /// Drain the FIFO and convert to offset-corrected degrees per second.
    pub fn read_rates(&mut self) -> HardwareResult<Vec<f64>> {
        let scale = Self::degrees_per_lsb();
        Ok(self
            .read_fifo()?
            .into_iter()
            .map(|raw| (raw as f64 - self.offset) * scale)
            .collect())
    }

    /// Time between FIFO samples
    pub fn sample_period() -> Duration {
        GYRO_OUTPUT_PERIOD * (1 + SAMPLE_RATE_DIV as u32)
    }

    pub fn degrees_per_lsb() -> f64 {
        1000.0 / i16::MAX as f64
    }

    fn write(&mut self, reg: u8, value: u8) -> HardwareResult<()> {
        write_u8(&mut self.i2c, DEVICE, self.address, reg, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockI2c;
    use approx::assert_relative_eq;

    #[test]
    fn test_configure_selects_axis() {
        let i2c = MockI2c::new();
        Mpu6050::new(i2c.clone(), MPU6050_ADDR, 2).configure().unwrap();
        let writes = i2c.writes(MPU6050_ADDR);
        assert_eq!(writes[0], vec![REG_GYRO_CONFIG, 0x10]);
        assert_eq!(writes[3], vec![REG_FIFO_ENABLE, 1 << 4]);
    }

    #[test]
    fn test_sample_period() {
        assert_eq!(Mpu6050::<MockI2c>::sample_period(), Duration::from_millis(10));
    }

    #[test]
    fn test_fifo_decoding_and_offset() {
        let i2c = MockI2c::new();
        i2c.set_register(MPU6050_ADDR, REG_GYRO_X + 4, &100i16.to_be_bytes());
        i2c.set_register(MPU6050_ADDR, REG_FIFO_COUNT, &[0xF0, 0x04]);
        i2c.set_register(MPU6050_ADDR, REG_FIFO_RW, &[0x00, 0x64, 0x7F, 0xFF]);

        let mut mpu = Mpu6050::new(i2c, MPU6050_ADDR, 2);
        assert_relative_eq!(mpu.calibrate(10).unwrap(), 100.0);

        assert_eq!(mpu.read_fifo().unwrap(), vec![100, i16::MAX]);
        let rates = mpu.read_rates().unwrap();
        assert_relative_eq!(rates[0], 0.0);
        assert_relative_eq!(rates[1], (i16::MAX as f64 - 100.0) * 1000.0 / 32767.0);
    }

    #[test]
    fn test_empty_fifo() {
        let i2c = MockI2c::new();
        let mut mpu = Mpu6050::new(i2c, MPU6050_ADDR, 0);
        assert!(mpu.read_fifo().unwrap().is_empty());
    }
}
