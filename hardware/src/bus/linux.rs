//! Bus backend for the robot's Linux I2C character device.

use linux_embedded_hal::I2cdev;
use tracing::{info, warn};

use super::config::BusConfig;
use super::driver::{BusBackend, MotorDriver, PowerMonitor, ServoDriver};
use crate::errors::{HardwareError, HardwareResult};
use crate::i2c::{Ina219, Pca9685, PicoBldc};

/// Opens Pico-BLDC, PCA9685 and INA219 devices on one I2C bus
#[derive(Debug, Clone)]
pub struct LinuxBackend {
    config: BusConfig,
}

impl LinuxBackend {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    fn open_bus(&self) -> HardwareResult<I2cdev> {
        I2cdev::new(&self.config.i2c_path).map_err(|e| HardwareError::Open {
            path: self.config.i2c_path.clone(),
            message: e.to_string(),
        })
    }
}

impl BusBackend for LinuxBackend {
    fn open_motors(&mut self) -> HardwareResult<Box<dyn MotorDriver>> {
        let bus = self.open_bus()?;
        Ok(Box::new(PicoBldc::new(
            bus,
            self.config.motor_address,
            self.config.calibration_timeout(),
        )))
    }

    fn open_servos(&mut self) -> HardwareResult<Box<dyn ServoDriver>> {
        let mut pca = Pca9685::new(self.open_bus()?, self.config.servo_address);
        pca.configure()?;
        Ok(Box::new(pca))
    }

    fn open_power_monitors(&mut self) -> Vec<Box<dyn PowerMonitor>> {
        let mut monitors: Vec<Box<dyn PowerMonitor>> = Vec::new();
        for &address in &self.config.power_monitor_addresses {
            let bus = match self.open_bus() {
                Ok(bus) => bus,
                Err(e) => {
                    warn!("Skipping power monitors: {e}");
                    break;
                }
            };
            let mut ina = Ina219::new(bus, address);
            match ina.configure(self.config.shunt_ohms, self.config.max_current_amps) {
                Ok(()) => {
                    info!("Found power monitor at {address:#04x}");
                    monitors.push(Box::new(ina));
                }
                Err(e) => warn!("Power monitor at {address:#04x} unavailable: {e}"),
            }
        }
        monitors
    }
}
