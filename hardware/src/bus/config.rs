use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::i2c::{INA219_ADDRESSES, PCA9685_ADDR, PICO_BLDC_ADDR};

/// Bus loop and actuator bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// I2C character device for the actuator bus
    pub i2c_path: String,
    /// Loop period in milliseconds
    pub tick_ms: u64,
    /// Hardware watchdog timeout in milliseconds
    pub watchdog_timeout_ms: u64,
    /// Power monitor poll interval in milliseconds
    pub power_poll_interval_ms: u64,
    /// Minimum time between attempts to reopen a missing servo controller
    pub servo_retry_interval_ms: u64,
    /// Delay before restarting a failed bus session
    pub restart_backoff_ms: u64,
    /// Zero the desired motor setpoint when a session restarts after a failure
    pub zero_motors_on_restart: bool,
    /// Maximum time to wait for motor controller calibration
    pub calibration_timeout_ms: u64,
    pub motor_address: u8,
    pub servo_address: u8,
    pub power_monitor_addresses: Vec<u8>,
    /// Power monitor shunt resistance in ohms
    pub shunt_ohms: f64,
    /// Power monitor full-scale current in amps
    pub max_current_amps: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            i2c_path: "/dev/i2c-1".to_string(),
            tick_ms: 25,
            watchdog_timeout_ms: 1000,
            power_poll_interval_ms: 1000,
            servo_retry_interval_ms: 1000,
            restart_backoff_ms: 100,
            zero_motors_on_restart: true,
            calibration_timeout_ms: 30_000,
            motor_address: PICO_BLDC_ADDR,
            servo_address: PCA9685_ADDR,
            power_monitor_addresses: INA219_ADDRESSES.to_vec(),
            shunt_ohms: 0.1,
            max_current_amps: 3.2,
        }
    }
}

impl BusConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    /// Longest allowed gap between watchdog refreshes
    pub fn watchdog_refresh(&self) -> Duration {
        self.watchdog_timeout() / 10
    }

    pub fn power_poll_interval(&self) -> Duration {
        Duration::from_millis(self.power_poll_interval_ms)
    }

    pub fn servo_retry_interval(&self) -> Duration {
        Duration::from_millis(self.servo_retry_interval_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }
}
