//! Robot configuration.
//!
//! Every tunable lives here with its default. [`RobotConfig::load`] reads an
//! optional JSON file; fields it leaves out keep their defaults.

use std::f64::consts::PI;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use hardware::bus::BusConfig;
use hardware::i2c::{rps_to_motor_speed, MPU6050_ADDR};
use hardware::imu::ImuConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MotionError, MotionResult};
use crate::pid::PidGains;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub bus: BusConfig,
    pub imu: ImuConfig,
    pub chassis: ChassisConfig,
    pub absolute: AbsoluteConfig,
    pub relative: RelativeConfig,
    pub rate_source: RateSourceConfig,
}

impl RobotConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> MotionResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(MotionError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| MotionError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Drive train geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub wheel_diameter_mm: f64,
    /// Distance between left and right wheel centres
    pub width_mm: f64,
    /// Distance between front and back wheel centres
    pub wheel_base_mm: f64,
    /// Wheel speed that normalised output 1.0 maps to
    pub max_wheel_rps: f64,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            wheel_diameter_mm: 70.0,
            width_mm: 170.0,
            wheel_base_mm: 190.0,
            max_wheel_rps: 10.0,
        }
    }
}

impl ChassisConfig {
    pub fn wheel_circumference_mm(&self) -> f64 {
        self.wheel_diameter_mm * PI
    }

    pub fn centre_to_wheel_mm(&self) -> f64 {
        (self.width_mm / 2.0).hypot(self.wheel_base_mm / 2.0)
    }

    /// Distance a wheel travels while the robot turns a full circle on the spot
    pub fn turning_circle_mm(&self) -> f64 {
        PI * self.centre_to_wheel_mm() * 2.0
    }

    pub fn max_wheel_speed_mm_per_s(&self) -> f64 {
        self.max_wheel_rps * self.wheel_circumference_mm()
    }

    /// Wheel surface speed needed to turn the robot at `degrees_per_sec`
    pub fn wheel_speed_for_yaw_rate(&self, degrees_per_sec: f64) -> f64 {
        degrees_per_sec * self.turning_circle_mm() / 360.0
    }

    /// Motor controller units for normalised output 1.0
    pub fn motor_full_scale(&self) -> f64 {
        rps_to_motor_speed(self.max_wheel_rps) as f64
    }

    pub fn rotations_to_mm(&self, rotations: f64) -> f64 {
        rotations * self.wheel_circumference_mm()
    }
}

/// Absolute heading hold, paced by orientation reports
///
/// Correction and throttle are fractions of full wheel speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsoluteConfig {
    pub gains: PidGains,
    pub max_throttle_delta_per_sec: f64,
    /// Error band in degrees counted as settled by `wait`
    pub converge_threshold_deg: f64,
    /// Settled ticks `wait` needs to see, exclusive
    pub converge_ticks: u32,
}

impl Default for AbsoluteConfig {
    fn default() -> Self {
        Self {
            gains: PidGains {
                kp: 0.01,
                ki: 0.03,
                kd: 0.0001,
                max_integral: 0.3,
                max_derivative: 100.0,
                max_output: 0.3,
            },
            max_throttle_delta_per_sec: 1.0,
            converge_threshold_deg: 1.0,
            converge_ticks: 7,
        }
    }
}

/// Relative (yaw rate) heading hold, paced by a timer
///
/// The PID works in degrees and produces a robot yaw rate in degrees per
/// second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeConfig {
    pub tick_ms: u64,
    pub gains: PidGains,
    /// Integral only accumulates while |error| is inside this band
    pub integral_window_deg: f64,
    /// Furthest the integrated target may run ahead of the estimate
    pub max_lead_deg: f64,
    /// Yaw rate for a full-scale yaw input
    pub max_yaw_rate_dps: f64,
    /// Commanded yaw rates above this bypass the PID
    pub yaw_override_dps: f64,
    /// Throttle targets below this magnitude apply immediately
    pub throttle_snap: f64,
    pub max_throttle_delta_per_sec: f64,
    /// Scale applied to translation to make up for roller slip
    pub mecanum_factor: f64,
}

impl Default for RelativeConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            gains: PidGains {
                kp: 6.0,
                ki: 0.8,
                kd: 0.1,
                max_integral: 20.0,
                max_derivative: 100.0,
                max_output: 900.0,
            },
            integral_window_deg: 5.0,
            max_lead_deg: 20.0,
            max_yaw_rate_dps: 500.0,
            yaw_override_dps: 30.0,
            throttle_snap: 0.4,
            max_throttle_delta_per_sec: 2.0,
            mecanum_factor: 1.044,
        }
    }
}

impl RelativeConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Where the relative controller gets its yaw rate from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSourceKind {
    /// Differentiate the orientation sensor's heading
    #[default]
    Orientation,
    /// MPU-6050 gyro FIFO on its own I2C bus
    Mpu6050,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSourceConfig {
    pub kind: RateSourceKind,
    pub gyro_i2c_path: String,
    pub gyro_address: u8,
    /// Gyro axis pointing up: 0 = X, 1 = Y, 2 = Z
    pub gyro_axis: u8,
    pub calibration_samples: usize,
    /// Negate gyro rates, for a gyro mounted upside down
    pub invert: bool,
}

impl Default for RateSourceConfig {
    fn default() -> Self {
        Self {
            kind: RateSourceKind::Orientation,
            gyro_i2c_path: "/dev/i2c-0".to_string(),
            gyro_address: MPU6050_ADDR,
            gyro_axis: 2,
            calibration_samples: 100,
            invert: true,
        }
    }
}
