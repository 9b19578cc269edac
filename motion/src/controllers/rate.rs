//! Yaw-rate inputs for the relative heading hold.

use std::sync::Arc;
use std::time::Instant;

use embedded_hal::i2c::I2c;
use hardware::i2c::Mpu6050;
use hardware::imu::{OrientationReport, OrientationState, REPORT_STALL_TIMEOUT};
use hardware::{CancelToken, HardwareError, ImuError};
use linux_embedded_hal::I2cdev;
use tracing::info;

use super::wait_for_first_report;
use crate::angle::Angle;
use crate::config::{RateSourceConfig, RateSourceKind};
use crate::error::MotionResult;

/// One yaw-rate measurement covering `dt` seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub degrees_per_sec: f64,
    pub dt: f64,
}

impl RateSample {
    /// Heading change over the sample
    pub fn degrees(&self) -> f64 {
        self.degrees_per_sec * self.dt
    }
}

/// Source of robot yaw rate, polled once per control tick
///
/// `read` returns every sample gathered since the previous call, oldest
/// first, and may return none. An error ends the control loop.
pub trait RateSource: Send {
    /// Block until the source can produce samples. Returns `false` if
    /// `cancel` fired first.
    fn wait_ready(&mut self, _cancel: &CancelToken) -> MotionResult<bool> {
        Ok(true)
    }

    fn read(&mut self) -> MotionResult<Vec<RateSample>>;
}

/// Builds a fresh rate source each time a relative hold starts
pub type RateSourceFactory = Box<dyn Fn() -> MotionResult<Box<dyn RateSource>> + Send + Sync>;

/// Yaw rate from successive orientation reports
///
/// Only the latest report is visible, so any reports missed between polls
/// are folded into one sample spanning the gap.
pub struct ReportRateSource {
    orientation: Arc<OrientationState>,
    last: Option<OrientationReport>,
    last_fresh: Option<Instant>,
}

impl ReportRateSource {
    pub fn new(orientation: Arc<OrientationState>) -> Self {
        Self {
            orientation,
            last: None,
            last_fresh: None,
        }
    }
}

impl RateSource for ReportRateSource {
    fn wait_ready(&mut self, cancel: &CancelToken) -> MotionResult<bool> {
        let Some(first) = wait_for_first_report(&self.orientation, cancel) else {
            return Ok(false);
        };
        self.last = Some(first);
        self.last_fresh = Some(Instant::now());
        Ok(true)
    }

    fn read(&mut self) -> MotionResult<Vec<RateSample>> {
        let latest = self.orientation.current_report();
        let fresh = match (latest, self.last) {
            (Some(report), Some(last)) if report.capture_time > last.capture_time => Some(report),
            (Some(report), None) => Some(report),
            _ => None,
        };

        let Some(report) = fresh else {
            // Stall clock starts with the first report
            if self
                .last_fresh
                .is_some_and(|seen| seen.elapsed() > REPORT_STALL_TIMEOUT)
            {
                return Err(ImuError::Stalled(REPORT_STALL_TIMEOUT).into());
            }
            return Ok(Vec::new());
        };

        self.last_fresh = Some(Instant::now());
        let previous = self.last.replace(report);
        let Some(previous) = previous else {
            return Ok(Vec::new());
        };

        let dt = report
            .capture_time
            .duration_since(previous.capture_time)
            .as_secs_f64();
        if dt <= 0.0 {
            return Ok(Vec::new());
        }
        let delta = Angle::from_float(report.robot_yaw())
            .sub(Angle::from_float(previous.robot_yaw()))
            .to_float();
        Ok(vec![RateSample {
            degrees_per_sec: delta / dt,
            dt,
        }])
    }
}

/// Yaw rate from an MPU-6050 gyro FIFO
pub struct Mpu6050RateSource<I> {
    gyro: Mpu6050<I>,
    invert: bool,
}

impl<I: I2c + Send> Mpu6050RateSource<I> {
    /// Configure and calibrate the gyro, then start its FIFO.
    ///
    /// The robot must be stationary while this runs.
    pub fn new(mut gyro: Mpu6050<I>, calibration_samples: usize, invert: bool) -> MotionResult<Self> {
        gyro.configure()?;
        gyro.calibrate(calibration_samples)?;
        gyro.reset_fifo()?;
        Ok(Self { gyro, invert })
    }
}

impl Mpu6050RateSource<I2cdev> {
    pub fn open(config: &RateSourceConfig) -> MotionResult<Self> {
        info!(
            "Opening gyro at {} address {:#04x}",
            config.gyro_i2c_path, config.gyro_address
        );
        let i2c = I2cdev::new(&config.gyro_i2c_path).map_err(|e| HardwareError::Open {
            path: config.gyro_i2c_path.clone(),
            message: e.to_string(),
        })?;
        let gyro = Mpu6050::new(i2c, config.gyro_address, config.gyro_axis);
        Self::new(gyro, config.calibration_samples, config.invert)
    }
}

impl<I: I2c + Send> RateSource for Mpu6050RateSource<I> {
    fn read(&mut self) -> MotionResult<Vec<RateSample>> {
        let dt = Mpu6050::<I>::sample_period().as_secs_f64();
        let sign = if self.invert { -1.0 } else { 1.0 };
        Ok(self
            .gyro
            .read_rates()?
            .into_iter()
            .map(|rate| RateSample {
                degrees_per_sec: sign * rate,
                dt,
            })
            .collect())
    }
}

/// Factory for the configured source kind.
pub fn rate_source_factory(
    config: RateSourceConfig,
    orientation: Arc<OrientationState>,
) -> RateSourceFactory {
    Box::new(move || -> MotionResult<Box<dyn RateSource>> {
        match config.kind {
            RateSourceKind::Orientation => Ok(Box::new(ReportRateSource::new(orientation.clone()))),
            RateSourceKind::Mpu6050 => Ok(Box::new(Mpu6050RateSource::open(&config)?)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bno08x::mock::build_frame;
    use hardware::i2c::MPU6050_ADDR;
    use hardware::mock::MockI2c;
    use std::time::Duration;

    use crate::error::MotionError;

    const REG_FIFO_COUNT: u8 = 114;
    const REG_FIFO_RW: u8 = 116;

    fn heading_report(index: u8, heading: f64, capture_time: Instant) -> OrientationReport {
        // Sensor rolled -90 degrees, so robot heading is the negated sensor yaw
        let yaw = (-heading * 100.0).round() as i16;
        OrientationReport::from_frame(&build_frame(index, yaw, 0, -9000, [0, 0, 981]), capture_time)
    }

    #[test]
    fn test_report_source_differentiates_heading() {
        let state = Arc::new(OrientationState::new());
        let mut source = ReportRateSource::new(state.clone());
        assert!(source.read().unwrap().is_empty());

        let t0 = Instant::now();
        state.publish(heading_report(0, 170.0, t0));
        assert!(source.read().unwrap().is_empty());

        // Crossing the seam is a 20 degree turn, not -340
        state.publish(heading_report(1, -170.0, t0 + Duration::from_millis(100)));
        let samples = source.read().unwrap();
        assert_eq!(samples.len(), 1);
        assert_relative_eq!(samples[0].dt, 0.1, epsilon = 1e-9);
        assert_relative_eq!(samples[0].degrees(), 20.0, epsilon = 1e-6);

        assert!(source.read().unwrap().is_empty());
    }

    #[test]
    fn test_report_source_stalls() {
        let state = Arc::new(OrientationState::new());
        let mut source = ReportRateSource::new(state);
        source.last_fresh = Some(Instant::now() - REPORT_STALL_TIMEOUT - Duration::from_millis(1));
        assert!(matches!(
            source.read(),
            Err(MotionError::Imu(ImuError::Stalled(_)))
        ));
    }

    #[test]
    fn test_report_source_idles_before_first_report() {
        let state = Arc::new(OrientationState::new());
        let mut source = ReportRateSource::new(state.clone());
        std::thread::sleep(REPORT_STALL_TIMEOUT + Duration::from_millis(100));
        assert!(source.read().unwrap().is_empty());

        state.publish(heading_report(0, 5.0, Instant::now()));
        assert!(source.read().unwrap().is_empty());
        assert!(source.last_fresh.is_some());
    }

    #[test]
    fn test_report_source_ready_takes_first_report() {
        let state = Arc::new(OrientationState::new());
        let mut source = ReportRateSource::new(state.clone());
        let t0 = Instant::now();
        state.publish(heading_report(0, 10.0, t0));
        assert!(source.wait_ready(&CancelToken::new()).unwrap());

        state.publish(heading_report(1, 12.0, t0 + Duration::from_millis(100)));
        let samples = source.read().unwrap();
        assert_eq!(samples.len(), 1);
        assert_relative_eq!(samples[0].degrees(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_report_source_ready_observes_cancel() {
        let mut source = ReportRateSource::new(Arc::new(OrientationState::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!source.wait_ready(&cancel).unwrap());
    }

    #[test]
    fn test_gyro_source_scales_and_inverts() {
        let i2c = MockI2c::new();
        let gyro = Mpu6050::new(i2c.clone(), MPU6050_ADDR, 2);
        let mut source = Mpu6050RateSource::new(gyro, 4, true).unwrap();

        i2c.set_register(MPU6050_ADDR, REG_FIFO_COUNT, &[0x00, 0x04]);
        i2c.set_register(MPU6050_ADDR, REG_FIFO_RW, &[0x00, 0x64, 0xFF, 0x9C]);

        let samples = source.read().unwrap();
        assert_eq!(samples.len(), 2);
        let scale = 1000.0 / 32767.0;
        assert_relative_eq!(samples[0].degrees_per_sec, -100.0 * scale);
        assert_relative_eq!(samples[1].degrees_per_sec, 100.0 * scale);
        assert_relative_eq!(samples[0].dt, 0.01);
    }

    #[test]
    fn test_gyro_source_propagates_bus_errors() {
        let i2c = MockI2c::new();
        i2c.fail_next(1);
        let gyro = Mpu6050::new(i2c, MPU6050_ADDR, 2);
        assert!(matches!(
            Mpu6050RateSource::new(gyro, 4, false),
            Err(MotionError::Hardware(HardwareError::I2c { .. }))
        ));
    }
}
