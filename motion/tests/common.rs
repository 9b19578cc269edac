//! Common utilities for motion tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bno08x::mock::build_frame;
use hardware::bus::{validate_servo, MotorSetpoint};
use hardware::imu::{OrientationReport, OrientationState};
use hardware::{CancelToken, HardwareResult};
use motion::config::ChassisConfig;
use motion::controllers::{RateSample, RateSource};
use motion::{Angle, MotionResult, MotorSink};

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Report from a sensor rolled -90 degrees, where robot heading is the
/// negated sensor yaw
pub fn heading_report(index: u8, heading: f64, capture_time: Instant) -> OrientationReport {
    let yaw = (-heading * 100.0).round() as i16;
    OrientationReport::from_frame(&build_frame(index, yaw, 0, -9000, [0, 0, 981]), capture_time)
}

/// Share of full scale the setpoint spends on rotation
pub fn rotation_of(setpoint: MotorSetpoint, full_scale: f64) -> f64 {
    let sum: f64 = setpoint.as_array().iter().map(|&v| v as f64).sum();
    -sum / 4.0 / full_scale
}

/// Motor sink that keeps every setpoint it is given
#[derive(Default)]
pub struct RecordingMotors {
    writes: Mutex<Vec<(Instant, MotorSetpoint)>>,
    servos: Mutex<Vec<(usize, f64)>>,
}

impl RecordingMotors {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<(Instant, MotorSetpoint)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<MotorSetpoint> {
        self.writes.lock().unwrap().last().map(|(_, s)| *s)
    }

    pub fn servos(&self) -> Vec<(usize, f64)> {
        self.servos.lock().unwrap().clone()
    }
}

impl MotorSink for RecordingMotors {
    fn set_motor_setpoint(&self, setpoint: MotorSetpoint) {
        self.writes.lock().unwrap().push((Instant::now(), setpoint));
    }

    fn set_servo(&self, port: usize, value: f64) -> HardwareResult<()> {
        validate_servo(port, value)?;
        self.servos.lock().unwrap().push((port, value));
        Ok(())
    }

    fn set_pwm(&self, port: usize, value: f64) -> HardwareResult<()> {
        self.set_servo(port, value)
    }
}

/// Robot that turns according to the last motor setpoint and publishes an
/// orientation report every 10 ms
pub struct SimulatedRobot {
    heading: Arc<Mutex<Angle>>,
    paused: Arc<AtomicBool>,
    cancel: CancelToken,
    join_handle: Option<JoinHandle<()>>,
}

impl SimulatedRobot {
    /// `dps_per_unit` is the turn rate at full-scale rotation.
    pub fn start(
        motors: Arc<RecordingMotors>,
        orientation: Arc<OrientationState>,
        full_scale: f64,
        dps_per_unit: f64,
    ) -> Self {
        let heading = Arc::new(Mutex::new(Angle::ZERO));
        let paused = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();

        let join_handle = {
            let heading = heading.clone();
            let paused = paused.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let mut index = 0u8;
                let mut last = Instant::now();
                while !cancel.wait_timeout(Duration::from_millis(10)) {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f64();
                    last = now;

                    let rotation = motors.last().map_or(0.0, |s| rotation_of(s, full_scale));
                    let current = {
                        let mut heading = heading.lock().unwrap();
                        *heading = heading.add_float(rotation * dps_per_unit * dt);
                        *heading
                    };
                    if !paused.load(Ordering::SeqCst) {
                        orientation.publish(heading_report(index, current.to_float(), now));
                        index = index.wrapping_add(1);
                    }
                }
            })
        };

        Self {
            heading,
            paused,
            cancel,
            join_handle: Some(join_handle),
        }
    }

    pub fn heading(&self) -> Angle {
        *self.heading.lock().unwrap()
    }

    /// Stop publishing reports, as if the sensor went quiet.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Drop for SimulatedRobot {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Yaw-rate source that reads the rotation the robot is being driven at
pub struct MotorRateSource {
    motors: Arc<RecordingMotors>,
    full_scale: f64,
    dps_per_unit: f64,
    last: Instant,
}

impl MotorRateSource {
    pub fn new(motors: Arc<RecordingMotors>, chassis: &ChassisConfig) -> Self {
        Self {
            motors,
            full_scale: chassis.motor_full_scale(),
            dps_per_unit: chassis.max_wheel_speed_mm_per_s() * 360.0 / chassis.turning_circle_mm(),
            last: Instant::now(),
        }
    }
}

impl RateSource for MotorRateSource {
    fn read(&mut self) -> MotionResult<Vec<RateSample>> {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        let rotation = self
            .motors
            .last()
            .map_or(0.0, |s| rotation_of(s, self.full_scale));
        Ok(vec![RateSample {
            degrees_per_sec: rotation * self.dps_per_unit,
            dt,
        }])
    }
}
