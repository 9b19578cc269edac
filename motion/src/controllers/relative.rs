//! Relative (yaw rate) heading hold.
//!
//! The caller commands a yaw rate rather than a heading. Each tick the loop
//! integrates that rate into a target heading and holds the robot on it, so
//! a zero yaw command keeps the robot straight even when the wheels slip.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hardware::bus::MotorSetpoint;
use hardware::CancelToken;
use tracing::{debug, error, info};

use super::rate::RateSource;
use super::ControlTask;
use crate::angle::Angle;
use crate::config::{ChassisConfig, RelativeConfig};
use crate::error::MotionResult;
use crate::mixing;
use crate::pid::HeadingPid;
use crate::sink::MotorSink;
use crate::slew::SlewLimiter;

const LOG_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, Default)]
struct Controls {
    yaw_rate_dps: f64,
    throttle: f64,
    translation: f64,
    current: Angle,
    running: bool,
}

/// Handle to a running relative heading hold
#[derive(Debug)]
pub struct RelativeController {
    controls: Arc<Mutex<Controls>>,
    max_yaw_rate_dps: f64,
}

impl RelativeController {
    pub(crate) fn spawn(
        sink: Arc<dyn MotorSink>,
        rate_source: Box<dyn RateSource>,
        config: &RelativeConfig,
        chassis: &ChassisConfig,
    ) -> MotionResult<(Arc<Self>, ControlTask)> {
        let controls = Arc::new(Mutex::new(Controls {
            running: true,
            ..Controls::default()
        }));
        let controller = Arc::new(Self {
            controls: controls.clone(),
            max_yaw_rate_dps: config.max_yaw_rate_dps,
        });

        let cancel = CancelToken::new();
        let control_loop = RelativeLoop {
            controls,
            sink,
            rate_source,
            cancel: cancel.clone(),
            tick: config.tick(),
            law: RelativeLaw::new(config, chassis),
        };
        let task = ControlTask::spawn("heading-relative", cancel, move || control_loop.run())?;
        Ok((controller, task))
    }

    /// Set the yaw and throttle inputs, each in [-1, 1]. Translation stops.
    pub fn set_yaw_and_throttle(&self, yaw: f64, throttle: f64) {
        self.set_yaw_throttle_and_translation(yaw, throttle, 0.0);
    }

    /// Set all three inputs, each in [-1, 1] and clamped to it.
    ///
    /// Yaw 1.0 turns at the configured maximum yaw rate. Throttle and
    /// translation are fractions of full wheel speed.
    pub fn set_yaw_throttle_and_translation(&self, yaw: f64, throttle: f64, translation: f64) {
        let mut controls = self.lock();
        controls.yaw_rate_dps = yaw.clamp(-1.0, 1.0) * self.max_yaw_rate_dps;
        controls.throttle = throttle.clamp(-1.0, 1.0);
        controls.translation = translation.clamp(-1.0, 1.0);
    }

    /// Integrated heading estimate in degrees since the hold started
    pub fn current_heading(&self) -> f64 {
        self.lock().current.to_float()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> MutexGuard<'_, Controls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-tick control law, separated from the thread for testing
#[derive(Debug, Clone)]
struct RelativeLaw {
    config: RelativeConfig,
    chassis: ChassisConfig,
    pid: HeadingPid,
    throttle: SlewLimiter,
    translation: SlewLimiter,
    target: Angle,
    estimate: Angle,
}

impl RelativeLaw {
    fn new(config: &RelativeConfig, chassis: &ChassisConfig) -> Self {
        Self {
            config: config.clone(),
            chassis: chassis.clone(),
            pid: HeadingPid::new(config.gains).with_integral_window(config.integral_window_deg),
            throttle: SlewLimiter::new(config.max_throttle_delta_per_sec)
                .with_snap_below(config.throttle_snap),
            translation: SlewLimiter::new(config.max_throttle_delta_per_sec),
            target: Angle::ZERO,
            estimate: Angle::ZERO,
        }
    }

    /// Fold measured heading change into the estimate.
    fn integrate(&mut self, degrees: f64) {
        self.estimate = self.estimate.add_float(degrees);
    }

    fn step(&mut self, controls: &Controls, dt: f64) -> MotorSetpoint {
        let max_lead = self.config.max_lead_deg;
        self.target = self.target.add_float(controls.yaw_rate_dps * dt);
        let lead = self.target.sub(self.estimate).to_float();
        if lead > max_lead {
            self.target = self.estimate.add_float(max_lead);
        } else if lead < -max_lead {
            self.target = self.estimate.sub_float(max_lead);
        }

        let error = self.target.sub(self.estimate).to_float();
        let mut yaw_rate = self.pid.update(error, dt);
        if controls.yaw_rate_dps.abs() > self.config.yaw_override_dps {
            yaw_rate = controls.yaw_rate_dps;
        }
        let max_rate = self.config.gains.max_output;
        let yaw_rate = yaw_rate.clamp(-max_rate, max_rate);

        let rotation = self.chassis.wheel_speed_for_yaw_rate(yaw_rate)
            / self.chassis.max_wheel_speed_mm_per_s();
        let throttle = self.throttle.update(controls.throttle, dt);
        let translation = self
            .translation
            .update(controls.translation * self.config.mecanum_factor, dt);

        mixing::to_setpoint(
            throttle,
            rotation,
            translation,
            self.chassis.motor_full_scale(),
        )
    }
}

struct RelativeLoop {
    controls: Arc<Mutex<Controls>>,
    sink: Arc<dyn MotorSink>,
    rate_source: Box<dyn RateSource>,
    cancel: CancelToken,
    tick: Duration,
    law: RelativeLaw,
}

impl RelativeLoop {
    fn run(mut self) {
        info!("Relative heading hold started");
        match self.control() {
            Ok(()) => info!("Relative heading hold stopped"),
            Err(e) => error!("Relative heading hold aborted: {e}"),
        }
        self.sink.set_motor_setpoint(MotorSetpoint::ZERO);
        self.lock().running = false;
    }

    fn control(&mut self) -> MotionResult<()> {
        if !self.rate_source.wait_ready(&self.cancel)? {
            return Ok(());
        }

        let mut last_tick = Instant::now();
        let mut next_tick = last_tick + self.tick;
        let mut last_log = Instant::now();

        loop {
            if self.cancel.wait_until(next_tick) {
                return Ok(());
            }
            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;
            next_tick += self.tick;
            if next_tick < now {
                next_tick = now + self.tick;
            }

            for sample in self.rate_source.read()? {
                self.law.integrate(sample.degrees());
            }
            let controls = {
                let mut controls = self.lock();
                controls.current = self.law.estimate;
                *controls
            };

            let setpoint = self.law.step(&controls, dt);

            if last_log.elapsed() >= LOG_INTERVAL {
                let terms = self.law.pid.last_terms();
                debug!(
                    "HH: {:.1}ms heading {} target {} error {:.1} int {:.2} d {:.1} -> {:.1} deg/s",
                    dt * 1000.0,
                    self.law.estimate,
                    self.law.target,
                    terms.error,
                    terms.integral,
                    terms.derivative,
                    terms.output
                );
                last_log = Instant::now();
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.sink.set_motor_setpoint(setpoint);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Controls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn law() -> RelativeLaw {
        RelativeLaw::new(&RelativeConfig::default(), &ChassisConfig::default())
    }

    fn controls(yaw_rate_dps: f64, throttle: f64, translation: f64) -> Controls {
        Controls {
            yaw_rate_dps,
            throttle,
            translation,
            ..Controls::default()
        }
    }

    fn rotation_of(setpoint: MotorSetpoint) -> i32 {
        -setpoint.as_array().iter().map(|&v| v as i32).sum::<i32>() / 4
    }

    #[test]
    fn test_holds_straight_with_no_input() {
        let mut law = law();
        for _ in 0..50 {
            assert_eq!(law.step(&controls(0.0, 0.0, 0.0), 0.02), MotorSetpoint::ZERO);
        }
    }

    #[test]
    fn test_corrects_drift() {
        let mut law = law();
        law.integrate(-3.0);
        let setpoint = law.step(&controls(0.0, 0.0, 0.0), 0.02);
        assert!(rotation_of(setpoint) > 0);
    }

    #[test]
    fn test_target_lead_is_capped() {
        let mut law = law();
        // Robot not turning at all while 20 deg/s is commanded for 5 s
        for _ in 0..250 {
            law.step(&controls(20.0, 0.0, 0.0), 0.02);
        }
        assert!((law.target.sub(law.estimate).to_float() - 20.0).abs() < 1e-9);

        for _ in 0..250 {
            law.step(&controls(-20.0, 0.0, 0.0), 0.02);
        }
        assert!((law.target.sub(law.estimate).to_float() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_fast_yaw_overrides_pid() {
        let chassis = ChassisConfig::default();
        let mut law = law();
        let setpoint = law.step(&controls(250.0, 0.0, 0.0), 0.02);
        let expected = chassis.wheel_speed_for_yaw_rate(250.0) / chassis.max_wheel_speed_mm_per_s()
            * chassis.motor_full_scale();
        assert!((rotation_of(setpoint) as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_small_throttle_applies_immediately() {
        let mut law = law();
        let setpoint = law.step(&controls(0.0, 0.25, 0.0), 0.02);
        assert_eq!(setpoint, MotorSetpoint::new(2560, -2560, 2560, -2560));
    }

    #[test]
    fn test_large_throttle_slews() {
        let mut law = law();
        let first = law.step(&controls(0.0, 1.0, 0.0), 0.02);
        assert!(first.front_left > 0 && first.front_left <= 410);
        for _ in 0..50 {
            law.step(&controls(0.0, 1.0, 0.0), 0.02);
        }
        assert_eq!(law.throttle.current(), 1.0);
    }

    #[test]
    fn test_translation_scaled_for_rollers() {
        let mut law = law();
        for _ in 0..50 {
            law.step(&controls(0.0, 0.0, 0.5), 0.02);
        }
        assert!((law.translation.current() - 0.5 * 1.044).abs() < 1e-12);
    }

    #[test]
    fn test_inputs_clamped() {
        let controller = RelativeController {
            controls: Arc::new(Mutex::new(Controls::default())),
            max_yaw_rate_dps: 500.0,
        };
        controller.set_yaw_and_throttle(2.0, -3.0);
        let controls = *controller.lock();
        assert_eq!(controls.yaw_rate_dps, 500.0);
        assert_eq!(controls.throttle, -1.0);
        assert_eq!(controls.translation, 0.0);
    }
}
