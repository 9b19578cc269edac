//! Absolute heading hold.
//!
//! Holds the robot on a heading relative to where it pointed when the mode
//! started. The loop is paced by orientation reports: every fresh report
//! publishes the heading estimate, wakes [`AbsoluteController::wait`]ers
//! and produces one motor setpoint.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hardware::bus::MotorSetpoint;
use hardware::imu::OrientationState;
use hardware::CancelToken;
use tracing::{debug, error, info};

use super::{wait_for_first_report, wait_for_report, ControlTask};
use crate::angle::Angle;
use crate::config::AbsoluteConfig;
use crate::convergence::ConvergenceDetector;
use crate::error::{MotionResult, WaitError};
use crate::mixing;
use crate::pid::HeadingPid;
use crate::sink::MotorSink;
use crate::slew::SlewLimiter;

const LOG_INTERVAL: Duration = Duration::from_millis(300);
/// Longest `wait` sleeps before re-checking its cancel token
const WAIT_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
struct Controls {
    target: Angle,
    current: Angle,
    throttle: f64,
    translation: f64,
    /// Incremented once per control tick
    ticks: u64,
    running: bool,
}

#[derive(Debug)]
struct Shared {
    controls: Mutex<Controls>,
    ticked: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Controls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running absolute heading hold
///
/// Headings are in degrees relative to the robot's heading when the hold
/// started. Throttle and translation are fractions of full wheel speed.
#[derive(Debug)]
pub struct AbsoluteController {
    shared: Arc<Shared>,
    converge_threshold: f64,
    converge_ticks: u32,
}

impl AbsoluteController {
    /// Start the control thread.
    pub(crate) fn spawn(
        sink: Arc<dyn MotorSink>,
        orientation: Arc<OrientationState>,
        config: &AbsoluteConfig,
        full_scale: f64,
    ) -> MotionResult<(Arc<Self>, ControlTask)> {
        let shared = Arc::new(Shared {
            controls: Mutex::new(Controls {
                target: Angle::ZERO,
                current: Angle::ZERO,
                throttle: 0.0,
                translation: 0.0,
                ticks: 0,
                running: true,
            }),
            ticked: Condvar::new(),
        });
        let controller = Arc::new(Self {
            shared: shared.clone(),
            converge_threshold: config.converge_threshold_deg,
            converge_ticks: config.converge_ticks,
        });

        let cancel = CancelToken::new();
        let control_loop = AbsoluteLoop {
            shared,
            sink,
            orientation,
            cancel: cancel.clone(),
            law: AbsoluteLaw::new(config, full_scale),
        };
        let task = ControlTask::spawn("heading-absolute", cancel, move || control_loop.run())?;
        Ok((controller, task))
    }

    pub fn set_heading(&self, heading: Angle) {
        self.shared.lock().target = heading;
    }

    pub fn add_heading_delta(&self, degrees: f64) {
        let mut controls = self.shared.lock();
        controls.target = controls.target.add_float(degrees);
    }

    /// Drive straight ahead at `throttle`.
    pub fn set_throttle(&self, throttle: f64) {
        self.set_throttle_with_angle(throttle, 0.0);
    }

    /// Drive at `throttle` in a direction `degrees` clockwise of the robot's
    /// nose, without turning.
    pub fn set_throttle_with_angle(&self, throttle: f64, degrees: f64) {
        let radians = degrees.to_radians();
        let mut controls = self.shared.lock();
        controls.throttle = throttle * radians.cos();
        controls.translation = throttle * radians.sin();
    }

    pub fn current_heading(&self) -> Angle {
        self.shared.lock().current
    }

    pub fn target_heading(&self) -> Angle {
        self.shared.lock().target
    }

    /// False once the control thread has exited, after a stall or a mode
    /// change.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Block until the heading has settled on the target.
    ///
    /// Samples the heading error once per control tick. Returns the residual
    /// error in degrees once settled.
    pub fn wait(&self, cancel: &CancelToken) -> Result<f64, WaitError> {
        let mut detector = ConvergenceDetector::new(self.converge_threshold, self.converge_ticks);
        let mut controls = self.shared.lock();
        let mut seen = controls.ticks;
        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            if !controls.running {
                return Err(WaitError::ControllerStopped);
            }
            if controls.ticks == seen {
                controls = self
                    .shared
                    .ticked
                    .wait_timeout(controls, WAIT_SLICE)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            seen = controls.ticks;

            let error = controls.target.sub(controls.current).to_float();
            debug!("Wait: heading error {error:.2}");
            if let Some(residual) = detector.observe(error) {
                return Ok(residual);
            }
        }
    }
}

/// Per-tick control law, separated from the thread for testing
#[derive(Debug, Clone)]
struct AbsoluteLaw {
    pid: HeadingPid,
    throttle: SlewLimiter,
    translation: SlewLimiter,
    full_scale: f64,
}

impl AbsoluteLaw {
    fn new(config: &AbsoluteConfig, full_scale: f64) -> Self {
        Self {
            pid: HeadingPid::new(config.gains),
            throttle: SlewLimiter::new(config.max_throttle_delta_per_sec),
            translation: SlewLimiter::new(config.max_throttle_delta_per_sec),
            full_scale,
        }
    }

    fn step(&mut self, controls: &Controls, estimate: Angle, dt: f64) -> MotorSetpoint {
        let error = controls.target.sub(estimate).to_float();
        let rotation = self.pid.update(error, dt);
        let throttle = self.throttle.update(controls.throttle, dt);
        let translation = self.translation.update(controls.translation, dt);
        mixing::to_setpoint(throttle, rotation, translation, self.full_scale)
    }
}

struct AbsoluteLoop {
    shared: Arc<Shared>,
    sink: Arc<dyn MotorSink>,
    orientation: Arc<OrientationState>,
    cancel: CancelToken,
    law: AbsoluteLaw,
}

impl AbsoluteLoop {
    fn run(mut self) {
        info!("Absolute heading hold started");
        match self.control() {
            Ok(()) => info!("Absolute heading hold stopped"),
            Err(e) => error!("Absolute heading hold aborted: {e}"),
        }
        self.sink.set_motor_setpoint(MotorSetpoint::ZERO);

        self.shared.lock().running = false;
        self.shared.ticked.notify_all();
    }

    fn control(&mut self) -> MotionResult<()> {
        let Some(first) = wait_for_first_report(&self.orientation, &self.cancel) else {
            return Ok(());
        };
        let initial = Angle::from_float(first.robot_yaw());
        info!("Initial heading {initial}");

        let mut last_capture = first.capture_time;
        let mut last_tick = Instant::now();
        let mut last_log = Instant::now();

        loop {
            let Some(report) = wait_for_report(&self.orientation, Some(last_capture), &self.cancel)?
            else {
                return Ok(());
            };
            last_capture = report.capture_time;

            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;

            let estimate = Angle::from_float(report.robot_yaw()).sub(initial);
            let controls = {
                let mut controls = self.shared.lock();
                controls.current = estimate;
                controls.ticks += 1;
                *controls
            };
            self.shared.ticked.notify_all();

            let setpoint = self.law.step(&controls, estimate, dt);

            if last_log.elapsed() >= LOG_INTERVAL {
                let terms = self.law.pid.last_terms();
                debug!(
                    "HH: {:.1}ms heading {estimate} target {} error {:.1} int {:.3} d {:.1} -> {:.3}",
                    dt * 1000.0,
                    controls.target,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls(target: f64, throttle: f64, translation: f64) -> Controls {
        Controls {
            target: Angle::from_float(target),
            current: Angle::ZERO,
            throttle,
            translation,
            ticks: 0,
            running: true,
        }
    }

    fn rotation_of(setpoint: MotorSetpoint) -> i32 {
        // Rotation drives all four wheels the same way, throttle and
        // translation cancel out in the sum
        -setpoint.as_array().iter().map(|&v| v as i32).sum::<i32>() / 4
    }

    #[test]
    fn test_turns_towards_target() {
        let mut law = AbsoluteLaw::new(&AbsoluteConfig::default(), 10240.0);
        let setpoint = law.step(&controls(90.0, 0.0, 0.0), Angle::ZERO, 0.01);
        assert!(rotation_of(setpoint) > 0);

        let mut law = AbsoluteLaw::new(&AbsoluteConfig::default(), 10240.0);
        let setpoint = law.step(&controls(-90.0, 0.0, 0.0), Angle::ZERO, 0.01);
        assert!(rotation_of(setpoint) < 0);
    }

    #[test]
    fn test_turns_short_way_across_seam() {
        let mut law = AbsoluteLaw::new(&AbsoluteConfig::default(), 10240.0);
        // 170 to -170 is 20 degrees positive
        let setpoint = law.step(&controls(-170.0, 0.0, 0.0), Angle::from_float(170.0), 0.01);
        assert!(rotation_of(setpoint) > 0);
    }

    #[test]
    fn test_rotation_capped() {
        let config = AbsoluteConfig::default();
        let mut law = AbsoluteLaw::new(&config, 10240.0);
        for _ in 0..100 {
            let setpoint = law.step(&controls(180.0, 0.0, 0.0), Angle::ZERO, 0.01);
            let cap = (config.gains.max_output * 10240.0) as i32;
            assert!(rotation_of(setpoint) <= cap);
        }
    }

    #[test]
    fn test_throttle_slews() {
        let mut law = AbsoluteLaw::new(&AbsoluteConfig::default(), 10240.0);
        let setpoint = law.step(&controls(0.0, 1.0, 0.0), Angle::ZERO, 0.1);
        assert_eq!(setpoint, MotorSetpoint::new(1024, -1024, 1024, -1024));
    }

    #[test]
    fn test_throttle_with_angle_splits_components() {
        let (controller, _) = spawn_idle();
        controller.set_throttle_with_angle(0.5, 90.0);
        let controls = *controller.shared.lock();
        assert!(controls.throttle.abs() < 1e-12);
        assert!((controls.translation - 0.5).abs() < 1e-12);

        controller.set_throttle(0.5);
        let controls = *controller.shared.lock();
        assert_eq!(controls.throttle, 0.5);
        assert_eq!(controls.translation, 0.0);
    }

    #[test]
    fn test_heading_delta_wraps() {
        let (controller, _) = spawn_idle();
        controller.set_heading(Angle::from_float(170.0));
        controller.add_heading_delta(20.0);
        assert_eq!(controller.target_heading(), Angle::from_float(-170.0));
    }

    #[test]
    fn test_wait_cancelled() {
        let (controller, _task) = spawn_idle();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(controller.wait(&cancel), Err(WaitError::Cancelled));
    }

    #[test]
    fn test_wait_sees_stopped_controller() {
        let (controller, mut task) = spawn_idle();
        task.stop();
        assert!(!controller.is_running());
        assert_eq!(
            controller.wait(&CancelToken::new()),
            Err(WaitError::ControllerStopped)
        );
    }

    struct NullSink;

    impl MotorSink for NullSink {
        fn set_motor_setpoint(&self, _setpoint: MotorSetpoint) {}

        fn set_servo(&self, _port: usize, _value: f64) -> hardware::HardwareResult<()> {
            Ok(())
        }

        fn set_pwm(&self, _port: usize, _value: f64) -> hardware::HardwareResult<()> {
            Ok(())
        }
    }

    /// Controller with no orientation reports, so the loop idles
    fn spawn_idle() -> (Arc<AbsoluteController>, ControlTask) {
        AbsoluteController::spawn(
            Arc::new(NullSink),
            Arc::new(OrientationState::new()),
            &AbsoluteConfig::default(),
            10240.0,
        )
        .unwrap()
    }
}
