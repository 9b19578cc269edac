//! Motor-control mode lifecycle.
//!
//! The coordinator decides which controller, if any, owns motor output.
//! Every mode change first tears down the current mode: cancel its task,
//! wait for the thread to exit, then command zero motors. Only then does the
//! next mode start, so two writers never race on the motors.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hardware::bus::{
    BusController, FaultFlags, LinuxBackend, LogTelemetry, MotorSetpoint, PowerReading,
};
use hardware::imu::{ImuReader, OrientationState};
use tracing::info;

use crate::config::RobotConfig;
use crate::controllers::{
    rate_source_factory, AbsoluteController, ControlTask, RateSourceFactory, RelativeController,
};
use crate::error::{MotionError, MotionResult};
use crate::sink::MotorSink;

/// Which controller currently owns the motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    None,
    RawControl,
    HeadingAbsolute,
    HeadingRelative,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlMode::None => "none",
            ControlMode::RawControl => "raw",
            ControlMode::HeadingAbsolute => "heading-absolute",
            ControlMode::HeadingRelative => "heading-relative",
        };
        f.write_str(name)
    }
}

/// Direct motor access for callers that run their own control
///
/// The handle stops working as soon as the coordinator leaves raw mode.
pub struct RawControl {
    sink: Arc<dyn MotorSink>,
    active: Mutex<bool>,
}

impl RawControl {
    fn new(sink: Arc<dyn MotorSink>) -> Self {
        Self {
            sink,
            active: Mutex::new(true),
        }
    }

    pub fn set_motor_setpoint(&self, setpoint: MotorSetpoint) -> MotionResult<()> {
        let active = self.lock();
        if !*active {
            return Err(MotionError::ModeInactive);
        }
        self.sink.set_motor_setpoint(setpoint);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        *self.lock()
    }

    /// Once this returns no further writes get through.
    fn revoke(&self) {
        *self.lock() = false;
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum ActiveMode {
    None,
    Raw(Arc<RawControl>),
    Absolute(Arc<AbsoluteController>, ControlTask),
    Relative(Arc<RelativeController>, ControlTask),
}

impl ActiveMode {
    fn mode(&self) -> ControlMode {
        match self {
            ActiveMode::None => ControlMode::None,
            ActiveMode::Raw(_) => ControlMode::RawControl,
            ActiveMode::Absolute(..) => ControlMode::HeadingAbsolute,
            ActiveMode::Relative(..) => ControlMode::HeadingRelative,
        }
    }
}

/// Owns the motor sink and the orientation state, and arbitrates motor
/// ownership between the control modes
pub struct Coordinator<S: MotorSink + 'static> {
    sink: Arc<S>,
    orientation: Arc<OrientationState>,
    config: RobotConfig,
    rate_sources: RateSourceFactory,
    active: Mutex<ActiveMode>,
    imu: Option<ImuReader>,
}

impl<S: MotorSink + 'static> Coordinator<S> {
    /// Coordinate `sink`, reading orientation from `orientation`.
    ///
    /// Relative holds take their yaw rate from the source configured in
    /// `config.rate_source`.
    pub fn new(sink: Arc<S>, orientation: Arc<OrientationState>, config: RobotConfig) -> Self {
        let rate_sources = rate_source_factory(config.rate_source.clone(), orientation.clone());
        Self {
            sink,
            orientation,
            config,
            rate_sources,
            active: Mutex::new(ActiveMode::None),
            imu: None,
        }
    }

    /// Replace the yaw-rate source used by relative holds.
    pub fn with_rate_sources(mut self, factory: RateSourceFactory) -> Self {
        self.rate_sources = factory;
        self
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn orientation(&self) -> &Arc<OrientationState> {
        &self.orientation
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// The mode last started. A heading hold that aborted on its own (for
    /// example after an IMU stall) still reports its mode until the next
    /// transition; check the controller's `is_running`.
    pub fn mode(&self) -> ControlMode {
        self.lock().mode()
    }

    /// Hand motor output straight to the caller.
    pub fn start_raw_control(&self) -> Arc<RawControl> {
        let mut active = self.lock();
        self.teardown(&mut active);

        let raw = Arc::new(RawControl::new(self.dyn_sink()));
        *active = ActiveMode::Raw(raw.clone());
        info!("Motor control mode: {}", ControlMode::RawControl);
        raw
    }

    /// Start holding the heading the robot points at now.
    pub fn start_heading_hold_absolute(&self) -> MotionResult<Arc<AbsoluteController>> {
        let mut active = self.lock();
        self.teardown(&mut active);

        let (controller, task) = AbsoluteController::spawn(
            self.dyn_sink(),
            self.orientation.clone(),
            &self.config.absolute,
            self.config.chassis.motor_full_scale(),
        )?;
        *active = ActiveMode::Absolute(controller.clone(), task);
        info!("Motor control mode: {}", ControlMode::HeadingAbsolute);
        Ok(controller)
    }

    /// Start yaw-rate and throttle control.
    pub fn start_heading_hold_relative(&self) -> MotionResult<Arc<RelativeController>> {
        let mut active = self.lock();
        self.teardown(&mut active);

        let rate_source = (self.rate_sources)()?;
        let (controller, task) = RelativeController::spawn(
            self.dyn_sink(),
            rate_source,
            &self.config.relative,
            &self.config.chassis,
        )?;
        *active = ActiveMode::Relative(controller.clone(), task);
        info!("Motor control mode: {}", ControlMode::HeadingRelative);
        Ok(controller)
    }

    /// Stop whichever mode is active and leave the motors at zero.
    pub fn stop_motor_control(&self) {
        let mut active = self.lock();
        self.teardown(&mut active);
    }

    /// Heading of the active hold in degrees, 0 when none is running
    pub fn current_heading(&self) -> f64 {
        match &*self.lock() {
            ActiveMode::Absolute(controller, _) => controller.current_heading().to_float(),
            ActiveMode::Relative(controller, _) => controller.current_heading(),
            ActiveMode::None | ActiveMode::Raw(_) => 0.0,
        }
    }

    pub fn set_servo(&self, port: usize, value: f64) -> MotionResult<()> {
        Ok(self.sink.set_servo(port, value)?)
    }

    pub fn set_pwm(&self, port: usize, value: f64) -> MotionResult<()> {
        Ok(self.sink.set_pwm(port, value)?)
    }

    /// Stop motor control and the orientation reader.
    ///
    /// The sink is released here; a bus loop stops once no other clone of
    /// it remains.
    pub fn shutdown(mut self) {
        info!("Coordinator shutting down");
        self.stop_motor_control();
        if let Some(imu) = self.imu.take() {
            imu.shutdown();
        }
    }

    fn teardown(&self, active: &mut ActiveMode) {
        let previous = std::mem::replace(active, ActiveMode::None);
        let mode = previous.mode();
        match previous {
            ActiveMode::None => {}
            ActiveMode::Raw(raw) => raw.revoke(),
            ActiveMode::Absolute(_, mut task) | ActiveMode::Relative(_, mut task) => task.stop(),
        }
        if mode != ControlMode::None {
            info!("Stopped motor control mode {mode}");
        }
        self.sink.set_motor_setpoint(MotorSetpoint::ZERO);
    }

    fn dyn_sink(&self) -> Arc<dyn MotorSink> {
        self.sink.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ActiveMode> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Coordinator<BusController> {
    /// Bring up the robot: bus loop on the configured I2C bus and the
    /// orientation reader on its serial port.
    ///
    /// Returns once the bus loop's first session has initialised or failed.
    pub fn start(config: RobotConfig) -> Self {
        info!("Starting bus loop on {}", config.bus.i2c_path);
        let bus = BusController::start(
            LinuxBackend::new(config.bus.clone()),
            config.bus.clone(),
            Arc::new(LogTelemetry),
        );

        let orientation = Arc::new(OrientationState::new());
        let imu = ImuReader::spawn_serial(config.imu.clone(), orientation.clone());

        let mut coordinator = Self::new(Arc::new(bus), orientation, config);
        coordinator.imu = Some(imu);
        coordinator
    }

    pub fn current_power_readings(&self) -> Vec<PowerReading> {
        self.sink.current_power_readings()
    }

    pub fn faults(&self) -> FaultFlags {
        self.sink.faults()
    }

    /// Wheel rotations since the last zero, FL, FR, BL, BR
    pub fn current_wheel_rotations(&self) -> [f64; 4] {
        self.sink.wheel_rotations()
    }

    pub fn current_wheel_distances_mm(&self) -> [f64; 4] {
        let chassis = &self.config.chassis;
        self.current_wheel_rotations()
            .map(|rotations| chassis.rotations_to_mm(rotations))
    }

    pub fn zero_wheel_rotations(&self) {
        self.sink.zero_wheel_rotations()
    }
}
