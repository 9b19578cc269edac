//! The bus I/O loop.
//!
//! One thread owns every device on the actuator bus. Other threads only
//! touch the desired-state snapshot behind [`BusController`]'s lock; the loop
//! picks changes up on its next tick. Each tick, in order:
//!
//! 1. write the motor setpoint if it changed or the watchdog is close to
//!    expiring, then pet the watchdog
//! 2. write dirty servo/PWM ports
//! 3. poll wheel travel, and power monitors at most once per poll interval
//!
//! A failed bus write ends the session. The loop drops every device handle,
//! waits out the backoff and starts again from device initialisation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, info, warn};

use super::config::BusConfig;
use super::driver::{BusBackend, MotorDriver, NullServo, PowerMonitor, ServoDriver};
use super::setpoint::{MotorSetpoint, ServoTable, ServoValue};
use super::telemetry::{FaultFlags, PowerReading, TelemetrySink};
use crate::cancel::CancelToken;
use crate::errors::{HardwareError, HardwareResult};
use crate::i2c::DistanceTracker;

/// State shared between callers and the loop, all behind one lock
#[derive(Debug, Default)]
struct SharedState {
    motors: MotorSetpoint,
    servos: ServoTable,
    power_readings: Vec<PowerReading>,
    faults: FaultFlags,
    wheel_rotations: [f64; 4],
    zero_wheel_rotations: bool,
    sessions: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SharedState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the bus loop thread
///
/// All methods are safe to call from any thread. Dropping the handle stops
/// the loop, which zeroes the motors on its way out.
pub struct BusController {
    shared: Arc<Shared>,
    cancel: CancelToken,
    join_handle: Option<JoinHandle<()>>,
}

impl BusController {
    /// Spawn the bus loop and block until its first session has finished
    /// initialising (successfully or not).
    pub fn start<B>(backend: B, config: BusConfig, telemetry: Arc<dyn TelemetrySink>) -> Self
    where
        B: BusBackend + 'static,
    {
        let shared = Arc::new(Shared::default());
        let cancel = CancelToken::new();
        let (init_tx, init_rx) = bounded(1);

        let bus_loop = BusLoop {
            backend,
            config,
            shared: shared.clone(),
            telemetry,
            cancel: cancel.clone(),
            tracker: DistanceTracker::new(),
        };
        let join_handle = thread::Builder::new()
            .name("bus-loop".to_string())
            .spawn(move || bus_loop.run(init_tx))
            .ok();

        if join_handle.is_some() {
            // Disconnect also counts: the loop has exited.
            let _ = init_rx.recv();
        } else {
            warn!("Failed to spawn bus loop thread");
        }

        Self {
            shared,
            cancel,
            join_handle,
        }
    }

    pub fn set_motor_setpoint(&self, setpoint: MotorSetpoint) {
        self.shared.lock().motors = setpoint;
    }

    pub fn motor_setpoint(&self) -> MotorSetpoint {
        self.shared.lock().motors
    }

    /// Queue a servo position (0.0-1.0) for `port` (0-15).
    pub fn set_servo(&self, port: usize, value: f64) -> HardwareResult<()> {
        self.shared.lock().servos.set(port, ServoValue::Position(value))
    }

    /// Queue a raw duty cycle (0.0-1.0) for `port` (0-15).
    pub fn set_pwm(&self, port: usize, value: f64) -> HardwareResult<()> {
        self.shared.lock().servos.set(port, ServoValue::Duty(value))
    }

    pub fn servo_value(&self, port: usize) -> Option<ServoValue> {
        self.shared.lock().servos.get(port)
    }

    /// Most recent reading from every power sensor that responded
    pub fn current_power_readings(&self) -> Vec<PowerReading> {
        self.shared.lock().power_readings.clone()
    }

    pub fn faults(&self) -> FaultFlags {
        self.shared.lock().faults
    }

    /// Wheel rotations (FL, FR, BL, BR) since start or the last zero
    pub fn wheel_rotations(&self) -> [f64; 4] {
        self.shared.lock().wheel_rotations
    }

    pub fn zero_wheel_rotations(&self) {
        let mut state = self.shared.lock();
        state.wheel_rotations = [0.0; 4];
        state.zero_wheel_rotations = true;
    }

    /// Number of bus sessions started, including the first
    pub fn sessions(&self) -> u64 {
        self.shared.lock().sessions
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and wait for it to zero the motors and exit.
    pub fn shutdown(mut self) -> HardwareResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> HardwareResult<()> {
        self.cancel.cancel();
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|_| HardwareError::NotRunning),
            None => Ok(()),
        }
    }
}

impl Drop for BusController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Device handles for one session
struct Session {
    motors: Box<dyn MotorDriver>,
    servos: Box<dyn ServoDriver>,
    monitors: Vec<Box<dyn PowerMonitor>>,
    last_servo_attempt: Instant,
    last_written: Option<MotorSetpoint>,
    last_write_time: Instant,
    last_power_poll: Option<Instant>,
}

struct BusLoop<B> {
    backend: B,
    config: BusConfig,
    shared: Arc<Shared>,
    telemetry: Arc<dyn TelemetrySink>,
    cancel: CancelToken,
    tracker: DistanceTracker,
}

impl<B: BusBackend> BusLoop<B> {
    fn run(mut self, init_done: Sender<()>) {
        info!("Bus loop started");
        let mut init_done = Some(init_done);

        loop {
            let result = self.run_session(&mut init_done);
            if let Some(tx) = init_done.take() {
                let _ = tx.send(());
            }
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = result {
                warn!("Bus failure, restarting session: {e}");
                self.prepare_restart();
            }
            if self.cancel.wait_timeout(self.config.restart_backoff()) {
                break;
            }
        }

        info!("Bus loop exited");
    }

    fn prepare_restart(&self) {
        let mut state = self.shared.lock();
        if self.config.zero_motors_on_restart && !state.motors.is_zero() {
            warn!(
                "Discarding motor setpoint {:?} from failed session",
                state.motors
            );
            state.motors = MotorSetpoint::ZERO;
        }
        state.servos.mark_all_dirty();
        state.faults.bus_restarting = true;
    }

    fn run_session(&mut self, init_done: &mut Option<Sender<()>>) -> HardwareResult<()> {
        let mut motors = self.backend.open_motors()?;
        motors.enable_watchdog(self.config.watchdog_timeout())?;
        let servos = self.open_servos();
        let monitors = self.backend.open_power_monitors();
        self.tracker.rebase();

        {
            let mut state = self.shared.lock();
            state.sessions += 1;
            state.servos.mark_all_dirty();
            state.faults.bus_restarting = false;
            state.faults.servo_degraded = servos.is_stub();
        }

        info!(
            "Bus session started: watchdog {:?}, {} power monitors, servos {}",
            self.config.watchdog_timeout(),
            monitors.len(),
            if servos.is_stub() { "unavailable" } else { "ok" }
        );
        if let Some(tx) = init_done.take() {
            let _ = tx.send(());
        }

        let now = Instant::now();
        let mut session = Session {
            motors,
            servos,
            monitors,
            last_servo_attempt: now,
            last_written: None,
            last_write_time: now,
            last_power_poll: None,
        };

        let result = self.tick_loop(&mut session);

        let stopped = session
            .motors
            .write_setpoint(&MotorSetpoint::ZERO)
            .and_then(|_| session.motors.release());
        if let Err(e) = stopped {
            debug!("Could not stop motors at end of session: {e}");
        }
        result
    }

    fn tick_loop(&mut self, session: &mut Session) -> HardwareResult<()> {
        let tick = self.config.tick();
        let mut next_tick = Instant::now();
        loop {
            next_tick += tick;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
            if self.cancel.wait_until(next_tick) {
                return Ok(());
            }
            self.tick(session)?;
        }
    }

    fn tick(&mut self, session: &mut Session) -> HardwareResult<()> {
        if session.servos.is_stub()
            && session.last_servo_attempt.elapsed() >= self.config.servo_retry_interval()
        {
            session.last_servo_attempt = Instant::now();
            if let Ok(servos) = self.backend.open_servos() {
                info!("Servo controller recovered");
                session.servos = servos;
                let mut state = self.shared.lock();
                state.servos.mark_all_dirty();
                state.faults.servo_degraded = false;
            }
        }

        let (desired, dirty, zero_wheels) = {
            let mut state = self.shared.lock();
            let zero_wheels = std::mem::take(&mut state.zero_wheel_rotations);
            (state.motors, state.servos.take_dirty(), zero_wheels)
        };

        // Write ahead of the deadline so the gap never exceeds the refresh interval.
        let refresh_due =
            session.last_write_time.elapsed() + self.config.tick() >= self.config.watchdog_refresh();
        if session.last_written != Some(desired) || refresh_due {
            session.motors.write_setpoint(&desired)?;
            session.motors.pet_watchdog()?;
            session.last_written = Some(desired);
            session.last_write_time = Instant::now();
        }

        for (port, value) in dirty {
            match value {
                ServoValue::Position(v) => session.servos.set_servo(port, v)?,
                ServoValue::Duty(v) => session.servos.set_pwm(port, v)?,
            }
        }

        if zero_wheels {
            self.tracker.zero();
        }
        match session.motors.travel_counters() {
            Ok(raw) => self.tracker.poll(raw),
            Err(e) => debug!("Travel counter read failed: {e}"),
        }

        let poll_due = session
            .last_power_poll
            .map_or(true, |t| t.elapsed() >= self.config.power_poll_interval());
        if poll_due {
            session.last_power_poll = Some(Instant::now());
            self.poll_power(session);
        }

        self.shared.lock().wheel_rotations = self.tracker.rotations();
        Ok(())
    }

    fn poll_power(&self, session: &mut Session) {
        let mut readings = Vec::with_capacity(session.monitors.len() + 1);
        let mut faults = self.shared.lock().faults;

        match session.motors.telemetry() {
            Ok(t) => {
                if t.watchdog_expired && !faults.watchdog_expired {
                    warn!("Motor controller watchdog expired");
                }
                if t.fault && !faults.motor_fault {
                    warn!("Motor controller fault");
                }
                faults.motor_fault = t.fault;
                faults.watchdog_expired = t.watchdog_expired;
                debug!("Motor controller temperature {:.1}C", t.temperature_c);
                readings.push(t.reading);
            }
            Err(e) => debug!("Motor telemetry read failed: {e}"),
        }

        for monitor in session.monitors.iter_mut() {
            match monitor.read() {
                Ok(reading) => readings.push(reading),
                Err(e) => debug!("{} read failed: {e}", monitor.name()),
            }
        }
        faults.servo_degraded = session.servos.is_stub();

        {
            let mut state = self.shared.lock();
            state.power_readings = readings.clone();
            state.faults = faults;
        }
        self.telemetry.publish(&readings, faults);
    }

    fn open_servos(&mut self) -> Box<dyn ServoDriver> {
        match self.backend.open_servos() {
            Ok(servos) => servos,
            Err(e) => {
                warn!("Servo controller unavailable, continuing without it: {e}");
                Box::new(NullServo)
            }
        }
    }
}
