//! In-memory stand-ins for the robot's hardware.
//!
//! Everything here records what was asked of it, with timestamps, and can be
//! told to fail. The bus loop and IMU reader are tested against these rather
//! than real devices.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bno08x::OrientationFrame;
use bytemuck::bytes_of;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};

use crate::bus::{
    validate_servo, BusBackend, MotorDriver, MotorSetpoint, MotorTelemetry, PowerMonitor,
    PowerReading, ServoDriver,
};
use crate::errors::{HardwareError, HardwareResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct I2cState {
    registers: HashMap<(u8, u8), Vec<u8>>,
    pointers: HashMap<u8, u8>,
    writes: Vec<(u8, Vec<u8>)>,
    fail_next: usize,
}

/// Register-file I2C bus
///
/// A write transaction stores everything after the first byte at the
/// register named by the first byte. Reads return the stored bytes for the
/// last addressed register, zero padded. Clones share the same bus.
#[derive(Debug, Clone, Default)]
pub struct MockI2c {
    state: Arc<Mutex<I2cState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_register(&self, address: u8, reg: u8, bytes: &[u8]) {
        lock(&self.state)
            .registers
            .insert((address, reg), bytes.to_vec());
    }

    pub fn register(&self, address: u8, reg: u8) -> Vec<u8> {
        lock(&self.state)
            .registers
            .get(&(address, reg))
            .cloned()
            .unwrap_or_default()
    }

    /// Write-only transactions sent to `address`, oldest first
    pub fn writes(&self, address: u8) -> Vec<Vec<u8>> {
        lock(&self.state)
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// Fail the next `count` transactions with a bus error.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).fail_next = count;
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ErrorKind::Bus);
        }

        let mut written = Vec::new();
        let mut has_read = false;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if let Some((&reg, data)) = bytes.split_first() {
                        state.pointers.insert(address, reg);
                        if !data.is_empty() {
                            state.registers.insert((address, reg), data.to_vec());
                        }
                    }
                    written.extend_from_slice(bytes);
                }
                Operation::Read(buffer) => {
                    has_read = true;
                    let reg = state.pointers.get(&address).copied().unwrap_or(0);
                    let stored = state.registers.get(&(address, reg));
                    for (i, b) in buffer.iter_mut().enumerate() {
                        *b = stored.and_then(|s| s.get(i)).copied().unwrap_or(0);
                    }
                }
            }
        }
        if !has_read {
            state.writes.push((address, written));
        }
        Ok(())
    }
}

/// Something the mock bus devices were asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    MotorsOpened,
    WatchdogEnabled(Duration),
    Motors(MotorSetpoint),
    WatchdogPet,
    Servo { port: usize, value: f64 },
    Pwm { port: usize, value: f64 },
    Released,
}

#[derive(Debug)]
struct BusLogState {
    events: Vec<(Instant, BusEvent)>,
    motor_open_failures: usize,
    motor_write_failures: usize,
    servos_available: bool,
    travel: [i16; 4],
    motor_reading: PowerReading,
    motor_fault: bool,
    monitors: Vec<PowerReading>,
}

impl Default for BusLogState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            motor_open_failures: 0,
            motor_write_failures: 0,
            servos_available: true,
            travel: [0; 4],
            motor_reading: PowerReading {
                name: "motors".to_string(),
                voltage: 12.0,
                current: 0.5,
                power: 6.0,
            },
            motor_fault: false,
            monitors: Vec::new(),
        }
    }
}

/// Shared record of every device interaction, plus failure injection
#[derive(Debug, Clone, Default)]
pub struct MockBusLog {
    state: Arc<Mutex<BusLogState>>,
}

impl MockBusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Instant, BusEvent)> {
        lock(&self.state).events.clone()
    }

    pub fn motor_writes(&self) -> Vec<(Instant, MotorSetpoint)> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|(t, e)| match e {
                BusEvent::Motors(s) => Some((*t, *s)),
                _ => None,
            })
            .collect()
    }

    pub fn pet_times(&self) -> Vec<Instant> {
        lock(&self.state)
            .events
            .iter()
            .filter(|(_, e)| *e == BusEvent::WatchdogPet)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&BusEvent) -> bool) -> usize {
        lock(&self.state)
            .events
            .iter()
            .filter(|(_, e)| matches(e))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.state).events.clear();
    }

    /// Fail the next `count` attempts to open the motor controller.
    pub fn fail_motor_opens(&self, count: usize) {
        lock(&self.state).motor_open_failures = count;
    }

    /// Fail the next `count` motor setpoint writes.
    pub fn fail_motor_writes(&self, count: usize) {
        lock(&self.state).motor_write_failures = count;
    }

    pub fn set_servos_available(&self, available: bool) {
        lock(&self.state).servos_available = available;
    }

    pub fn set_travel(&self, travel: [i16; 4]) {
        lock(&self.state).travel = travel;
    }

    pub fn set_motor_fault(&self, fault: bool) {
        lock(&self.state).motor_fault = fault;
    }

    /// Add a power monitor that will be found on the next session start.
    pub fn add_power_monitor(&self, reading: PowerReading) {
        lock(&self.state).monitors.push(reading);
    }

    fn record(&self, event: BusEvent) {
        lock(&self.state).events.push((Instant::now(), event));
    }
}

fn injected(device: &'static str) -> HardwareError {
    HardwareError::I2c {
        device,
        kind: ErrorKind::Bus,
    }
}

/// Motor controller that records into a [`MockBusLog`]
#[derive(Debug)]
pub struct MockMotors {
    log: MockBusLog,
}

impl MotorDriver for MockMotors {
    fn enable_watchdog(&mut self, timeout: Duration) -> HardwareResult<()> {
        self.log.record(BusEvent::WatchdogEnabled(timeout));
        Ok(())
    }

    fn write_setpoint(&mut self, setpoint: &MotorSetpoint) -> HardwareResult<()> {
        {
            let mut state = lock(&self.log.state);
            if state.motor_write_failures > 0 {
                state.motor_write_failures -= 1;
                return Err(injected("mock-motors"));
            }
        }
        self.log.record(BusEvent::Motors(*setpoint));
        Ok(())
    }

    fn pet_watchdog(&mut self) -> HardwareResult<()> {
        self.log.record(BusEvent::WatchdogPet);
        Ok(())
    }

    fn travel_counters(&mut self) -> HardwareResult<[i16; 4]> {
        Ok(lock(&self.log.state).travel)
    }

    fn telemetry(&mut self) -> HardwareResult<MotorTelemetry> {
        let state = lock(&self.log.state);
        Ok(MotorTelemetry {
            reading: state.motor_reading.clone(),
            temperature_c: 30.0,
            fault: state.motor_fault,
            watchdog_expired: false,
        })
    }

    fn release(&mut self) -> HardwareResult<()> {
        self.log.record(BusEvent::Released);
        Ok(())
    }
}

/// Servo controller that records into a [`MockBusLog`]
#[derive(Debug)]
pub struct MockServos {
    log: MockBusLog,
}

impl ServoDriver for MockServos {
    fn set_servo(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        validate_servo(port, value)?;
        self.log.record(BusEvent::Servo { port, value });
        Ok(())
    }

    fn set_pwm(&mut self, port: usize, value: f64) -> HardwareResult<()> {
        validate_servo(port, value)?;
        self.log.record(BusEvent::Pwm { port, value });
        Ok(())
    }
}

struct MockPowerMonitor {
    reading: PowerReading,
}

impl PowerMonitor for MockPowerMonitor {
    fn name(&self) -> &str {
        &self.reading.name
    }

    fn read(&mut self) -> HardwareResult<PowerReading> {
        Ok(self.reading.clone())
    }
}

/// Bus backend handing out mock devices that share one log
#[derive(Debug, Clone)]
pub struct MockBackend {
    log: MockBusLog,
}

impl MockBackend {
    pub fn new(log: MockBusLog) -> Self {
        Self { log }
    }
}

impl BusBackend for MockBackend {
    fn open_motors(&mut self) -> HardwareResult<Box<dyn MotorDriver>> {
        {
            let mut state = lock(&self.log.state);
            if state.motor_open_failures > 0 {
                state.motor_open_failures -= 1;
                return Err(injected("mock-motors"));
            }
        }
        self.log.record(BusEvent::MotorsOpened);
        Ok(Box::new(MockMotors {
            log: self.log.clone(),
        }))
    }

    fn open_servos(&mut self) -> HardwareResult<Box<dyn ServoDriver>> {
        if !lock(&self.log.state).servos_available {
            return Err(injected("mock-servos"));
        }
        Ok(Box::new(MockServos {
            log: self.log.clone(),
        }))
    }

    fn open_power_monitors(&mut self) -> Vec<Box<dyn PowerMonitor>> {
        lock(&self.log.state)
            .monitors
            .iter()
            .map(|reading| {
                Box::new(MockPowerMonitor {
                    reading: reading.clone(),
                }) as Box<dyn PowerMonitor>
            })
            .collect()
    }
}

#[derive(Debug)]
enum Chunk {
    Bytes(Vec<u8>),
    Error(io::ErrorKind),
    Eof,
}

/// Serial port that replays queued bytes and errors
///
/// Once the queue is empty reads time out after a short sleep, like a real
/// port with a read timeout. Clones share the queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSerial {
    queue: Arc<Mutex<VecDeque<Chunk>>>,
}

impl ScriptedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.queue).push_back(Chunk::Bytes(bytes.to_vec()));
    }

    pub fn push_frame(&self, frame: &OrientationFrame) {
        self.push_bytes(bytes_of(frame));
    }

    /// Queue a read error, e.g. `BrokenPipe` to simulate an unplugged port.
    pub fn push_error(&self, kind: io::ErrorKind) {
        lock(&self.queue).push_back(Chunk::Error(kind));
    }

    /// Queue `count` zero-length reads, as from a device that went away.
    pub fn push_eof(&self, count: usize) {
        let mut queue = lock(&self.queue);
        queue.extend(std::iter::repeat_with(|| Chunk::Eof).take(count));
    }

    pub fn is_drained(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}

impl Read for ScriptedSerial {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let next = lock(&self.queue).pop_front();
        match next {
            Some(Chunk::Bytes(bytes)) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    lock(&self.queue).push_front(Chunk::Bytes(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Chunk::Error(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Chunk::Eof) => Ok(0),
            None => {
                thread::sleep(Duration::from_millis(2));
                Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_i2c_write_then_read() {
        let mut i2c = MockI2c::new();
        i2c.write(0x40, &[0x05, 0xAB, 0xCD]).unwrap();
        let mut buf = [0u8; 3];
        i2c.write_read(0x40, &[0x05], &mut buf).unwrap();
        assert_eq!(buf, [0xAB, 0xCD, 0]);
        assert_eq!(i2c.writes(0x40), vec![vec![0x05, 0xAB, 0xCD]]);
        assert!(i2c.writes(0x41).is_empty());
    }

    #[test]
    fn test_mock_i2c_failure_injection() {
        let mut i2c = MockI2c::new();
        i2c.fail_next(1);
        assert_eq!(i2c.write(0x40, &[0, 1]), Err(ErrorKind::Bus));
        assert!(i2c.write(0x40, &[0, 1]).is_ok());
    }

    #[test]
    fn test_scripted_serial_splits_chunks() {
        let mut serial = ScriptedSerial::new();
        serial.push_bytes(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(serial.read(&mut buf).unwrap(), 3);
        assert_eq!(serial.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        let err = serial.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
