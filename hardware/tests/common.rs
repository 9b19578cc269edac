//! Common utilities for hardware tests

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hardware::bus::{BusConfig, FaultFlags, PowerReading, TelemetrySink};

/// Bus timing scaled down so tests run in well under a second
pub fn fast_bus_config() -> BusConfig {
    BusConfig {
        tick_ms: 5,
        watchdog_timeout_ms: 400,
        power_poll_interval_ms: 50,
        servo_retry_interval_ms: 30,
        restart_backoff_ms: 10,
        ..BusConfig::default()
    }
}

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

/// Telemetry sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    pub published: Mutex<Vec<(Vec<PowerReading>, FaultFlags)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(Vec<PowerReading>, FaultFlags)> {
        self.published.lock().unwrap().last().cloned()
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&self, readings: &[PowerReading], faults: FaultFlags) {
        self.published
            .lock()
            .unwrap()
            .push((readings.to_vec(), faults));
    }
}
