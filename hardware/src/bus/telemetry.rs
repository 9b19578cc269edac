//! Power and fault telemetry surfaced by the bus loop.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A single power rail measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    /// Sensor name
    pub name: String,
    /// Bus voltage in volts
    pub voltage: f64,
    /// Current in amps
    pub current: f64,
    /// Power in watts
    pub power: f64,
}

/// Motor controller health as read alongside its power reading
#[derive(Debug, Clone, PartialEq)]
pub struct MotorTelemetry {
    pub reading: PowerReading,
    pub temperature_c: f64,
    pub fault: bool,
    pub watchdog_expired: bool,
}

/// Boolean fault indicators for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultFlags {
    /// Motor controller reports a fault
    pub motor_fault: bool,
    /// Motor controller watchdog fired since the last session start
    pub watchdog_expired: bool,
    /// Servo controller could not be opened, writes go nowhere
    pub servo_degraded: bool,
    /// Bus session failed and is being restarted
    pub bus_restarting: bool,
}

impl FaultFlags {
    pub fn any(&self) -> bool {
        self.motor_fault || self.watchdog_expired || self.servo_degraded || self.bus_restarting
    }
}

/// Receives telemetry from the bus loop.
///
/// Called on the bus thread, so implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, readings: &[PowerReading], faults: FaultFlags);
}

/// Telemetry sink that writes to the log
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn publish(&self, readings: &[PowerReading], faults: FaultFlags) {
        for r in readings {
            info!(
                "{}: {:.2}V {:.2}A {:.2}W",
                r.name, r.voltage, r.current, r.power
            );
        }
        if faults.any() {
            warn!("Faults: {faults:?}");
        }
    }
}
