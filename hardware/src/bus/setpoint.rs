//! Desired actuator state shared between callers and the bus loop.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{HardwareError, HardwareResult};

/// Servo/PWM channels on the PWM controller
pub const NUM_SERVO_PORTS: usize = 16;

/// Per-wheel motor speeds in controller units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorSetpoint {
    pub front_left: i16,
    pub front_right: i16,
    pub back_left: i16,
    pub back_right: i16,
}

impl MotorSetpoint {
    pub const ZERO: MotorSetpoint = MotorSetpoint {
        front_left: 0,
        front_right: 0,
        back_left: 0,
        back_right: 0,
    };

    pub fn new(front_left: i16, front_right: i16, back_left: i16, back_right: i16) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    /// Map wheel values in [-1, 1] (FL, FR, BL, BR) onto `full_scale`.
    ///
    /// Results are clamped to the i16 range so out-of-range inputs saturate
    /// rather than wrap.
    pub fn from_normalized(values: [f64; 4], full_scale: f64) -> Self {
        let [fl, fr, bl, br] =
            values.map(|v| (v * full_scale).clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        Self::new(fl, fr, bl, br)
    }

    /// Values in wheel order (FL, FR, BL, BR)
    pub fn as_array(&self) -> [i16; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// A servo channel value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoValue {
    /// Servo position, 0.0 to 1.0 across the pulse width range
    Position(f64),
    /// Raw duty cycle, 0.0 to 1.0
    Duty(f64),
}

impl ServoValue {
    pub fn value(&self) -> f64 {
        match self {
            ServoValue::Position(v) | ServoValue::Duty(v) => *v,
        }
    }
}

/// Reject out-of-range servo/PWM requests before they touch shared state.
pub fn validate_servo(port: usize, value: f64) -> HardwareResult<()> {
    if port >= NUM_SERVO_PORTS {
        return Err(HardwareError::InvalidPort(port));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(HardwareError::InvalidValue(value));
    }
    Ok(())
}

/// Servo values by port plus the set of ports awaiting a write
#[derive(Debug, Clone, Default)]
pub struct ServoTable {
    values: BTreeMap<usize, ServoValue>,
    dirty: BTreeSet<usize>,
}

impl ServoTable {
    pub fn set(&mut self, port: usize, value: ServoValue) -> HardwareResult<()> {
        validate_servo(port, value.value())?;
        self.values.insert(port, value);
        self.dirty.insert(port);
        Ok(())
    }

    pub fn get(&self, port: usize) -> Option<ServoValue> {
        self.values.get(&port).copied()
    }

    /// Remove and return every dirty port with its current value.
    pub fn take_dirty(&mut self) -> Vec<(usize, ServoValue)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|port| self.values.get(&port).map(|v| (port, *v)))
            .collect()
    }

    /// Queue every known port for rewrite, e.g. after a new device session.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.extend(self.values.keys().copied());
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_normalized_clamps() {
        let sp = MotorSetpoint::from_normalized([1.0, -1.0, 0.5, 4.0], 10240.0);
        assert_eq!(sp, MotorSetpoint::new(10240, -10240, 5120, i16::MAX));
        let sp = MotorSetpoint::from_normalized([-1e9, 0.0, 0.0, 0.0], 10240.0);
        assert_eq!(sp.front_left, i16::MIN);
    }

    #[test]
    fn test_servo_validation() {
        assert!(validate_servo(15, 1.0).is_ok());
        assert!(matches!(
            validate_servo(16, 0.5),
            Err(HardwareError::InvalidPort(16))
        ));
        assert!(matches!(
            validate_servo(0, 1.5),
            Err(HardwareError::InvalidValue(_))
        ));
        assert!(validate_servo(0, f64::NAN).is_err());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut table = ServoTable::default();
        table.set(3, ServoValue::Position(0.25)).unwrap();
        table.set(1, ServoValue::Duty(0.5)).unwrap();
        table.set(3, ServoValue::Position(0.75)).unwrap();

        assert_eq!(
            table.take_dirty(),
            vec![(1, ServoValue::Duty(0.5)), (3, ServoValue::Position(0.75))]
        );
        assert!(!table.has_dirty());

        table.mark_all_dirty();
        assert_eq!(table.take_dirty().len(), 2);
    }

    #[test]
    fn test_rejected_set_leaves_table_unchanged() {
        let mut table = ServoTable::default();
        assert!(table.set(20, ServoValue::Duty(0.1)).is_err());
        assert!(table.get(20).is_none());
        assert!(!table.has_dirty());
    }
}
