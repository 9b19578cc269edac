//! Mecanum wheel mixing.

use hardware::bus::MotorSetpoint;

/// Combine normalised throttle, rotation and translation into wheel values
/// in FL, FR, BL, BR order.
///
/// The right-hand motors are mounted mirrored, so forward throttle drives
/// them negative. Positive rotation turns the robot clockwise seen from
/// above. If any wheel would exceed 1.0 all four are scaled down together,
/// keeping the ratio between them.
pub fn mix(throttle: f64, rotation: f64, translation: f64) -> [f64; 4] {
    let wheels = [
        throttle - rotation - translation,
        -throttle - rotation - translation,
        throttle - rotation + translation,
        -throttle - rotation + translation,
    ];

    let peak = wheels.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if peak > 1.0 {
        wheels.map(|v| v / peak)
    } else {
        wheels
    }
}

/// [`mix`] then scale to motor controller units.
pub fn to_setpoint(throttle: f64, rotation: f64, translation: f64, full_scale: f64) -> MotorSetpoint {
    MotorSetpoint::from_normalized(mix(throttle, rotation, translation), full_scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_pure_throttle() {
        assert_eq!(mix(0.5, 0.0, 0.0), [0.5, -0.5, 0.5, -0.5]);
    }

    #[test]
    fn test_pure_rotation_turns_all_wheels_together() {
        assert_eq!(mix(0.0, 0.25, 0.0), [-0.25; 4]);
    }

    #[test]
    fn test_pure_translation() {
        assert_eq!(mix(0.0, 0.0, 0.5), [-0.5, -0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_saturation_keeps_ratio() {
        let wheels = mix(1.0, 1.0, 0.0);
        assert_relative_eq!(wheels[0], 0.0);
        assert_relative_eq!(wheels[1], -1.0);
        assert_relative_eq!(wheels[2], 0.0);
        assert_relative_eq!(wheels[3], -1.0);
    }

    #[test]
    fn test_random_inputs_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let t = rng.gen_range(-3.0..3.0);
            let r = rng.gen_range(-3.0..3.0);
            let s = rng.gen_range(-3.0..3.0);
            for v in mix(t, r, s) {
                assert!(v.abs() <= 1.0 + 1e-12, "{t} {r} {s} -> {v}");
            }
            let setpoint = to_setpoint(t, r, s, 10240.0);
            for v in setpoint.as_array() {
                assert!(v.abs() <= 10240);
            }
        }
    }

    #[test]
    fn test_setpoint_scaling() {
        let setpoint = to_setpoint(0.5, 0.0, 0.0, 10240.0);
        assert_eq!(setpoint, MotorSetpoint::new(5120, -5120, 5120, -5120));
    }
}
