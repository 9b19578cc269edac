use std::fmt;
use std::time::Instant;

use bno08x::OrientationFrame;
use nalgebra::{Rotation3, Vector3};

/// One orientation sample, stamped with the time it was received
///
/// Angles and accelerations are fixed point hundredths as sent by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationReport {
    pub capture_time: Instant,
    pub index: u8,
    pub yaw: i16,
    pub pitch: i16,
    pub roll: i16,
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
}

impl OrientationReport {
    pub fn from_frame(frame: &OrientationFrame, capture_time: Instant) -> Self {
        let [accel_x, accel_y, accel_z] = frame.accel();
        Self {
            capture_time,
            index: frame.index,
            yaw: frame.yaw(),
            pitch: frame.pitch(),
            roll: frame.roll(),
            accel_x,
            accel_y,
            accel_z,
        }
    }

    pub fn yaw_degrees(&self) -> f64 {
        self.yaw as f64 / 100.0
    }

    pub fn pitch_degrees(&self) -> f64 {
        self.pitch as f64 / 100.0
    }

    pub fn roll_degrees(&self) -> f64 {
        self.roll as f64 / 100.0
    }

    /// Acceleration in m/s^2
    pub fn accel(&self) -> [f64; 3] {
        [
            self.accel_x as f64 / 100.0,
            self.accel_y as f64 / 100.0,
            self.accel_z as f64 / 100.0,
        ]
    }

    /// Robot heading in degrees, (-180, 180].
    ///
    /// The sensor is mounted with its Z axis pointing towards the front of
    /// the robot. Yaw, pitch and roll are applied in that order, each about
    /// the axes produced by the previous rotation, and the heading is the
    /// direction of the resulting Z axis in the floor plane.
    pub fn robot_yaw(&self) -> f64 {
        robot_yaw(
            self.yaw_degrees().to_radians(),
            self.pitch_degrees().to_radians(),
            self.roll_degrees().to_radians(),
        )
    }
}

/// Heading of the sensor's Z axis after an intrinsic yaw-pitch-roll rotation
pub fn robot_yaw(yaw: f64, pitch: f64, roll: f64) -> f64 {
    let rotation = Rotation3::from_euler_angles(roll, pitch, yaw);
    let forward = rotation * Vector3::z();
    let degrees = forward.x.atan2(forward.y).to_degrees();
    if degrees <= -180.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

impl fmt::Display for OrientationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [ax, ay, az] = self.accel();
        write!(
            f,
            "[{:02x}] Y:{:7.2} P:{:7.2} R:{:7.2} X:{:7.2} Y:{:7.2} Z:{:7.2}",
            self.index,
            self.yaw_degrees(),
            self.pitch_degrees(),
            self.roll_degrees(),
            ax,
            ay,
            az
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bno08x::mock::build_frame;

    fn report(yaw: i16, pitch: i16, roll: i16) -> OrientationReport {
        let frame = build_frame(7, yaw, pitch, roll, [1, -2, 981]);
        OrientationReport::from_frame(&frame, Instant::now())
    }

    #[test]
    fn test_from_frame_copies_fields() {
        let r = report(-4500, 120, 300);
        assert_eq!(r.index, 7);
        assert_eq!(r.yaw, -4500);
        assert_abs_diff_eq!(r.yaw_degrees(), -45.0);
        assert_abs_diff_eq!(r.pitch_degrees(), 1.2);
        assert_eq!(r.accel(), [0.01, -0.02, 9.81]);
    }

    #[test]
    fn test_pitched_mount_points_along_x() {
        assert_abs_diff_eq!(report(0, 9000, 0).robot_yaw(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rolled_mount_follows_negative_yaw() {
        // Z axis rolled onto Y, so sensor yaw turns the heading the other way
        for yaw in [-17000, -9000, -1000, 0, 2500, 9000, 17500] {
            let r = report(yaw, 0, -9000);
            let expected = -(yaw as f64) / 100.0;
            assert_abs_diff_eq!(r.robot_yaw(), expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_robot_yaw_in_range() {
        let r = report(18000, 0, -9000);
        let y = r.robot_yaw();
        assert!(y > -180.0 && y <= 180.0, "{y}");
    }

    #[test]
    fn test_display() {
        let s = report(1234, 0, 0).to_string();
        assert!(s.starts_with("[07] Y:  12.34"), "{s}");
    }
}
