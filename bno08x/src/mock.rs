//! Synthetic frame generation
//!
//! Builds valid frames for tests and for the `mock_imu` transmitter.

use bytemuck::bytes_of;

use crate::checksum::compute_checksum;
use crate::frame::{OrientationFrame, FRAME_HEADER, FRAME_SIZE};

/// Build a frame with a valid checksum.
///
/// # Arguments
/// * `index` - Sequence index
/// * `yaw`, `pitch`, `roll` - Angles in 0.01 degree units
/// * `accel` - Accelerations (x, y, z) in 0.01 m/s^2 units
pub fn build_frame(index: u8, yaw: i16, pitch: i16, roll: i16, accel: [i16; 3]) -> OrientationFrame {
    let mut frame = OrientationFrame {
        header: FRAME_HEADER,
        index,
        yaw: yaw.to_le(),
        pitch: pitch.to_le(),
        roll: roll.to_le(),
        x_accel: accel[0].to_le(),
        y_accel: accel[1].to_le(),
        z_accel: accel[2].to_le(),
        reserved: [0; 3],
        checksum: 0,
    };

    let bytes = bytes_of(&frame);
    frame.checksum = compute_checksum(&bytes[2..FRAME_SIZE - 1]);
    frame
}

/// Build a level frame with the given yaw in degrees.
///
/// Gravity is reported on Z as the sensor does when lying flat.
pub fn build_yaw_frame(index: u8, yaw_degrees: f64) -> OrientationFrame {
    let yaw = (yaw_degrees * 100.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    build_frame(index, yaw, 0, 0, [0, 0, 981])
}
