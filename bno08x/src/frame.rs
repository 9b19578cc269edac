//! UART-RVC orientation frame

use bytemuck::{Pod, Zeroable};

/// Total frame size in bytes
pub const FRAME_SIZE: usize = 19;

/// Two-byte marker at the start of every frame
pub const FRAME_HEADER: [u8; 2] = [0xAA, 0xAA];

/// Orientation frame as sent by the sensor in UART-RVC mode
///
/// All multi-byte fields are little-endian on the wire. Use the accessor
/// methods rather than the raw fields to get host-order values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct OrientationFrame {
    /// Frame marker, always 0xAA 0xAA (2 bytes)
    pub header: [u8; 2],

    /// Sequence index, wraps at 255 (1 byte)
    pub index: u8,

    /// Yaw in 0.01 degree units (2 bytes)
    pub yaw: i16,

    /// Pitch in 0.01 degree units (2 bytes)
    pub pitch: i16,

    /// Roll in 0.01 degree units (2 bytes)
    pub roll: i16,

    /// X acceleration in 0.01 m/s^2 units (2 bytes)
    pub x_accel: i16,

    /// Y acceleration in 0.01 m/s^2 units (2 bytes)
    pub y_accel: i16,

    /// Z acceleration in 0.01 m/s^2 units (2 bytes)
    pub z_accel: i16,

    /// Reserved by the sensor (3 bytes)
    pub reserved: [u8; 3],

    /// Sum of bytes 2..=17 (1 byte)
    pub checksum: u8,
}

impl OrientationFrame {
    pub fn yaw(&self) -> i16 {
        i16::from_le(self.yaw)
    }

    pub fn pitch(&self) -> i16 {
        i16::from_le(self.pitch)
    }

    pub fn roll(&self) -> i16 {
        i16::from_le(self.roll)
    }

    /// Acceleration as (x, y, z) in 0.01 m/s^2 units
    pub fn accel(&self) -> [i16; 3] {
        [
            i16::from_le(self.x_accel),
            i16::from_le(self.y_accel),
            i16::from_le(self.z_accel),
        ]
    }

    pub fn yaw_degrees(&self) -> f64 {
        self.yaw() as f64 / 100.0
    }

    pub fn pitch_degrees(&self) -> f64 {
        self.pitch() as f64 / 100.0
    }

    pub fn roll_degrees(&self) -> f64 {
        self.roll() as f64 / 100.0
    }
}

// SAFETY: OrientationFrame is repr(C, packed) and all fields are Pod
unsafe impl Pod for OrientationFrame {}
// SAFETY: OrientationFrame is repr(C, packed) and all fields are Zeroable
unsafe impl Zeroable for OrientationFrame {}
