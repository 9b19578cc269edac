//! Checksum computation for UART-RVC frames
//!
//! The checksum is the sum of every byte between the two header bytes and
//! the checksum byte itself, truncated to 8 bits.

use crate::frame::FRAME_SIZE;

/// Compute the wrapping 8-bit sum of a byte slice.
pub fn compute_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Verify the checksum of a complete frame.
///
/// Covers bytes 2..=17 and compares against byte 18. Frames of the wrong
/// length never verify.
pub fn verify_checksum(frame: &[u8]) -> bool {
    if frame.len() != FRAME_SIZE {
        return false;
    }
    compute_checksum(&frame[2..FRAME_SIZE - 1]) == frame[FRAME_SIZE - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sensor lying flat: index 0x2d, yaw -1.23, pitch 0.05,
    // roll -0.02, accel (0.11, -0.07, 9.81).
    const CAPTURED: [u8; 19] = [
        0xAA, 0xAA, 0x2D, 0x85, 0xFF, 0x05, 0x00, 0xFE, 0xFF, 0x0B, 0x00, 0xF9, 0xFF, 0xD5,
        0x03, 0x00, 0x00, 0x00, 0x8E,
    ];

    #[test]
    fn test_checksum_of_captured_frame() {
        assert_eq!(compute_checksum(&CAPTURED[2..18]), 0x8E);
        assert!(verify_checksum(&CAPTURED));
    }

    #[test]
    fn test_checksum_wrapping() {
        assert_eq!(compute_checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(compute_checksum(&[]), 0x00);
    }

    #[test]
    fn test_header_not_covered() {
        let mut frame = CAPTURED;
        frame[0] = 0x00;
        frame[1] = 0x00;
        assert!(verify_checksum(&frame));
    }

    #[test]
    fn test_verify_checksum_invalid() {
        let mut frame = CAPTURED;
        frame[18] ^= 0xFF;
        assert!(!verify_checksum(&frame));
    }

    #[test]
    fn test_verify_checksum_wrong_length() {
        assert!(!verify_checksum(&CAPTURED[..18]));
        assert!(!verify_checksum(&[0u8; 20]));
    }
}
