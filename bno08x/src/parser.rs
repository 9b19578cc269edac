//! Frame validation and decoding

use bytemuck::from_bytes;
use thiserror::Error;

use crate::checksum::compute_checksum;
use crate::frame::{OrientationFrame, FRAME_HEADER, FRAME_SIZE};

/// Parse error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame must be {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("missing frame marker, found {0:02x?}")]
    BadMarker([u8; 2]),

    #[error("checksum mismatch: computed {computed:#04x}, frame says {stored:#04x}")]
    BadChecksum { computed: u8, stored: u8 },
}

/// Parse one complete frame.
///
/// The slice must be exactly one frame long and start with the marker.
pub fn parse(data: &[u8]) -> Result<OrientationFrame, ParseError> {
    if data.len() != FRAME_SIZE {
        return Err(ParseError::WrongLength {
            expected: FRAME_SIZE,
            got: data.len(),
        });
    }

    if data[..2] != FRAME_HEADER {
        return Err(ParseError::BadMarker([data[0], data[1]]));
    }

    let computed = compute_checksum(&data[2..FRAME_SIZE - 1]);
    let stored = data[FRAME_SIZE - 1];
    if computed != stored {
        return Err(ParseError::BadChecksum { computed, stored });
    }

    Ok(*from_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::build_frame;

    #[test]
    fn test_parse_valid() {
        let frame = build_frame(7, 1234, -56, 78, [1, 2, 3]);
        let parsed = parse(bytemuck::bytes_of(&frame)).unwrap();
        assert_eq!({ parsed.index }, 7);
        assert_eq!(parsed.yaw(), 1234);
        assert_eq!(parsed.pitch(), -56);
        assert_eq!(parsed.roll(), 78);
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            parse(&[0xAA, 0xAA, 0x00]),
            Err(ParseError::WrongLength {
                expected: FRAME_SIZE,
                got: 3
            })
        );
    }

    #[test]
    fn test_bad_marker() {
        let frame = build_frame(1, 0, 0, 0, [0, 0, 0]);
        let mut bytes = bytemuck::bytes_of(&frame).to_vec();
        bytes[1] = 0x55;
        assert_eq!(parse(&bytes), Err(ParseError::BadMarker([0xAA, 0x55])));
    }

    #[test]
    fn test_bad_checksum() {
        let frame = build_frame(1, 100, 0, 0, [0, 0, 0]);
        let mut bytes = bytemuck::bytes_of(&frame).to_vec();
        bytes[18] = bytes[18].wrapping_add(1);
        assert!(matches!(
            parse(&bytes),
            Err(ParseError::BadChecksum { .. })
        ));
    }
}
