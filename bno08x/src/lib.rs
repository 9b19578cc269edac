//! BNO08x UART-RVC orientation protocol parsing
//!
//! The sensor streams fixed 19-byte frames at 100 Hz. Each frame carries
//! yaw/pitch/roll in hundredths of a degree and linear acceleration in
//! hundredths of a unit, followed by a one-byte additive checksum.

mod checksum;
mod frame;
pub mod framer;
pub mod mock;
mod parser;

pub use checksum::{compute_checksum, verify_checksum};
pub use frame::{OrientationFrame, FRAME_HEADER, FRAME_SIZE};
pub use framer::{Framer, FramerStats};
pub use parser::{parse, ParseError};
