//! Orientation acquisition from a BNO08x in UART-RVC mode.
//!
//! [`ImuReader`] owns the serial connection on its own thread and publishes
//! every valid frame into an [`OrientationState`]. Consumers either sample
//! the latest report or block until a newer one arrives.

mod reader;
mod report;
mod state;

pub use reader::{ByteSource, ImuConfig, ImuReader, ImuStats, EOF_READ_LIMIT};
pub use report::OrientationReport;
pub use state::{OrientationState, REPORT_STALL_TIMEOUT};
