//! Robot hardware access.
//!
//! * [`bus`]: the actuator bus loop with its watchdog, servo and power monitoring
//! * [`imu`]: orientation acquisition from the BNO08x serial stream
//! * [`i2c`]: device drivers generic over `embedded-hal`
//! * [`mock`]: recording stand-ins for all of the above

pub mod bus;
pub mod cancel;
pub mod errors;
pub mod i2c;
pub mod imu;
pub mod mock;

pub use cancel::CancelToken;
pub use errors::{HardwareError, HardwareResult, ImuError, ImuResult};
