//! Heading-hold motion control.
//!
//! * [`angle`]: shortest-path heading arithmetic
//! * [`controllers`]: absolute and relative heading-hold loops
//! * [`coordinator`]: motor-control mode lifecycle over the bus loop
//! * [`config`]: every tunable, loadable from JSON

pub mod angle;
pub mod config;
pub mod controllers;
pub mod convergence;
pub mod coordinator;
pub mod error;
pub mod mixing;
pub mod pid;
pub mod sink;
pub mod slew;

pub use angle::Angle;
pub use config::RobotConfig;
pub use controllers::{AbsoluteController, RelativeController};
pub use coordinator::{ControlMode, Coordinator, RawControl};
pub use error::{MotionError, MotionResult, WaitError};
pub use sink::MotorSink;
