//! Heading-hold control loops.
//!
//! Each controller runs on its own thread, owns the motor output while it
//! runs and commands zero motors before the thread exits.

pub mod absolute;
pub mod rate;
pub mod relative;

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hardware::imu::{OrientationReport, OrientationState, REPORT_STALL_TIMEOUT};
use hardware::{CancelToken, ImuError};
use tracing::info;

use crate::error::{MotionError, MotionResult};

pub use absolute::AbsoluteController;
pub use rate::{
    rate_source_factory, Mpu6050RateSource, RateSample, RateSource, RateSourceFactory,
    ReportRateSource,
};
pub use relative::RelativeController;

/// Longest single wait on the orientation state before re-checking cancellation
const REPORT_POLL_SLICE: Duration = Duration::from_millis(50);

/// A running control thread and the token that stops it
pub(crate) struct ControlTask {
    cancel: CancelToken,
    join_handle: Option<JoinHandle<()>>,
}

impl ControlTask {
    pub(crate) fn spawn<F>(name: &'static str, cancel: CancelToken, body: F) -> MotionResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let join_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| MotionError::Spawn { name, source })?;
        Ok(Self {
            cancel,
            join_handle: Some(join_handle),
        })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Cancel the thread and block until it has exited.
    pub(crate) fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ControlTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Block until the orientation state holds a report, with no deadline.
///
/// The sensor may still be opening or in its reopen backoff when a hold
/// starts, so the stall ceiling only applies once reports are flowing.
/// Returns `None` if cancelled first.
pub(crate) fn wait_for_first_report(
    orientation: &OrientationState,
    cancel: &CancelToken,
) -> Option<OrientationReport> {
    let mut logged = false;
    loop {
        if let Some(report) = orientation.current_report() {
            return Some(report);
        }
        if !logged {
            info!("Waiting for first orientation report");
            logged = true;
        }
        if cancel.wait_timeout(REPORT_POLL_SLICE) {
            return None;
        }
    }
}

/// Wait for a report captured after `after`, waking regularly to observe
/// `cancel`.
///
/// Returns `Ok(None)` if cancelled and [`ImuError::Stalled`] if no fresh
/// report arrives within [`REPORT_STALL_TIMEOUT`].
pub(crate) fn wait_for_report(
    orientation: &OrientationState,
    after: Option<Instant>,
    cancel: &CancelToken,
) -> MotionResult<Option<OrientationReport>> {
    let deadline = Instant::now() + REPORT_STALL_TIMEOUT;
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ImuError::Stalled(REPORT_STALL_TIMEOUT).into());
        }
        let slice = REPORT_POLL_SLICE.min(deadline - now);
        match orientation.wait_for_report_after_timeout(after, slice) {
            Ok(report) => return Ok(Some(report)),
            Err(ImuError::Stalled(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
