use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::report::OrientationReport;
use crate::errors::{ImuError, ImuResult};

/// Longest a consumer waits for a fresh report before giving up
pub const REPORT_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Latest-report slot shared between the reader and its consumers
///
/// Every publish replaces the report wholesale and wakes all waiters.
#[derive(Debug, Default)]
pub struct OrientationState {
    latest: Mutex<Option<OrientationReport>>,
    published: Condvar,
}

impl OrientationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, report: OrientationReport) {
        *self.lock() = Some(report);
        self.published.notify_all();
    }

    /// Latest report, `None` until the first frame arrives
    pub fn current_report(&self) -> Option<OrientationReport> {
        *self.lock()
    }

    /// Block until a report captured after `after` is available.
    ///
    /// `None` accepts any report, including one already published. Fails
    /// with [`ImuError::Stalled`] if nothing new arrives within
    /// [`REPORT_STALL_TIMEOUT`].
    pub fn wait_for_report_after(&self, after: Option<Instant>) -> ImuResult<OrientationReport> {
        self.wait_for_report_after_timeout(after, REPORT_STALL_TIMEOUT)
    }

    pub fn wait_for_report_after_timeout(
        &self,
        after: Option<Instant>,
        timeout: Duration,
    ) -> ImuResult<OrientationReport> {
        let is_fresh = |slot: &Option<OrientationReport>| match (slot, after) {
            (Some(r), Some(t)) => r.capture_time > t,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let guard = self.lock();
        let (guard, _) = self
            .published
            .wait_timeout_while(guard, timeout, |slot| !is_fresh(slot))
            .unwrap_or_else(PoisonError::into_inner);

        let slot = *guard;
        match slot {
            Some(report) if is_fresh(&slot) => Ok(report),
            _ => Err(ImuError::Stalled(timeout)),
        }
    }

    /// Wake every waiter without publishing, e.g. so they can observe a
    /// cancellation.
    pub fn notify_all(&self) {
        self.published.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Option<OrientationReport>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report_at(index: u8, capture_time: Instant) -> OrientationReport {
        OrientationReport {
            capture_time,
            index,
            yaw: index as i16 * 100,
            pitch: 0,
            roll: 0,
            accel_x: 0,
            accel_y: 0,
            accel_z: 981,
        }
    }

    #[test]
    fn test_no_report_before_first_publish() {
        let state = OrientationState::new();
        assert!(state.current_report().is_none());
    }

    #[test]
    fn test_publish_replaces_report() {
        let state = OrientationState::new();
        state.publish(report_at(1, Instant::now()));
        state.publish(report_at(2, Instant::now()));
        assert_eq!(state.current_report().unwrap().index, 2);
    }

    #[test]
    fn test_wait_returns_existing_report_when_unbounded() {
        let state = OrientationState::new();
        state.publish(report_at(3, Instant::now()));
        let r = state.wait_for_report_after(None).unwrap();
        assert_eq!(r.index, 3);
    }

    #[test]
    fn test_wait_blocks_for_newer_report() {
        let state = Arc::new(OrientationState::new());
        let first = Instant::now();
        state.publish(report_at(1, first));

        let publisher = {
            let state = state.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                state.publish(report_at(2, Instant::now()));
            })
        };

        let r = state.wait_for_report_after(Some(first)).unwrap();
        assert_eq!(r.index, 2);
        assert!(r.capture_time > first);
        publisher.join().unwrap();
    }

    #[test]
    fn test_wait_stalls_without_new_report() {
        let state = OrientationState::new();
        let t = Instant::now();
        state.publish(report_at(1, t));

        let start = Instant::now();
        let err = state
            .wait_for_report_after_timeout(Some(t), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ImuError::Stalled(_)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_stalls_with_no_report_at_all() {
        let state = OrientationState::new();
        let err = state
            .wait_for_report_after_timeout(None, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ImuError::Stalled(_)));
    }
}
