//! Wheel travel accumulation for dead reckoning.

/// Travel counter increments per wheel revolution
const COUNTS_PER_ROTATION: f64 = 256.0;

/// Accumulates the motor controller's wrapping 16-bit travel counters.
///
/// The first poll only records a baseline. Later polls add the wrapped
/// difference, so counters may roll over any number of times as long as
/// fewer than 32768 counts pass between polls.
#[derive(Debug, Clone, Default)]
pub struct DistanceTracker {
    baseline: Option<[i16; 4]>,
    accumulated: [i64; 4],
}

impl DistanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw counters in wheel order (FL, FR, BL, BR).
    pub fn poll(&mut self, raw: [i16; 4]) {
        if let Some(last) = self.baseline {
            for (acc, (new, old)) in self.accumulated.iter_mut().zip(raw.iter().zip(last)) {
                *acc += new.wrapping_sub(old) as i64;
            }
        }
        self.baseline = Some(raw);
    }

    /// Rotations per wheel since creation or the last [`DistanceTracker::zero`].
    pub fn rotations(&self) -> [f64; 4] {
        self.accumulated.map(|v| v as f64 / COUNTS_PER_ROTATION)
    }

    /// Reset accumulated travel, keeping the counter baseline.
    pub fn zero(&mut self) {
        self.accumulated = [0; 4];
    }

    /// Forget the baseline, e.g. after the controller was power cycled.
    pub fn rebase(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_poll_is_baseline() {
        let mut tracker = DistanceTracker::new();
        tracker.poll([1000, -1000, 5, 7]);
        assert_eq!(tracker.rotations(), [0.0; 4]);
    }

    #[test]
    fn test_accumulates_deltas() {
        let mut tracker = DistanceTracker::new();
        tracker.poll([0, 0, 0, 0]);
        tracker.poll([256, -128, 512, 0]);
        tracker.poll([512, -256, 512, 64]);
        let r = tracker.rotations();
        assert_relative_eq!(r[0], 2.0);
        assert_relative_eq!(r[1], -1.0);
        assert_relative_eq!(r[2], 2.0);
        assert_relative_eq!(r[3], 0.25);
    }

    #[test]
    fn test_counter_wraparound() {
        let mut tracker = DistanceTracker::new();
        tracker.poll([i16::MAX - 10, i16::MIN + 10, 0, 0]);
        tracker.poll([i16::MIN + 245, i16::MAX - 245, 0, 0]);
        let r = tracker.rotations();
        assert_relative_eq!(r[0], 1.0);
        assert_relative_eq!(r[1], -1.0);
    }

    #[test]
    fn test_zero_and_rebase() {
        let mut tracker = DistanceTracker::new();
        tracker.poll([0; 4]);
        tracker.poll([256; 4]);
        tracker.zero();
        assert_eq!(tracker.rotations(), [0.0; 4]);

        tracker.rebase();
        tracker.poll([-5000; 4]);
        assert_eq!(tracker.rotations(), [0.0; 4]);
        tracker.poll([-4744; 4]);
        assert_eq!(tracker.rotations(), [1.0; 4]);
    }
}
