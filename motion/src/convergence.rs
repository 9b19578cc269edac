//! Settling detection for the absolute heading hold.

/// Decides when a heading error has settled
///
/// A tick counts toward settling when the error is inside the threshold,
/// when it changes sign (the heading crossed the target), or when it barely
/// moved since the previous tick. Ticks are counted cumulatively and never
/// reset.
#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    threshold: f64,
    required_ticks: u32,
    settled_ticks: u32,
    last_error: f64,
}

/// Error change per tick below which the heading is considered stationary
const STATIONARY_DELTA: f64 = 0.1;
/// Delta assumed on the first observation, large enough to not count as stationary
const INITIAL_DELTA: f64 = 5.0;

impl ConvergenceDetector {
    pub fn new(threshold: f64, required_ticks: u32) -> Self {
        Self {
            threshold,
            required_ticks,
            settled_ticks: 0,
            last_error: 0.0,
        }
    }

    /// Feed one tick's error. Returns the error once more than
    /// `required_ticks` ticks have counted.
    pub fn observe(&mut self, error: f64) -> Option<f64> {
        let delta = if self.last_error == 0.0 {
            INITIAL_DELTA
        } else {
            (self.last_error - error).abs()
        };

        let crossed = (error > 0.0 && self.last_error < 0.0) || (error < 0.0 && self.last_error > 0.0);
        if error.abs() < self.threshold || crossed || delta < STATIONARY_DELTA {
            self.settled_ticks += 1;
        }
        self.last_error = error;

        (self.settled_ticks > self.required_ticks).then_some(error)
    }

    pub fn settled_ticks(&self) -> u32 {
        self.settled_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_more_than_required_ticks() {
        let mut det = ConvergenceDetector::new(1.0, 7);
        for _ in 0..7 {
            assert_eq!(det.observe(0.5), None);
        }
        assert_eq!(det.observe(0.5), Some(0.5));
    }

    #[test]
    fn test_large_moving_error_never_settles() {
        let mut det = ConvergenceDetector::new(1.0, 7);
        let mut error = 90.0;
        for _ in 0..50 {
            assert_eq!(det.observe(error), None);
            error -= 1.0;
        }
    }

    #[test]
    fn test_sign_flip_counts() {
        let mut det = ConvergenceDetector::new(1.0, 1);
        assert_eq!(det.observe(30.0), None);
        assert_eq!(det.observe(-30.0), None);
        assert_eq!(det.settled_ticks(), 1);
        assert_eq!(det.observe(30.0), Some(30.0));
    }

    #[test]
    fn test_stationary_error_counts() {
        let mut det = ConvergenceDetector::new(1.0, 2);
        assert_eq!(det.observe(20.0), None);
        assert_eq!(det.observe(20.05), None);
        assert_eq!(det.observe(20.1), None);
        assert_eq!(det.observe(20.1), Some(20.1));
    }

    #[test]
    fn test_first_observation_is_not_stationary() {
        let mut det = ConvergenceDetector::new(1.0, 0);
        assert_eq!(det.observe(45.0), None);
    }
}
