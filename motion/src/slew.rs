//! Rate limiting for throttle and translation.

/// Moves a value toward its target by at most `max_delta_per_sec * dt` per update
#[derive(Debug, Clone)]
pub struct SlewLimiter {
    max_delta_per_sec: f64,
    /// Targets with magnitude below this are applied immediately
    snap_below: Option<f64>,
    current: f64,
}

impl SlewLimiter {
    pub fn new(max_delta_per_sec: f64) -> Self {
        Self {
            max_delta_per_sec,
            snap_below: None,
            current: 0.0,
        }
    }

    /// Jump straight to targets smaller than `threshold`, so stopping is never
    /// rate limited.
    pub fn with_snap_below(mut self, threshold: f64) -> Self {
        self.snap_below = Some(threshold);
        self
    }

    pub fn update(&mut self, target: f64, dt: f64) -> f64 {
        if self.snap_below.is_some_and(|t| target.abs() < t) {
            self.current = target;
            return self.current;
        }
        let max_step = self.max_delta_per_sec * dt.max(0.0);
        let delta = target - self.current;
        if delta.abs() <= max_step {
            self.current = target;
        } else {
            self.current += max_step.copysign(delta);
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
    }
}
