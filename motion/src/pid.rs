//! PID law shared by both heading-hold loops.

use serde::{Deserialize, Serialize};

/// Gains and clamps for [`HeadingPid`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Symmetric clamp on the accumulated integral (anti-windup)
    pub max_integral: f64,
    /// Symmetric clamp on the derivative, suppresses spikes from tick jitter
    pub max_derivative: f64,
    /// Symmetric clamp on the output
    pub max_output: f64,
}

/// Terms from the most recent update, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub error: f64,
    pub integral: f64,
    pub derivative: f64,
    pub output: f64,
}

/// Discrete PID controller over a heading error
///
/// # Operation
/// 1. Compute the error through [`crate::Angle`] so it is shortest-path
/// 2. Call [`HeadingPid::update`] once per tick with the measured tick length
#[derive(Debug, Clone)]
pub struct HeadingPid {
    gains: PidGains,
    /// Integral is reset whenever |error| leaves this band
    integral_window: Option<f64>,
    integral: f64,
    last_error: f64,
    last: PidTerms,
}

impl HeadingPid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral_window: None,
            integral: 0.0,
            last_error: 0.0,
            last: PidTerms::default(),
        }
    }

    /// Only integrate while |error| < `window`; outside it the integral is
    /// cleared.
    pub fn with_integral_window(mut self, window: f64) -> Self {
        self.integral_window = Some(window);
        self
    }

    /// Advance one tick.
    ///
    /// # Arguments
    /// * `error` - Target minus estimate
    /// * `dt` - Seconds since the previous tick
    ///
    /// # Returns
    /// The clamped correction
    pub fn update(&mut self, error: f64, dt: f64) -> f64 {
        let g = &self.gains;

        let derivative = if dt > 0.0 {
            ((error - self.last_error) / dt).clamp(-g.max_derivative, g.max_derivative)
        } else {
            0.0
        };

        let inside_window = self.integral_window.map_or(true, |w| error.abs() < w);
        if inside_window {
            self.integral = (self.integral + error * dt).clamp(-g.max_integral, g.max_integral);
        } else {
            self.integral = 0.0;
        }

        let output = (g.kp * error + g.ki * self.integral + g.kd * derivative)
            .clamp(-g.max_output, g.max_output);

        self.last_error = error;
        self.last = PidTerms {
            error,
            integral: self.integral,
            derivative,
            output,
        };
        output
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_terms(&self) -> PidTerms {
        self.last
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last = PidTerms::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AbsoluteConfig, RelativeConfig};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gains() -> PidGains {
        PidGains {
            kp: 2.0,
            ki: 1.0,
            kd: 0.5,
            max_integral: 3.0,
            max_derivative: 10.0,
            max_output: 50.0,
        }
    }

    #[test]
    fn test_proportional_first_tick() {
        let mut pid = HeadingPid::new(PidGains {
            ki: 0.0,
            kd: 0.0,
            ..gains()
        });
        assert_relative_eq!(pid.update(4.0, 0.02), 8.0);
    }

    #[test]
    fn test_derivative_clamped() {
        let mut pid = HeadingPid::new(gains());
        pid.update(0.0, 0.01);
        pid.update(90.0, 0.01);
        assert_relative_eq!(pid.last_terms().derivative, 10.0);
    }

    #[test]
    fn test_zero_dt_has_no_derivative() {
        let mut pid = HeadingPid::new(gains());
        pid.update(5.0, 0.0);
        assert_eq!(pid.last_terms().derivative, 0.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_integral_anti_windup() {
        let mut pid = HeadingPid::new(gains());
        for _ in 0..100_000 {
            pid.update(17.0, 0.02);
            assert!(pid.integral().abs() <= 3.0);
        }
        assert_relative_eq!(pid.integral(), 3.0);

        for _ in 0..100_000 {
            pid.update(-17.0, 0.02);
        }
        assert_relative_eq!(pid.integral(), -3.0);
    }

    #[test]
    fn test_integral_window_resets() {
        let mut pid = HeadingPid::new(gains()).with_integral_window(5.0);
        pid.update(2.0, 0.5);
        assert_relative_eq!(pid.integral(), 1.0);
        pid.update(6.0, 0.5);
        assert_eq!(pid.integral(), 0.0);
        pid.update(-4.0, 0.5);
        assert_relative_eq!(pid.integral(), -2.0);
    }

    #[test]
    fn test_output_bounded_for_random_errors() {
        let mut rng = StdRng::seed_from_u64(7);
        for gains in [AbsoluteConfig::default().gains, RelativeConfig::default().gains] {
            let mut pid = HeadingPid::new(gains);
            for _ in 0..10_000 {
                let error = rng.gen_range(-1e6..1e6);
                let dt = rng.gen_range(0.0..0.1);
                let out = pid.update(error, dt);
                assert!(out.abs() <= gains.max_output, "{out}");
                assert!(pid.integral().abs() <= gains.max_integral);
            }
        }
    }

    #[test]
    fn test_reset() {
        let mut pid = HeadingPid::new(gains());
        pid.update(1.0, 1.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_terms(), PidTerms::default());
    }
}
