//! Signed heading arithmetic.
//!
//! Headings live in (-180, 180] degrees. Subtracting two raw headings goes
//! wrong by a multiple of 360 whenever a turn crosses the ±180 seam, so every
//! heading error in the controllers is computed through [`Angle`].

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Angle in degrees, always normalised to (-180, 180]
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    /// Normalise any finite value of degrees.
    ///
    /// Takes the truncated remainder by 360 and shifts it into range, so
    /// `from_float(-180.0)` is `180.0`.
    pub fn from_float(degrees: f64) -> Self {
        let d = degrees % 360.0;
        if d <= -180.0 {
            Angle(d + 360.0)
        } else if d > 180.0 {
            Angle(d - 360.0)
        } else {
            Angle(d)
        }
    }

    pub fn add(self, other: Angle) -> Angle {
        Angle::from_float(self.0 + other.0)
    }

    /// Shortest signed rotation from `other` to `self`.
    pub fn sub(self, other: Angle) -> Angle {
        Angle::from_float(self.0 - other.0)
    }

    pub fn add_float(self, degrees: f64) -> Angle {
        Angle::from_float(self.0 + degrees)
    }

    pub fn sub_float(self, degrees: f64) -> Angle {
        Angle::from_float(self.0 - degrees)
    }

    pub fn to_float(self) -> f64 {
        self.0
    }

    pub fn to_radians(self) -> f64 {
        self.0.to_radians()
    }
}

impl From<f64> for Angle {
    fn from(degrees: f64) -> Self {
        Angle::from_float(degrees)
    }
}

impl From<Angle> for f64 {
    fn from(angle: Angle) -> Self {
        angle.0
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle::add(self, rhs)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle::sub(self, rhs)
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle::from_float(-self.0)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(precision) = f.precision() {
            write!(f, "{:.*}°", precision, self.0)
        } else {
            write!(f, "{}°", self.0)
        }
    }
}
