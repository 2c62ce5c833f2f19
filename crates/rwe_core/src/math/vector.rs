//! Three-component fixed-point vectors.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use super::angle::{atan2, SimAngle};
use super::scalar::{SimScalar, WideScalar};

/// A point or direction in world space. Y is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SimVector {
    /// X coordinate.
    pub x: SimScalar,
    /// Y coordinate (height).
    pub y: SimScalar,
    /// Z coordinate.
    pub z: SimScalar,
}

impl SimVector {
    /// The zero vector.
    pub const ZERO: Self = Self::new(SimScalar::ZERO, SimScalar::ZERO, SimScalar::ZERO);

    /// Create a vector from components.
    #[must_use]
    pub const fn new(x: SimScalar, y: SimScalar, z: SimScalar) -> Self {
        Self { x, y, z }
    }

    /// Create a vector from integer world units.
    #[must_use]
    pub const fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(
            SimScalar::from_int(x),
            SimScalar::from_int(y),
            SimScalar::from_int(z),
        )
    }

    /// Unit direction on the XZ plane for a heading.
    #[must_use]
    pub fn from_heading(heading: SimAngle) -> Self {
        Self::new(heading.sin(), SimScalar::ZERO, heading.cos())
    }

    /// Squared length, at full precision.
    #[must_use]
    pub fn length_squared(self) -> WideScalar {
        self.x.squared() + self.y.squared() + self.z.squared()
    }

    /// Length. Saturates past the scalar range.
    #[must_use]
    pub fn length(self) -> SimScalar {
        self.length_squared().sqrt().saturate()
    }

    /// Squared distance to another point, at full precision.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> WideScalar {
        (other - self).length_squared()
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> SimScalar {
        (other - self).length()
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> SimScalar {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in the same direction, or `default` for the zero vector.
    #[must_use]
    pub fn normalized_or(self, default: Self) -> Self {
        let length = self.length();
        if length == SimScalar::ZERO {
            return default;
        }
        Self::new(self.x / length, self.y / length, self.z / length)
    }

    /// Scale by a scalar.
    #[must_use]
    pub fn scaled(self, factor: SimScalar) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Copy with the Y component zeroed.
    #[must_use]
    pub fn xz(self) -> Self {
        Self::new(self.x, SimScalar::ZERO, self.z)
    }

    /// Heading of the XZ projection.
    #[must_use]
    pub fn heading(self) -> SimAngle {
        atan2(self.x, self.z)
    }
}

impl Add for SimVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for SimVector {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<SimScalar> for SimVector {
    type Output = Self;

    fn mul(self, rhs: SimScalar) -> Self {
        self.scaled(rhs)
    }
}

impl Neg for SimVector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for SimVector {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for SimVector {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
