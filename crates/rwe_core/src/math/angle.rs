//! 16-bit wraparound angles and table-driven trigonometry.
//!
//! A full turn is 2^16 angle units. Trigonometric results are looked up in
//! tables that are computed once from `f64` and never touched again as floats.

use std::f64::consts::TAU;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::scalar::SimScalar;

/// Number of entries in the full-circle sine table.
pub const SIN_TABLE_SIZE: usize = 16_384;

/// Angle units per sine-table step.
const TABLE_STEP_SHIFT: u32 = 2;

/// Number of table steps covering one eighth of a turn.
const EIGHTH_TURN_STEPS: usize = SIN_TABLE_SIZE / 8;

/// Number of table steps covering one quarter of a turn.
const QUARTER_TURN_STEPS: usize = SIN_TABLE_SIZE / 4;

/// An angle on the 16-bit circle.
///
/// Rotation `r` points along `(sin r, 0, cos r)` in world space, so zero faces
/// +Z and a quarter turn faces +X. Arithmetic wraps modulo one full turn and
/// comparisons treat the value as unsigned.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimAngle(u16);

impl SimAngle {
    /// Zero angle.
    pub const ZERO: Self = Self(0);
    /// Half of a full turn.
    pub const HALF_TURN: Self = Self(32_768);
    /// Quarter of a full turn.
    pub const QUARTER_TURN: Self = Self(16_384);
    /// Eighth of a full turn.
    pub const EIGHTH_TURN: Self = Self(8_192);

    /// Wrap a raw angle value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Wrap a signed angle value onto the circle.
    #[must_use]
    pub const fn from_signed(value: i32) -> Self {
        Self(value as u16)
    }

    /// Raw angle value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Angle as a signed value in `[-HALF_TURN, HALF_TURN)`.
    #[must_use]
    pub const fn signed(self) -> i16 {
        self.0 as i16
    }

    /// Build from degrees. Only for data loading and tests.
    #[must_use]
    pub fn from_degrees(degrees: f64) -> Self {
        let units = (degrees * 65_536.0 / 360.0).round() as i64;
        Self(units as u16)
    }

    /// Angle in degrees, for display.
    #[must_use]
    pub fn to_degrees(self) -> f32 {
        f32::from(self.0) * 360.0 / 65_536.0
    }

    /// Sine of the angle.
    #[must_use]
    pub fn sin(self) -> SimScalar {
        sin_table()[(self.0 >> TABLE_STEP_SHIFT) as usize]
    }

    /// Cosine of the angle.
    #[must_use]
    pub fn cos(self) -> SimScalar {
        (self + Self::QUARTER_TURN).sin()
    }

    /// Tangent of the angle. Saturates at the quarter turns.
    #[must_use]
    pub fn tan(self) -> SimScalar {
        self.sin() / self.cos()
    }

    /// Rotate toward `target` by at most `max_step` along the shortest arc.
    #[must_use]
    pub fn turn_towards(self, target: Self, max_step: Self) -> Self {
        let delta = i32::from(angle_between(self, target));
        let limit = i32::from(max_step.0).min(i32::from(i16::MAX));
        self + Self::from_signed(delta.clamp(-limit, limit))
    }
}

/// Signed shortest-arc difference `b - a` in `[-HALF_TURN, HALF_TURN)`.
#[must_use]
pub const fn angle_between(a: SimAngle, b: SimAngle) -> i16 {
    b.0.wrapping_sub(a.0) as i16
}

/// Angle whose sine is proportional to `y` and cosine to `x`.
///
/// Returns zero for the zero vector.
#[must_use]
pub fn atan2(y: SimScalar, x: SimScalar) -> SimAngle {
    if y == SimScalar::ZERO && x == SimScalar::ZERO {
        return SimAngle::ZERO;
    }
    let abs_y = y.abs();
    let abs_x = x.abs();

    // Reduce to the first octant: ratio in [0, 1].
    let (ratio, steep) = if abs_y > abs_x {
        (abs_x / abs_y, true)
    } else {
        (abs_y / abs_x, false)
    };
    let mut units = first_octant_atan(ratio) as i32;
    if steep {
        units = i32::from(SimAngle::QUARTER_TURN.0) - units;
    }
    if x.is_negative() {
        units = i32::from(SimAngle::HALF_TURN.0) - units;
    }
    if y.is_negative() {
        units = -units;
    }
    SimAngle::from_signed(units)
}

/// Arctangent of `value`, in `(-QUARTER_TURN, QUARTER_TURN)`.
#[must_use]
pub fn atan(value: SimScalar) -> SimAngle {
    atan2(value, SimScalar::ONE)
}

/// Arcsine of `value`, clamped to `[-1, 1]` first.
#[must_use]
pub fn asin(value: SimScalar) -> SimAngle {
    let clamped = value.clamp(-SimScalar::ONE, SimScalar::ONE);
    let table = sin_table();
    let target = clamped.abs();
    // Largest step in the first quadrant whose sine does not exceed the target.
    let index = table[..=QUARTER_TURN_STEPS].partition_point(|s| *s <= target);
    let units = (index.saturating_sub(1) << TABLE_STEP_SHIFT) as i32;
    if clamped.is_negative() {
        SimAngle::from_signed(-units)
    } else {
        SimAngle::from_signed(units)
    }
}

fn first_octant_atan(ratio: SimScalar) -> u16 {
    let table = tan_table();
    let index = table.partition_point(|t| *t <= ratio);
    (index.saturating_sub(1) << TABLE_STEP_SHIFT) as u16
}

fn sin_table() -> &'static [SimScalar] {
    static TABLE: OnceLock<Vec<SimScalar>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..SIN_TABLE_SIZE)
            .map(|i| {
                let radians = TAU * (i as f64) / (SIN_TABLE_SIZE as f64);
                SimScalar::from_num(radians.sin())
            })
            .collect()
    })
}

/// Tangents of the first octant, derived from the sine table.
fn tan_table() -> &'static [SimScalar] {
    static TABLE: OnceLock<Vec<SimScalar>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let sines = sin_table();
        (0..=EIGHTH_TURN_STEPS)
            .map(|i| sines[i] / sines[i + QUARTER_TURN_STEPS])
            .collect()
    })
}

impl Add for SimAngle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for SimAngle {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for SimAngle {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl AddAssign for SimAngle {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for SimAngle {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Debug for SimAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimAngle({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: SimScalar, b: SimScalar, tolerance_bits: i32) -> bool {
        (a - b).abs().to_bits() <= tolerance_bits
    }

    #[test]
    fn test_cardinal_sines() {
        assert_eq!(SimAngle::ZERO.sin(), SimScalar::ZERO);
        assert_eq!(SimAngle::QUARTER_TURN.sin(), SimScalar::ONE);
        assert_eq!(SimAngle::HALF_TURN.cos(), -SimScalar::ONE);
        assert_eq!(SimAngle::ZERO.cos(), SimScalar::ONE);
    }

    #[test]
    fn test_angle_between_wraps() {
        let a = SimAngle::new(65_000);
        let b = SimAngle::new(100);
        assert_eq!(angle_between(a, b), 636);
        assert_eq!(angle_between(b, a), -636);
        assert_eq!(angle_between(SimAngle::ZERO, SimAngle::HALF_TURN), i16::MIN);
    }

    #[test]
    fn test_atan2_axes() {
        let one = SimScalar::ONE;
        let zero = SimScalar::ZERO;
        assert_eq!(atan2(zero, one), SimAngle::ZERO);
        assert_eq!(atan2(one, zero), SimAngle::QUARTER_TURN);
        assert_eq!(atan2(zero, -one), SimAngle::HALF_TURN);
        assert_eq!(atan2(-one, zero), -SimAngle::QUARTER_TURN);
        assert_eq!(atan2(one, one), SimAngle::EIGHTH_TURN);
    }

    #[test]
    fn test_heading_convention() {
        // Facing +X is a quarter turn: sin carries x, cos carries z.
        let heading = atan2(SimScalar::from_int(10), SimScalar::ZERO);
        assert_eq!(heading, SimAngle::QUARTER_TURN);
        assert_eq!(heading.sin(), SimScalar::ONE);
    }

    #[test]
    fn test_asin_and_atan() {
        assert_eq!(asin(SimScalar::ONE), SimAngle::QUARTER_TURN);
        assert_eq!(asin(SimScalar::ZERO), SimAngle::ZERO);
        assert_eq!(atan(SimScalar::ONE), SimAngle::EIGHTH_TURN);
        assert_eq!(asin(-SimScalar::ONE), -SimAngle::QUARTER_TURN);
    }

    #[test]
    fn test_turn_towards_is_limited() {
        let from = SimAngle::ZERO;
        let to = SimAngle::QUARTER_TURN;
        assert_eq!(from.turn_towards(to, SimAngle::new(100)), SimAngle::new(100));
        assert_eq!(from.turn_towards(to, SimAngle::new(20_000)), to);
        assert_eq!(
            from.turn_towards(-to, SimAngle::new(100)),
            SimAngle::from_signed(-100)
        );
    }

    proptest! {
        #[test]
        fn prop_atan2_inverts_sin_cos(raw in any::<u16>()) {
            let angle = SimAngle::new(raw & !3);
            let recovered = atan2(angle.sin(), angle.cos());
            let error = i32::from(angle_between(angle, recovered)).abs();
            prop_assert!(error <= 8, "angle {raw} recovered as {:?}", recovered);
        }

        #[test]
        fn prop_unit_circle(raw in any::<u16>()) {
            let angle = SimAngle::new(raw);
            let s = angle.sin();
            let c = angle.cos();
            prop_assert!(close(s * s + c * c, SimScalar::ONE, 8));
        }

        #[test]
        fn prop_angle_between_round_trips(a in any::<u16>(), b in any::<u16>()) {
            let a = SimAngle::new(a);
            let b = SimAngle::new(b);
            let delta = angle_between(a, b);
            prop_assert_eq!(a + SimAngle::from_signed(i32::from(delta)), b);
        }
    }
}
