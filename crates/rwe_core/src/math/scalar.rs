//! 16.16 fixed-point scalar, plus a wide accumulator for squared quantities.

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use fixed::traits::{FromFixed, ToFixed};
use fixed::types::{I16F16, I48F16};
use serde::{Deserialize, Serialize};

/// Number of fractional bits in a [`SimScalar`].
pub const FRACTION_BITS: u32 = 16;

/// Deterministic fixed-point real used everywhere on the simulation path.
///
/// The value is a 32-bit signed integer with 16 fractional bits, so the
/// representable range is `[-32768, 32768)`. Every operation depends only on
/// the bit patterns of its operands:
///
/// - addition and subtraction wrap at 32 bits,
/// - multiplication is `(a * b) >> 16` computed in 64 bits, then truncated
///   to 32 bits,
/// - division is `(a << 16) / b` computed in 64 bits, truncating toward zero,
///   then truncated to 32 bits,
/// - division by zero saturates to [`SimScalar::MAX`] / [`SimScalar::MIN`]
///   by the sign of the numerator, and `0 / 0` is zero.
///
/// Squared distances across a map leave this range; they are computed as
/// [`WideScalar`] instead.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimScalar(i32);

impl SimScalar {
    /// Zero.
    pub const ZERO: Self = Self(0);
    /// One.
    pub const ONE: Self = Self(1 << FRACTION_BITS);
    /// One half.
    pub const HALF: Self = Self(1 << (FRACTION_BITS - 1));
    /// Two.
    pub const TWO: Self = Self(2 << FRACTION_BITS);
    /// Largest representable value.
    pub const MAX: Self = Self(i32::MAX);
    /// Smallest representable value.
    pub const MIN: Self = Self(i32::MIN);
    /// Smallest positive value.
    pub const EPSILON: Self = Self(1);
    /// sqrt(2), rounded to nearest.
    pub const SQRT_2: Self = Self(92_682);

    /// Build from the raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// Raw bit pattern.
    #[must_use]
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Build from an integer number of world units. Wraps outside
    /// `[-32768, 32767]`.
    #[must_use]
    pub const fn from_int(value: i32) -> Self {
        Self(value << FRACTION_BITS)
    }

    /// Build from a ratio of two integers, `numerator / denominator`.
    #[must_use]
    pub fn from_ratio(numerator: i32, denominator: i32) -> Self {
        if denominator == 0 {
            return saturate_by_sign(i64::from(numerator));
        }
        let wide = (i64::from(numerator) << FRACTION_BITS) / i64::from(denominator);
        Self(wide as i32)
    }

    /// Convert any number the `fixed` crate understands, rounding to nearest.
    ///
    /// Intended for table construction, data loading and tests. Floats must
    /// never be converted on the per-tick path.
    #[must_use]
    pub fn from_num<T: ToFixed>(value: T) -> Self {
        Self(I16F16::from_num(value).to_bits())
    }

    /// Convert to another numeric type for display purposes.
    #[must_use]
    pub fn to_num<T: FromFixed>(self) -> T {
        I16F16::from_bits(self.0).to_num()
    }

    /// Display conversion for renderers.
    #[must_use]
    pub fn to_f32(self) -> f32 {
        self.to_num()
    }

    /// Integer part, rounded toward negative infinity.
    #[must_use]
    pub const fn floor_to_int(self) -> i32 {
        self.0 >> FRACTION_BITS
    }

    /// Integer part, rounded toward zero.
    #[must_use]
    pub const fn trunc_to_int(self) -> i32 {
        self.0 / (1 << FRACTION_BITS)
    }

    /// Nearest integer, halves rounded up.
    #[must_use]
    pub const fn round_to_int(self) -> i32 {
        ((self.0 as i64 + (1 << (FRACTION_BITS - 1))) >> FRACTION_BITS) as i32
    }

    /// Absolute value (wrapping at `MIN`).
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.wrapping_abs())
    }

    /// -1, 0 or 1 as a scalar.
    #[must_use]
    pub const fn signum(self) -> Self {
        Self::from_int(self.0.signum())
    }

    /// True if strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True if strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Smaller of two values.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Ord::min(self, other)
    }

    /// Larger of two values.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Ord::max(self, other)
    }

    /// Clamp into `[low, high]`.
    #[must_use]
    pub fn clamp(self, low: Self, high: Self) -> Self {
        Ord::clamp(self, low, high)
    }

    /// Square root by the digit-by-digit method. Negative inputs yield zero.
    #[must_use]
    pub fn sqrt(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        // sqrt(v / 2^16) * 2^16 == sqrt(v * 2^16)
        let radicand = (self.0 as u64) << FRACTION_BITS;
        Self(isqrt(u128::from(radicand)) as i32)
    }

    /// Multiply by an integer without the fixed-point shift.
    #[must_use]
    pub const fn mul_int(self, value: i32) -> Self {
        Self(self.0.wrapping_mul(value))
    }

    /// Divide by an integer without the fixed-point shift.
    #[must_use]
    pub const fn div_int(self, value: i32) -> Self {
        if value == 0 {
            return saturate_by_sign(self.0 as i64);
        }
        Self(self.0.wrapping_div(value))
    }

    /// Full-precision product.
    #[must_use]
    pub const fn wide_mul(self, rhs: Self) -> WideScalar {
        WideScalar(((self.0 as i64) * (rhs.0 as i64)) >> FRACTION_BITS)
    }

    /// Full-precision square.
    #[must_use]
    pub const fn squared(self) -> WideScalar {
        self.wide_mul(self)
    }

    /// Widen without loss.
    #[must_use]
    pub const fn widen(self) -> WideScalar {
        WideScalar(self.0 as i64)
    }
}

const fn saturate_by_sign(numerator: i64) -> SimScalar {
    if numerator > 0 {
        SimScalar::MAX
    } else if numerator < 0 {
        SimScalar::MIN
    } else {
        SimScalar::ZERO
    }
}

/// Integer square root, rounded down.
fn isqrt(value: u128) -> u128 {
    let mut remainder = value;
    let mut result: u128 = 0;
    let mut bit: u128 = 1 << 126;
    while bit > remainder {
        bit >>= 2;
    }
    while bit != 0 {
        if remainder >= result + bit {
            remainder -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

impl Add for SimScalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for SimScalar {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for SimScalar {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.wide_mul(rhs).wrap()
    }
}

impl Div for SimScalar {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return saturate_by_sign(i64::from(self.0));
        }
        let wide = (i64::from(self.0) << FRACTION_BITS) / i64::from(rhs.0);
        Self(wide as i32)
    }
}

impl Neg for SimScalar {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl AddAssign for SimScalar {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for SimScalar {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for SimScalar {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for SimScalar {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl fmt::Debug for SimScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimScalar({})", I16F16::from_bits(self.0))
    }
}

impl fmt::Display for SimScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&I16F16::from_bits(self.0), f)
    }
}

/// Shorthand for [`SimScalar::from_int`].
#[must_use]
pub const fn sim_scalar(value: i32) -> SimScalar {
    SimScalar::from_int(value)
}

/// 48.16 intermediate for products that leave the [`SimScalar`] range:
/// squared lengths, range checks and the ballistic solver.
///
/// Never stored in simulation state. Same bit-exact rules as `SimScalar`
/// at 64 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WideScalar(i64);

impl WideScalar {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Build from the raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: i64) -> Self {
        Self(bits)
    }

    /// Raw bit pattern.
    #[must_use]
    pub const fn to_bits(self) -> i64 {
        self.0
    }

    /// True if strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply by an integer without the fixed-point shift.
    #[must_use]
    pub const fn mul_int(self, value: i64) -> Self {
        Self(self.0.wrapping_mul(value))
    }

    /// Square root, rounded down. Negative inputs yield zero.
    #[must_use]
    pub fn sqrt(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        Self(isqrt((self.0 as u128) << FRACTION_BITS) as i64)
    }

    /// Narrow to 32 bits, clamping to the `SimScalar` range.
    #[must_use]
    pub fn saturate(self) -> SimScalar {
        SimScalar(self.0.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
    }

    /// Narrow to 32 bits by truncation, as a 32-bit multiply would.
    #[must_use]
    pub const fn wrap(self) -> SimScalar {
        SimScalar(self.0 as i32)
    }
}

impl From<SimScalar> for WideScalar {
    fn from(value: SimScalar) -> Self {
        value.widen()
    }
}

impl Add for WideScalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for WideScalar {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for WideScalar {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self(((i128::from(self.0) * i128::from(rhs.0)) >> FRACTION_BITS) as i64)
    }
}

impl Div for WideScalar {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return match self.0.signum() {
                1 => Self(i64::MAX),
                -1 => Self(i64::MIN),
                _ => Self::ZERO,
            };
        }
        Self(((i128::from(self.0) << FRACTION_BITS) / i128::from(rhs.0)) as i64)
    }
}

impl fmt::Debug for WideScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WideScalar({})", I48F16::from_bits(self.0))
    }
}

impl fmt::Display for WideScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&I48F16::from_bits(self.0), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mul_is_shifted_product() {
        let a = SimScalar::from_int(3);
        let b = SimScalar::from_ratio(1, 2);
        assert_eq!(a * b, SimScalar::from_num(1.5));
        assert_eq!(SimScalar::from_int(-3) * b, SimScalar::from_num(-1.5));
    }

    #[test]
    fn test_mul_wraps_past_32768() {
        let a = SimScalar::from_int(256);
        let b = SimScalar::from_int(200);
        // 51200 does not fit in 16 integer bits.
        assert_eq!((a * b).to_bits(), (51_200i64 << 16) as i32);
        assert!((a * b).is_negative());
        assert_eq!(a.wide_mul(b), WideScalar::from_bits(51_200 << 16));
    }

    #[test]
    fn test_div_truncates_toward_zero() {
        let third = SimScalar::ONE / SimScalar::from_int(3);
        assert_eq!(third.to_bits(), 21_845);
        let neg_third = -SimScalar::ONE / SimScalar::from_int(3);
        assert_eq!(neg_third.to_bits(), -21_845);
    }

    #[test]
    fn test_div_by_zero_saturates() {
        assert_eq!(SimScalar::ONE / SimScalar::ZERO, SimScalar::MAX);
        assert_eq!(-SimScalar::ONE / SimScalar::ZERO, SimScalar::MIN);
        assert_eq!(SimScalar::ZERO / SimScalar::ZERO, SimScalar::ZERO);
    }

    #[test]
    fn test_sqrt_exact_squares() {
        assert_eq!(SimScalar::from_int(25).sqrt(), SimScalar::from_int(5));
        assert_eq!(SimScalar::from_int(16_384).sqrt(), SimScalar::from_int(128));
        assert_eq!(SimScalar::from_num(0.25).sqrt(), SimScalar::HALF);
        assert_eq!(SimScalar::from_int(-4).sqrt(), SimScalar::ZERO);
    }

    #[test]
    fn test_sqrt_2_constant() {
        let diff = SimScalar::TWO.sqrt() - SimScalar::SQRT_2;
        assert!(diff.abs() <= SimScalar::EPSILON);
    }

    #[test]
    fn test_rounding_helpers() {
        let v = SimScalar::from_num(-2.5);
        assert_eq!(v.floor_to_int(), -3);
        assert_eq!(v.trunc_to_int(), -2);
        assert_eq!(v.round_to_int(), -2);
        assert_eq!(SimScalar::from_num(2.5).round_to_int(), 3);
    }

    #[test]
    fn test_add_wraps() {
        let sum = SimScalar::MAX + SimScalar::EPSILON;
        assert_eq!(sum, SimScalar::MIN);
        assert_eq!(SimScalar::from_int(32_767) + SimScalar::ONE, SimScalar::from_int(-32_768));
    }

    #[test]
    fn test_wide_square_root_of_map_distance() {
        let d = SimScalar::from_int(3000);
        let squared = d.squared() + SimScalar::from_int(4000).squared();
        assert_eq!(squared.sqrt().saturate(), SimScalar::from_int(5000));
        assert_eq!(WideScalar::from_bits(i64::MAX).saturate(), SimScalar::MAX);
    }

    proptest! {
        #[test]
        fn prop_ops_depend_only_on_bits(a in any::<i32>(), b in any::<i32>()) {
            let (x, y) = (SimScalar::from_bits(a), SimScalar::from_bits(b));
            let (x2, y2) = (SimScalar::from_bits(a), SimScalar::from_bits(b));
            prop_assert_eq!(x + y, x2 + y2);
            prop_assert_eq!(x - y, x2 - y2);
            prop_assert_eq!(x * y, x2 * y2);
            prop_assert_eq!(x / y, x2 / y2);
            prop_assert_eq!(x.sqrt(), x2.sqrt());
        }

        #[test]
        fn prop_sqrt_is_floor_root(raw in 0i32..=i32::MAX) {
            let r = SimScalar::from_bits(raw).sqrt();
            let wide = i128::from(raw) << FRACTION_BITS;
            let rb = i128::from(r.to_bits());
            prop_assert!(rb * rb <= wide);
            prop_assert!((rb + 1) * (rb + 1) > wide);
        }

        #[test]
        fn prop_mul_matches_reference(a in any::<i32>(), b in any::<i32>()) {
            let expected = ((i64::from(a) * i64::from(b)) >> 16) as i32;
            prop_assert_eq!((SimScalar::from_bits(a) * SimScalar::from_bits(b)).to_bits(), expected);
        }

        #[test]
        fn prop_div_matches_reference(a in any::<i32>(), b in any::<i32>().prop_filter("nonzero", |b| *b != 0)) {
            let expected = ((i64::from(a) << 16) / i64::from(b)) as i32;
            prop_assert_eq!((SimScalar::from_bits(a) / SimScalar::from_bits(b)).to_bits(), expected);
        }
    }
}
