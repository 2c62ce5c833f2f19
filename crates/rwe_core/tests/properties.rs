//! Property tests for the deterministic math and grid primitives.

use proptest::prelude::*;
use rwe_core::grid::{DiscreteRect, Grid};
use rwe_core::math::{angle_between, SimAngle, SimScalar};
use rwe_test_utils::strategies::{arb_angle, arb_rect, arb_scalar};

proptest! {
    #[test]
    fn prop_addition_is_invertible(a in arb_scalar(), b in arb_scalar()) {
        prop_assert_eq!((a + b) - b, a);
    }

    #[test]
    fn prop_one_is_multiplicative_identity(a in arb_scalar()) {
        prop_assert_eq!(a * SimScalar::ONE, a);
        prop_assert_eq!(a / SimScalar::ONE, a);
    }

    #[test]
    fn prop_division_by_zero_saturates_by_sign(a in arb_scalar()) {
        let q = a / SimScalar::ZERO;
        if a.is_positive() {
            prop_assert_eq!(q, SimScalar::MAX);
        } else if a.is_negative() {
            prop_assert_eq!(q, SimScalar::MIN);
        } else {
            prop_assert_eq!(q, SimScalar::ZERO);
        }
    }

    #[test]
    fn prop_multiplication_wraps_at_32_bits(a in -30_000i32..30_000, b in -30_000i32..30_000) {
        let product = SimScalar::from_int(a) * SimScalar::from_int(b);
        prop_assert_eq!(product, SimScalar::from_bits(((i64::from(a) * i64::from(b)) << 16) as i32));
    }

    #[test]
    fn prop_sqrt_of_square_is_close(a in 0i32..=i32::MAX) {
        let value = SimScalar::from_bits(a);
        let root = value.squared().sqrt().saturate();
        prop_assert!((root - value).abs() <= SimScalar::from_bits(2), "{} vs {}", root, value);
    }

    #[test]
    fn prop_turn_towards_never_overshoots(from in arb_angle(), to in arb_angle(), step in 0u16..20_000) {
        let turned = from.turn_towards(to, SimAngle::new(step));
        let before = angle_between(from, to).unsigned_abs();
        let after = angle_between(turned, to).unsigned_abs();
        prop_assert!(after <= before);
        prop_assert!(angle_between(from, turned).unsigned_abs() <= step);
    }

    #[test]
    fn prop_clipped_region_stays_on_grid(rect in arb_rect()) {
        let grid: Grid<u8> = Grid::new(64, 64, 0);
        let region = grid.clip_region(&rect);
        prop_assert!(region.x + region.width <= 64);
        prop_assert!(region.y + region.height <= 64);
        if !region.is_empty() {
            let clipped = region.to_rect();
            prop_assert_eq!(rect.intersection(&clipped), Some(clipped));
        }
    }

    #[test]
    fn prop_on_grid_rects_round_trip(x in 0i32..60, y in 0i32..60, w in 1i32..5, h in 1i32..5) {
        let grid: Grid<u8> = Grid::new(64, 64, 0);
        let rect = DiscreteRect::new(x, y, w, h);
        let region = grid.try_to_region(&rect).expect("rect is on the grid");
        prop_assert_eq!(region.to_rect(), rect);
        prop_assert_eq!(grid.clip_region(&rect), region);
    }
}
