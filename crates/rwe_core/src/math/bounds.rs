//! Axis-aligned boxes for selection and hit tests.

use serde::{Deserialize, Serialize};

use super::{SimScalar, SimVector};

/// An axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SimBox {
    /// Minimum corner.
    pub min: SimVector,
    /// Maximum corner.
    pub max: SimVector,
}

impl SimBox {
    /// Box from two corners.
    #[must_use]
    pub const fn new(min: SimVector, max: SimVector) -> Self {
        Self { min, max }
    }

    /// Box moved by `offset`.
    #[must_use]
    pub fn translated(self, offset: SimVector) -> Self {
        Self::new(self.min + offset, self.max + offset)
    }

    /// True if the point lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: SimVector) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Parameter in `[0, 1]` of the first point of the segment inside the
    /// box, or `None` if the segment misses it.
    #[must_use]
    pub fn intersect_segment(&self, start: SimVector, end: SimVector) -> Option<SimScalar> {
        let direction = end - start;
        let mut t_enter = SimScalar::ZERO;
        let mut t_exit = SimScalar::ONE;
        let axes = [
            (start.x, direction.x, self.min.x, self.max.x),
            (start.y, direction.y, self.min.y, self.max.y),
            (start.z, direction.z, self.min.z, self.max.z),
        ];
        for (origin, delta, low, high) in axes {
            if delta == SimScalar::ZERO {
                if origin < low || origin > high {
                    return None;
                }
                continue;
            }
            let mut t1 = (low - origin) / delta;
            let mut t2 = (high - origin) / delta;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_enter = t_enter.max(t1);
            t_exit = t_exit.min(t2);
            if t_enter > t_exit {
                return None;
            }
        }
        Some(t_enter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> SimBox {
        SimBox::new(SimVector::from_ints(-1, 0, -1), SimVector::from_ints(1, 2, 1))
    }

    #[test]
    fn test_segment_through_box() {
        let t = unit_box()
            .intersect_segment(SimVector::from_ints(-5, 1, 0), SimVector::from_ints(5, 1, 0))
            .unwrap();
        assert_eq!(t, SimScalar::from_ratio(4, 10));
    }

    #[test]
    fn test_segment_missing_box() {
        assert!(unit_box()
            .intersect_segment(SimVector::from_ints(-5, 5, 0), SimVector::from_ints(5, 5, 0))
            .is_none());
        assert!(unit_box()
            .intersect_segment(SimVector::from_ints(-5, 1, 0), SimVector::from_ints(-3, 1, 0))
            .is_none());
    }

    #[test]
    fn test_segment_starting_inside() {
        let t = unit_box().intersect_segment(SimVector::from_ints(0, 1, 0), SimVector::from_ints(9, 1, 0));
        assert_eq!(t, Some(SimScalar::ZERO));
        assert!(unit_box().translated(SimVector::from_ints(10, 0, 0)).contains(SimVector::from_ints(10, 1, 0)));
    }
}
