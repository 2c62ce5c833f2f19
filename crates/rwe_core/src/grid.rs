//! Row-major 2-D grids and the rectangle primitives used for footprints.

use serde::{Deserialize, Serialize};

use crate::math::SimScalar;

/// A 2-D integer point that may lie outside any grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance.
    #[must_use]
    pub const fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Chebyshev distance.
    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Point offset by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// In-bounds coordinates of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GridCoordinates {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
}

impl GridCoordinates {
    /// Create coordinates.
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Coordinates as a signed point.
    #[must_use]
    pub const fn to_point(self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }
}

/// A rectangle of cells known to lie within a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridRegion {
    /// Left column.
    pub x: usize,
    /// Top row.
    pub y: usize,
    /// Width in cells.
    pub width: usize,
    /// Height in cells.
    pub height: usize,
}

impl GridRegion {
    /// Create a region.
    #[must_use]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True if the region covers no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the cell lies inside the region.
    #[must_use]
    pub const fn contains(&self, coords: GridCoordinates) -> bool {
        coords.x >= self.x
            && coords.y >= self.y
            && coords.x < self.x + self.width
            && coords.y < self.y + self.height
    }

    /// The region as a signed rectangle.
    #[must_use]
    pub fn to_rect(&self) -> DiscreteRect {
        DiscreteRect::new(
            self.x as i32,
            self.y as i32,
            self.width as i32,
            self.height as i32,
        )
    }
}

/// Minimum number of straight and diagonal steps between two cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OctileDistance {
    /// Straight steps.
    pub straight: u32,
    /// Diagonal steps.
    pub diagonal: u32,
}

impl OctileDistance {
    /// Path cost with straight steps costing 1 and diagonal steps sqrt(2).
    #[must_use]
    pub fn cost(self) -> SimScalar {
        SimScalar::from_int(self.straight as i32) + SimScalar::SQRT_2.mul_int(self.diagonal as i32)
    }
}

/// A rectangle of cells in signed coordinates. May lie partly off-grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DiscreteRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl DiscreteRect {
    /// Create a rectangle.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is negative.
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        assert!(width >= 0, "DiscreteRect width must not be negative");
        assert!(height >= 0, "DiscreteRect height must not be negative");
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle, or `None` if either dimension is negative.
    #[must_use]
    pub const fn try_new(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        if width < 0 || height < 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Left column.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Top row.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// One past the rightmost column.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the bottom row.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Top-left corner.
    #[must_use]
    pub const fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// True if the cell is inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// True if the cell touches the rectangle from outside, including corners.
    #[must_use]
    pub const fn is_adjacent_to(&self, x: i32, y: i32) -> bool {
        let in_ring_x = x >= self.x - 1 && x <= self.right();
        let in_ring_y = y >= self.y - 1 && y <= self.bottom();
        in_ring_x && in_ring_y && !self.contains(x, y)
    }

    /// Fewest straight and diagonal steps from a cell to any cell adjacent to
    /// the rectangle.
    ///
    /// Returns `(0, 0)` iff the cell is already adjacent.
    #[must_use]
    pub fn octile_distance_to_perimeter(&self, x: i32, y: i32) -> OctileDistance {
        if self.contains(x, y) {
            let dx = (x - (self.x - 1)).min(self.right() - x);
            let dy = (y - (self.y - 1)).min(self.bottom() - y);
            return OctileDistance {
                straight: dx.min(dy) as u32,
                diagonal: 0,
            };
        }
        let dx = if x < self.x - 1 {
            (self.x - 1) - x
        } else if x > self.right() {
            x - self.right()
        } else {
            0
        };
        let dy = if y < self.y - 1 {
            (self.y - 1) - y
        } else if y > self.bottom() {
            y - self.bottom()
        } else {
            0
        };
        let diagonal = dx.min(dy);
        OctileDistance {
            straight: (dx.max(dy) - diagonal) as u32,
            diagonal: diagonal as u32,
        }
    }

    /// Overlap of two rectangles, or `None` if they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }

    /// True if the rectangles share at least one cell.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Rectangle moved by `(dx, dy)`.
    #[must_use]
    pub const fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width,
            height: self.height,
        }
    }

    /// Rectangle grown leftwards by `dx` and upwards by `dy`.
    #[must_use]
    pub fn expand_top_left(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x - dx, self.y - dy, self.width + dx, self.height + dy)
    }
}

/// A width x height grid stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid with every cell set to `value`.
    #[must_use]
    pub fn new(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Set every cell of a region.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    pub fn set_region(&mut self, region: GridRegion, value: &T) {
        self.for_each_mut(region, |cell| *cell = value.clone());
    }
}

impl<T: Default + Clone> Grid<T> {
    /// Create a grid of default cells.
    #[must_use]
    pub fn with_default(width: usize, height: usize) -> Self {
        Self::new(width, height, T::default())
    }
}

impl<T> Grid<T> {
    /// Wrap row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != width * height`.
    #[must_use]
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height, "grid data length mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Row-major cell data.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        assert!(x < self.width && y < self.height, "grid access ({x}, {y}) out of bounds");
        y * self.width + x
    }

    /// Cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the cell is out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    /// Mutable cell at `(x, y)`.
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let index = self.index(x, y);
        &mut self.data[index]
    }

    /// Cell at the given coordinates.
    #[must_use]
    pub fn get_at(&self, coords: GridCoordinates) -> &T {
        self.get(coords.x, coords.y)
    }

    /// Replace the cell at `(x, y)`.
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Cell at `point`, or `None` off-grid.
    #[must_use]
    pub fn try_get(&self, point: Point) -> Option<&T> {
        self.try_to_coords(point).map(|c| self.get_at(c))
    }

    /// Coordinates of `point`, or `None` off-grid.
    #[must_use]
    pub fn try_to_coords(&self, point: Point) -> Option<GridCoordinates> {
        let x = usize::try_from(point.x).ok()?;
        let y = usize::try_from(point.y).ok()?;
        (x < self.width && y < self.height).then_some(GridCoordinates::new(x, y))
    }

    /// True if `point` lies on the grid.
    #[must_use]
    pub fn is_in_bounds(&self, point: Point) -> bool {
        self.try_to_coords(point).is_some()
    }

    /// Nearest on-grid coordinates to `point`.
    ///
    /// # Panics
    ///
    /// Panics on an empty grid.
    #[must_use]
    pub fn clamp_to_coords(&self, point: Point) -> GridCoordinates {
        assert!(self.width > 0 && self.height > 0, "cannot clamp into an empty grid");
        let x = point.x.clamp(0, self.width as i32 - 1) as usize;
        let y = point.y.clamp(0, self.height as i32 - 1) as usize;
        GridCoordinates::new(x, y)
    }

    /// The region covering the whole grid.
    #[must_use]
    pub const fn region(&self) -> GridRegion {
        GridRegion::new(0, 0, self.width, self.height)
    }

    /// The rectangle as a region, or `None` if any part of it is off-grid.
    #[must_use]
    pub fn try_to_region(&self, rect: &DiscreteRect) -> Option<GridRegion> {
        let x = usize::try_from(rect.x()).ok()?;
        let y = usize::try_from(rect.y()).ok()?;
        let width = rect.width() as usize;
        let height = rect.height() as usize;
        (x + width <= self.width && y + height <= self.height)
            .then_some(GridRegion::new(x, y, width, height))
    }

    /// The part of the rectangle that lies on the grid. May be empty.
    #[must_use]
    pub fn clip_region(&self, rect: &DiscreteRect) -> GridRegion {
        let bounds = self.region().to_rect();
        match rect.intersection(&bounds) {
            Some(r) => GridRegion::new(
                r.x() as usize,
                r.y() as usize,
                r.width() as usize,
                r.height() as usize,
            ),
            None => GridRegion::default(),
        }
    }

    fn assert_region(&self, region: GridRegion) {
        assert!(
            region.x + region.width <= self.width && region.y + region.height <= self.height,
            "region {region:?} leaves {}x{} grid",
            self.width,
            self.height
        );
    }

    /// Visit every cell of a region in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    pub fn for_each(&self, region: GridRegion, mut f: impl FnMut(GridCoordinates, &T)) {
        self.assert_region(region);
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                f(GridCoordinates::new(x, y), &self.data[y * self.width + x]);
            }
        }
    }

    /// Mutably visit every cell of a region.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    pub fn for_each_mut(&mut self, region: GridRegion, mut f: impl FnMut(&mut T)) {
        self.assert_region(region);
        for y in region.y..region.y + region.height {
            let row = y * self.width;
            for cell in &mut self.data[row + region.x..row + region.x + region.width] {
                f(cell);
            }
        }
    }

    /// True if any cell of the region satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    pub fn any(&self, region: GridRegion, mut predicate: impl FnMut(&T) -> bool) -> bool {
        self.assert_region(region);
        (region.y..region.y + region.height).any(|y| {
            let row = y * self.width;
            self.data[row + region.x..row + region.x + region.width]
                .iter()
                .any(&mut predicate)
        })
    }

    /// Fold every cell of the region in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    pub fn accumulate<A>(&self, region: GridRegion, init: A, mut f: impl FnMut(A, &T) -> A) -> A {
        self.assert_region(region);
        let mut acc = init;
        for y in region.y..region.y + region.height {
            let row = y * self.width;
            for cell in &self.data[row + region.x..row + region.x + region.width] {
                acc = f(acc, cell);
            }
        }
        acc
    }

    /// Copy of a region as a new grid.
    ///
    /// # Panics
    ///
    /// Panics if the region leaves the grid.
    #[must_use]
    pub fn get_region(&self, region: GridRegion) -> Self
    where
        T: Clone,
    {
        let mut data = Vec::with_capacity(region.width * region.height);
        self.for_each(region, |_, cell| data.push(cell.clone()));
        Self::from_vec(region.width, region.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_get_and_set() {
        let mut grid = Grid::new(4, 3, 0u8);
        grid.set(3, 2, 7);
        assert_eq!(*grid.get(3, 2), 7);
        assert_eq!(grid.try_get(Point::new(3, 2)), Some(&7));
        assert_eq!(grid.try_get(Point::new(4, 2)), None);
        assert_eq!(grid.try_get(Point::new(-1, 0)), None);
    }

    #[test]
    fn test_set_region_and_any() {
        let mut grid = Grid::new(5, 5, false);
        grid.set_region(GridRegion::new(1, 1, 2, 2), &true);
        assert!(grid.any(GridRegion::new(0, 0, 2, 2), |c| *c));
        assert!(!grid.any(GridRegion::new(3, 3, 2, 2), |c| *c));
        let count = grid.accumulate(grid.region(), 0, |n, c| n + usize::from(*c));
        assert_eq!(count, 4);
    }

    #[test]
    #[should_panic(expected = "leaves")]
    fn test_region_off_grid_panics() {
        let grid = Grid::new(2, 2, 0u8);
        let _ = grid.any(GridRegion::new(1, 1, 2, 2), |_| true);
    }

    #[test]
    fn test_try_to_region() {
        let grid = Grid::new(10, 10, 0u8);
        assert_eq!(
            grid.try_to_region(&DiscreteRect::new(8, 8, 2, 2)),
            Some(GridRegion::new(8, 8, 2, 2))
        );
        assert_eq!(grid.try_to_region(&DiscreteRect::new(9, 8, 2, 2)), None);
        assert_eq!(grid.try_to_region(&DiscreteRect::new(-1, 0, 2, 2)), None);
    }

    #[test]
    fn test_clamp_to_coords() {
        let grid = Grid::new(10, 5, 0u8);
        assert_eq!(grid.clamp_to_coords(Point::new(-4, 20)), GridCoordinates::new(0, 4));
    }

    #[test]
    #[should_panic(expected = "negative")]
    fn test_negative_rect_rejected() {
        let _ = DiscreteRect::new(0, 0, -1, 2);
    }

    #[test]
    fn test_adjacency() {
        let rect = DiscreteRect::new(2, 2, 2, 2);
        assert!(rect.is_adjacent_to(1, 1));
        assert!(rect.is_adjacent_to(4, 3));
        assert!(!rect.is_adjacent_to(2, 2));
        assert!(!rect.is_adjacent_to(5, 2));
    }

    #[test]
    fn test_octile_distance_to_perimeter() {
        let rect = DiscreteRect::new(10, 10, 2, 2);
        assert_eq!(
            rect.octile_distance_to_perimeter(9, 9),
            OctileDistance { straight: 0, diagonal: 0 }
        );
        assert_eq!(
            rect.octile_distance_to_perimeter(5, 7),
            OctileDistance { straight: 2, diagonal: 2 }
        );
        assert_eq!(
            rect.octile_distance_to_perimeter(10, 10),
            OctileDistance { straight: 1, diagonal: 0 }
        );
    }

    #[test]
    fn test_expand_top_left() {
        let rect = DiscreteRect::new(5, 5, 1, 1).expand_top_left(2, 1);
        assert_eq!(rect, DiscreteRect::new(3, 4, 3, 2));
    }

    proptest! {
        #[test]
        fn prop_clip_region_is_intersection(
            x in -20i32..20, y in -20i32..20, w in 0i32..30, h in 0i32..30
        ) {
            let grid = Grid::new(12, 9, 0u8);
            let rect = DiscreteRect::new(x, y, w, h);
            let clipped = grid.clip_region(&rect);
            let full = grid.region();
            prop_assert!(clipped.x + clipped.width <= full.width);
            prop_assert!(clipped.y + clipped.height <= full.height);
            match rect.intersection(&full.to_rect()) {
                Some(expected) => prop_assert_eq!(clipped.to_rect(), expected),
                None => prop_assert!(clipped.is_empty()),
            }
        }

        #[test]
        fn prop_adjacent_iff_zero_distance(px in -5i32..15, py in -5i32..15) {
            let rect = DiscreteRect::new(3, 4, 3, 2);
            let d = rect.octile_distance_to_perimeter(px, py);
            let zero = d.straight == 0 && d.diagonal == 0;
            prop_assert_eq!(zero, rect.is_adjacent_to(px, py));
        }
    }
}
