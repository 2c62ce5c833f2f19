//! Per-cell occupancy of the heightmap grid.

use serde::{Deserialize, Serialize};

use crate::grid::{DiscreteRect, Grid, GridRegion};
use crate::ids::{FeatureId, UnitId};

/// Who occupies a heightmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OccupiedCell {
    /// Nothing.
    #[default]
    None,
    /// A unit's footprint.
    Unit(UnitId),
    /// A blocking feature.
    Feature(FeatureId),
}

impl OccupiedCell {
    /// True if the cell is free.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        matches!(self, Self::None)
    }

    /// True if the cell is occupied by anything other than `unit`.
    #[must_use]
    pub fn blocks(self, unit: Option<UnitId>) -> bool {
        match self {
            Self::None => false,
            Self::Unit(id) => Some(id) != unit,
            Self::Feature(_) => true,
        }
    }
}

/// One occupant per cell, same dimensions as the heightmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    cells: Grid<OccupiedCell>,
}

impl OccupancyGrid {
    /// Empty grid.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: Grid::with_default(width, height),
        }
    }

    /// Underlying cell grid.
    #[must_use]
    pub fn cells(&self) -> &Grid<OccupiedCell> {
        &self.cells
    }

    /// The rectangle as an on-grid region, or `None` if any part is off-grid.
    #[must_use]
    pub fn try_to_region(&self, rect: &DiscreteRect) -> Option<GridRegion> {
        self.cells.try_to_region(rect)
    }

    /// Occupant of a cell, or `None` off-grid.
    #[must_use]
    pub fn try_get(&self, x: i32, y: i32) -> Option<OccupiedCell> {
        self.cells.try_get(crate::grid::Point::new(x, y)).copied()
    }

    /// True if any cell of `rect` blocks `unit`. Off-grid cells block.
    #[must_use]
    pub fn is_blocked(&self, rect: &DiscreteRect, unit: Option<UnitId>) -> bool {
        match self.cells.try_to_region(rect) {
            Some(region) => self.cells.any(region, |cell| cell.blocks(unit)),
            None => true,
        }
    }

    /// Mark every cell of the region.
    pub fn fill(&mut self, region: GridRegion, occupant: OccupiedCell) {
        self.cells.set_region(region, &occupant);
    }

    /// Set a single cell. Off-grid cells are ignored.
    pub fn set_cell(&mut self, x: i32, y: i32, occupant: OccupiedCell) {
        if let Some(coords) = self.cells.try_to_coords(crate::grid::Point::new(x, y)) {
            self.cells.set(coords.x, coords.y, occupant);
        }
    }

    /// Clear cells of the region that belong to `occupant`.
    pub fn release(&mut self, region: GridRegion, occupant: OccupiedCell) {
        self.cells.for_each_mut(region, |cell| {
            if *cell == occupant {
                *cell = OccupiedCell::None;
            }
        });
    }

    /// Move a unit's footprint from `old` to `new`.
    ///
    /// # Panics
    ///
    /// Panics if either rectangle leaves the grid.
    pub fn move_unit(&mut self, old: &DiscreteRect, new: &DiscreteRect, unit: UnitId) {
        let old_region = self
            .cells
            .try_to_region(old)
            .unwrap_or_else(|| panic!("old footprint {old:?} is off-grid"));
        let new_region = self
            .cells
            .try_to_region(new)
            .unwrap_or_else(|| panic!("new footprint {new:?} is off-grid"));
        self.release(old_region, OccupiedCell::Unit(unit));
        self.fill(new_region, OccupiedCell::Unit(unit));
    }

    /// Number of cells owned by `occupant`.
    #[must_use]
    pub fn count(&self, occupant: OccupiedCell) -> usize {
        self.cells
            .accumulate(self.cells.region(), 0, |n, cell| n + usize::from(*cell == occupant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_release() {
        let mut grid = OccupancyGrid::new(8, 8);
        let unit = UnitId::from_raw(0);
        let rect = DiscreteRect::new(1, 1, 2, 2);
        let region = grid.try_to_region(&rect).unwrap();
        grid.fill(region, OccupiedCell::Unit(unit));
        assert!(grid.is_blocked(&rect, None));
        assert!(!grid.is_blocked(&rect, Some(unit)));
        grid.release(region, OccupiedCell::Unit(unit));
        assert!(!grid.is_blocked(&rect, None));
    }

    #[test]
    fn test_off_grid_blocks() {
        let grid = OccupancyGrid::new(4, 4);
        assert!(grid.is_blocked(&DiscreteRect::new(3, 3, 2, 2), None));
    }

    #[test]
    fn test_move_unit_swaps_cells() {
        let mut grid = OccupancyGrid::new(8, 8);
        let unit = UnitId::from_raw(1 << 8);
        let old = DiscreteRect::new(0, 0, 2, 2);
        let new = DiscreteRect::new(1, 0, 2, 2);
        grid.fill(grid.try_to_region(&old).unwrap(), OccupiedCell::Unit(unit));
        grid.move_unit(&old, &new, unit);
        assert_eq!(grid.try_get(0, 0), Some(OccupiedCell::None));
        assert_eq!(grid.try_get(2, 1), Some(OccupiedCell::Unit(unit)));
        assert_eq!(grid.count(OccupiedCell::Unit(unit)), 4);
    }

    #[test]
    fn test_feature_always_blocks() {
        let mut grid = OccupancyGrid::new(4, 4);
        let feature = FeatureId::from_raw(0);
        grid.fill(GridRegion::new(0, 0, 1, 1), OccupiedCell::Feature(feature));
        assert!(grid.is_blocked(&DiscreteRect::new(0, 0, 1, 1), Some(UnitId::from_raw(0))));
    }
}
