//! Terrain walkability per movement class.
//!
//! Each movement class gets a `Grid<bool>` the size of the occupancy grid.
//! A cell is walkable when a footprint of the class with its top-left corner
//! on that cell lies entirely on terrain the class can cross. Dynamic
//! obstacles (units, features) are layered on top by the pathfinder and the
//! simulation; they are not part of this grid.

use tracing::debug;

use crate::data::{MovementClass, UnitDefinition};
use crate::grid::{DiscreteRect, Grid, Point};
use crate::math::SimScalar;
use crate::terrain::MapTerrain;

/// Build a class for a unit that names none, from the unit's own limits.
#[must_use]
pub fn ad_hoc_movement_class(definition: &UnitDefinition) -> MovementClass {
    MovementClass {
        name: String::new(),
        footprint_x: definition.footprint_x,
        footprint_z: definition.footprint_z,
        max_slope: definition.max_slope,
        max_water_slope: definition.max_water_slope,
        min_water_depth: definition.min_water_depth,
        max_water_depth: definition.max_water_depth,
    }
}

fn is_cell_passable(terrain: &MapTerrain, class: &MovementClass, x: usize, y: usize) -> bool {
    let slope = terrain.cell_slope(x, y);
    let depth = terrain.cell_water_depth(x, y);
    let min_depth = SimScalar::from_int(class.min_water_depth);
    let max_depth = SimScalar::from_int(class.max_water_depth);
    if depth < min_depth || depth > max_depth {
        return false;
    }
    if depth > SimScalar::ZERO {
        slope <= class.max_water_slope
    } else {
        slope <= class.max_slope
    }
}

/// Walkability grid for one class.
#[must_use]
pub fn compute_walkable_grid(terrain: &MapTerrain, class: &MovementClass) -> Grid<bool> {
    let heights = terrain.heights();
    let cells_x = heights.width() - 1;
    let cells_y = heights.height() - 1;
    let mut cell_ok = Grid::new(cells_x, cells_y, false);
    for y in 0..cells_y {
        for x in 0..cells_x {
            cell_ok.set(x, y, is_cell_passable(terrain, class, x, y));
        }
    }

    let mut walkable = Grid::new(heights.width(), heights.height(), false);
    for y in 0..heights.height() {
        for x in 0..heights.width() {
            let rect = DiscreteRect::new(x as i32, y as i32, class.footprint_x, class.footprint_z);
            let ok = cell_ok
                .try_to_region(&rect)
                .is_some_and(|region| !cell_ok.any(region, |c| !*c));
            walkable.set(x, y, ok);
        }
    }
    walkable
}

/// Walkability grids for every movement class in play.
#[derive(Debug, Clone, Default)]
pub struct MovementClassCollisionService {
    classes: Vec<(MovementClass, Grid<bool>)>,
}

impl MovementClassCollisionService {
    /// Empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute and store the grid for `class`, unless already present.
    pub fn register(&mut self, terrain: &MapTerrain, class: &MovementClass) {
        if self.grid(class).is_some() {
            return;
        }
        let grid = compute_walkable_grid(terrain, class);
        debug!(class = %class.name, width = grid.width(), height = grid.height(), "walkability grid computed");
        self.classes.push((class.clone(), grid));
    }

    /// Grid for `class`, if registered.
    #[must_use]
    pub fn grid(&self, class: &MovementClass) -> Option<&Grid<bool>> {
        self.classes.iter().find(|(c, _)| c == class).map(|(_, g)| g)
    }

    /// True if a footprint of `class` may stand with its top-left on `cell`.
    /// Unregistered classes and off-map cells are not walkable.
    #[must_use]
    pub fn is_walkable(&self, class: &MovementClass, cell: Point) -> bool {
        self.grid(class)
            .and_then(|g| g.try_get(cell))
            .copied()
            .unwrap_or(false)
    }
}
