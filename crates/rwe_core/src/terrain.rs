//! Heightmap terrain: coordinate conversion, height sampling and line tests.
//!
//! The heightmap stores one height per tile corner. A tile is 16x16 world
//! units and the world origin sits at the centre of the heightmap. Each tile
//! is split into two triangles; the split diagonal alternates in a
//! checkerboard so that neighbouring tiles share edges consistently.

use serde::{Deserialize, Serialize};

use crate::grid::{DiscreteRect, Grid, Point};
use crate::math::{SimScalar, SimVector};

/// Width of one heightmap tile in world units.
pub const HEIGHT_TILE_WIDTH_IN_WORLD_UNITS: i32 = 16;
/// Height (Z extent) of one heightmap tile in world units.
pub const HEIGHT_TILE_HEIGHT_IN_WORLD_UNITS: i32 = 16;

const TILE_WIDTH: SimScalar = SimScalar::from_int(HEIGHT_TILE_WIDTH_IN_WORLD_UNITS);
const TILE_HEIGHT: SimScalar = SimScalar::from_int(HEIGHT_TILE_HEIGHT_IN_WORLD_UNITS);

/// A directed line segment in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line3x {
    /// Start point.
    pub start: SimVector,
    /// End point.
    pub end: SimVector,
}

impl Line3x {
    /// Create a segment.
    #[must_use]
    pub const fn new(start: SimVector, end: SimVector) -> Self {
        Self { start, end }
    }

    /// Direction from start to end, unnormalized.
    #[must_use]
    pub fn direction(&self) -> SimVector {
        self.end - self.start
    }

    /// Point at parameter `t`, where 0 is the start and 1 the end.
    #[must_use]
    pub fn point_at(&self, t: SimScalar) -> SimVector {
        self.start + self.direction() * t
    }
}

/// Terrain heights plus sea level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTerrain {
    heights: Grid<u8>,
    sea_level: SimScalar,
}

/// Height of a tile as a plane `base + du * u + dv * v` over local `u, v`
/// in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
struct TrianglePlane {
    base: SimScalar,
    du: SimScalar,
    dv: SimScalar,
}

impl TrianglePlane {
    fn height(&self, u: SimScalar, v: SimScalar) -> SimScalar {
        self.base + self.du * u + self.dv * v
    }
}

/// Which half of a tile a local coordinate falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileHalf {
    First,
    Second,
}

impl MapTerrain {
    /// Create terrain from corner heights.
    ///
    /// # Panics
    ///
    /// Panics if the heightmap is smaller than 2x2.
    #[must_use]
    pub fn new(heights: Grid<u8>, sea_level: SimScalar) -> Self {
        assert!(
            heights.width() >= 2 && heights.height() >= 2,
            "heightmap must have at least one tile"
        );
        Self { heights, sea_level }
    }

    /// Flat terrain of `width x height` corners at the given height.
    #[must_use]
    pub fn flat(width: usize, height: usize, ground: u8, sea_level: SimScalar) -> Self {
        Self::new(Grid::new(width, height, ground), sea_level)
    }

    /// The heightmap.
    #[must_use]
    pub fn heights(&self) -> &Grid<u8> {
        &self.heights
    }

    /// Sea level in world units.
    #[must_use]
    pub fn sea_level(&self) -> SimScalar {
        self.sea_level
    }

    /// Width of the map in world units.
    #[must_use]
    pub fn width_in_world_units(&self) -> SimScalar {
        TILE_WIDTH.mul_int((self.heights.width() - 1) as i32)
    }

    /// Height (Z extent) of the map in world units.
    #[must_use]
    pub fn height_in_world_units(&self) -> SimScalar {
        TILE_HEIGHT.mul_int((self.heights.height() - 1) as i32)
    }

    /// World X of the left map edge.
    #[must_use]
    pub fn left_in_world_units(&self) -> SimScalar {
        -(self.width_in_world_units().div_int(2))
    }

    /// World Z of the top map edge.
    #[must_use]
    pub fn top_in_world_units(&self) -> SimScalar {
        -(self.height_in_world_units().div_int(2))
    }

    /// Heightmap cell containing a world position.
    #[must_use]
    pub fn world_to_heightmap_coordinate(&self, position: SimVector) -> Point {
        Point::new(
            ((position.x - self.left_in_world_units()) / TILE_WIDTH).floor_to_int(),
            ((position.z - self.top_in_world_units()) / TILE_HEIGHT).floor_to_int(),
        )
    }

    /// Heightmap corner nearest to a world position.
    #[must_use]
    pub fn world_to_heightmap_coordinate_nearest(&self, position: SimVector) -> Point {
        Point::new(
            ((position.x - self.left_in_world_units()) / TILE_WIDTH).round_to_int(),
            ((position.z - self.top_in_world_units()) / TILE_HEIGHT).round_to_int(),
        )
    }

    /// World position of a heightmap corner, at height zero.
    #[must_use]
    pub fn heightmap_to_world_space(&self, point: Point) -> SimVector {
        SimVector::new(
            self.left_in_world_units() + TILE_WIDTH.mul_int(point.x),
            SimScalar::ZERO,
            self.top_in_world_units() + TILE_HEIGHT.mul_int(point.y),
        )
    }

    /// World position of the centre of a heightmap cell, on the ground.
    #[must_use]
    pub fn heightmap_index_to_world_center(&self, point: Point) -> SimVector {
        let corner = self.heightmap_to_world_space(point);
        let x = corner.x + TILE_WIDTH.div_int(2);
        let z = corner.z + TILE_HEIGHT.div_int(2);
        SimVector::new(x, self.height_at(x, z), z)
    }

    /// Footprint rectangle of an object centred at `position`.
    #[must_use]
    pub fn footprint_rect(&self, position: SimVector, footprint_x: i32, footprint_z: i32) -> DiscreteRect {
        let half = SimVector::new(
            TILE_WIDTH.mul_int(footprint_x).div_int(2),
            SimScalar::ZERO,
            TILE_HEIGHT.mul_int(footprint_z).div_int(2),
        );
        let top_left = self.world_to_heightmap_coordinate_nearest(position - half);
        DiscreteRect::new(top_left.x, top_left.y, footprint_x, footprint_z)
    }

    /// World position at the centre of a footprint whose top-left cell is
    /// `top_left`.
    #[must_use]
    pub fn footprint_center(&self, top_left: Point, footprint_x: i32, footprint_z: i32) -> SimVector {
        let corner = self.heightmap_to_world_space(top_left);
        let x = corner.x + TILE_WIDTH.mul_int(footprint_x).div_int(2);
        let z = corner.z + TILE_HEIGHT.mul_int(footprint_z).div_int(2);
        SimVector::new(x, self.height_at(x, z), z)
    }

    /// Raw corner height.
    #[must_use]
    pub fn corner_height(&self, x: usize, y: usize) -> SimScalar {
        SimScalar::from_int(i32::from(*self.heights.get(x, y)))
    }

    /// Steepest height difference between the corners of a cell.
    #[must_use]
    pub fn cell_slope(&self, x: usize, y: usize) -> u8 {
        let x1 = (x + 1).min(self.heights.width() - 1);
        let y1 = (y + 1).min(self.heights.height() - 1);
        let corners = [
            *self.heights.get(x, y),
            *self.heights.get(x1, y),
            *self.heights.get(x, y1),
            *self.heights.get(x1, y1),
        ];
        let max = corners.iter().copied().max().unwrap_or(0);
        let min = corners.iter().copied().min().unwrap_or(0);
        max - min
    }

    /// Depth of water over the lowest corner of a cell; zero on dry land.
    #[must_use]
    pub fn cell_water_depth(&self, x: usize, y: usize) -> SimScalar {
        let x1 = (x + 1).min(self.heights.width() - 1);
        let y1 = (y + 1).min(self.heights.height() - 1);
        let lowest = [
            *self.heights.get(x, y),
            *self.heights.get(x1, y),
            *self.heights.get(x, y1),
            *self.heights.get(x1, y1),
        ]
        .into_iter()
        .min()
        .unwrap_or(0);
        (self.sea_level - SimScalar::from_int(i32::from(lowest))).max(SimScalar::ZERO)
    }

    /// True if the terrain at this XZ position is below sea level.
    #[must_use]
    pub fn is_under_water(&self, x: SimScalar, z: SimScalar) -> bool {
        self.height_at(x, z) < self.sea_level
    }

    fn cell_count_x(&self) -> i32 {
        self.heights.width() as i32 - 1
    }

    fn cell_count_y(&self) -> i32 {
        self.heights.height() as i32 - 1
    }

    fn split_for(cell_x: i32, cell_y: i32) -> bool {
        (cell_x + cell_y) % 2 == 0
    }

    fn half_for(cell_x: i32, cell_y: i32, u: SimScalar, v: SimScalar) -> TileHalf {
        if Self::split_for(cell_x, cell_y) {
            if u >= v {
                TileHalf::First
            } else {
                TileHalf::Second
            }
        } else if u + v <= SimScalar::ONE {
            TileHalf::First
        } else {
            TileHalf::Second
        }
    }

    fn in_half(cell_x: i32, cell_y: i32, half: TileHalf, u: SimScalar, v: SimScalar) -> bool {
        let inside_tile =
            u >= SimScalar::ZERO && v >= SimScalar::ZERO && u <= SimScalar::ONE && v <= SimScalar::ONE;
        if !inside_tile {
            return false;
        }
        // Edges are inclusive on both halves so a shared edge is never missed.
        match (Self::split_for(cell_x, cell_y), half) {
            (true, TileHalf::First) => u >= v,
            (true, TileHalf::Second) => u <= v,
            (false, TileHalf::First) => u + v <= SimScalar::ONE,
            (false, TileHalf::Second) => u + v >= SimScalar::ONE,
        }
    }

    fn plane(&self, cell_x: i32, cell_y: i32, half: TileHalf) -> TrianglePlane {
        let (x, y) = (cell_x as usize, cell_y as usize);
        let h00 = self.corner_height(x, y);
        let h10 = self.corner_height(x + 1, y);
        let h01 = self.corner_height(x, y + 1);
        let h11 = self.corner_height(x + 1, y + 1);
        match (Self::split_for(cell_x, cell_y), half) {
            (true, TileHalf::First) => TrianglePlane {
                base: h00,
                du: h10 - h00,
                dv: h11 - h10,
            },
            (true, TileHalf::Second) => TrianglePlane {
                base: h00,
                du: h11 - h01,
                dv: h01 - h00,
            },
            (false, TileHalf::First) => TrianglePlane {
                base: h00,
                du: h10 - h00,
                dv: h01 - h00,
            },
            (false, TileHalf::Second) => TrianglePlane {
                base: h01 + h10 - h11,
                du: h11 - h01,
                dv: h11 - h10,
            },
        }
    }

    fn local_coordinates(&self, cell_x: i32, cell_y: i32, x: SimScalar, z: SimScalar) -> (SimScalar, SimScalar) {
        let left = self.left_in_world_units() + TILE_WIDTH.mul_int(cell_x);
        let top = self.top_in_world_units() + TILE_HEIGHT.mul_int(cell_y);
        ((x - left) / TILE_WIDTH, (z - top) / TILE_HEIGHT)
    }

    /// Terrain height at a world XZ position. Positions off the map are
    /// clamped onto the nearest edge tile.
    #[must_use]
    pub fn height_at(&self, x: SimScalar, z: SimScalar) -> SimScalar {
        let cell = self.world_to_heightmap_coordinate(SimVector::new(x, SimScalar::ZERO, z));
        let cell_x = cell.x.clamp(0, self.cell_count_x() - 1);
        let cell_y = cell.y.clamp(0, self.cell_count_y() - 1);
        let (u, v) = self.local_coordinates(cell_x, cell_y, x, z);
        let u = u.clamp(SimScalar::ZERO, SimScalar::ONE);
        let v = v.clamp(SimScalar::ZERO, SimScalar::ONE);
        let half = Self::half_for(cell_x, cell_y, u, v);
        self.plane(cell_x, cell_y, half).height(u, v)
    }

    /// Parameter of the intersection of `line` with one triangle of a cell.
    fn intersect_triangle(&self, line: &Line3x, cell_x: i32, cell_y: i32, half: TileHalf) -> Option<SimScalar> {
        let plane = self.plane(cell_x, cell_y, half);
        let d = line.direction();
        let (u0, v0) = self.local_coordinates(cell_x, cell_y, line.start.x, line.start.z);
        let du = d.x / TILE_WIDTH;
        let dv = d.z / TILE_HEIGHT;

        // start.y + t*d.y == base + du'*(u0 + t*du) + dv'*(v0 + t*dv)
        let denominator = d.y - plane.du * du - plane.dv * dv;
        if denominator == SimScalar::ZERO {
            return None;
        }
        let numerator = plane.height(u0, v0) - line.start.y;
        let t = numerator / denominator;
        if t < SimScalar::ZERO || t > SimScalar::ONE {
            return None;
        }
        let u = u0 + du * t;
        let v = v0 + dv * t;
        Self::in_half(cell_x, cell_y, half, u, v).then_some(t)
    }

    /// Earliest parameter at which the line meets any triangle of a cell.
    fn intersect_cell(&self, line: &Line3x, cell_x: i32, cell_y: i32) -> Option<SimScalar> {
        if cell_x < 0 || cell_y < 0 || cell_x >= self.cell_count_x() || cell_y >= self.cell_count_y() {
            return None;
        }
        [TileHalf::First, TileHalf::Second]
            .into_iter()
            .filter_map(|half| self.intersect_triangle(line, cell_x, cell_y, half))
            .min()
    }

    /// First point where a segment meets the terrain surface.
    ///
    /// Cells are visited in the order the segment crosses them. At each step
    /// the current cell and its neighbours towards the direction of travel
    /// are all tested, so a segment passing exactly through a tile corner
    /// still finds its hit.
    #[must_use]
    pub fn intersect_line(&self, line: &Line3x) -> Option<SimVector> {
        let d = line.direction();
        let step_x = if d.x.is_negative() { -1 } else { 1 };
        let step_y = if d.z.is_negative() { -1 } else { 1 };

        // Sample at most half a tile apart so no crossed cell is skipped.
        let span = d.x.abs().max(d.z.abs());
        let samples = (span / TILE_WIDTH.div_int(2)).floor_to_int().max(0) + 1;

        let mut previous: Option<Point> = None;
        for i in 0..=samples {
            let t = SimScalar::from_ratio(i, samples);
            let cell = self.world_to_heightmap_coordinate(line.point_at(t));
            if previous == Some(cell) {
                continue;
            }
            previous = Some(cell);

            let candidates = [
                cell,
                cell.offset(step_x, 0),
                cell.offset(0, step_y),
                cell.offset(step_x, step_y),
            ];
            let best = candidates
                .iter()
                .filter_map(|c| self.intersect_cell(line, c.x, c.y))
                .min();
            if let Some(hit) = best {
                let point = line.point_at(hit);
                return Some(SimVector::new(point.x, self.height_at(point.x, point.z), point.z));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32, z: i32) -> SimVector {
        SimVector::from_ints(x, y, z)
    }

    #[test]
    fn test_origin_is_map_centre() {
        let terrain = MapTerrain::flat(9, 9, 0, SimScalar::ZERO);
        assert_eq!(terrain.left_in_world_units(), SimScalar::from_int(-64));
        assert_eq!(terrain.world_to_heightmap_coordinate(v(0, 0, 0)), Point::new(4, 4));
        assert_eq!(terrain.world_to_heightmap_coordinate(v(-1, 0, -1)), Point::new(3, 3));
        assert_eq!(
            terrain.world_to_heightmap_coordinate_nearest(v(-7, 0, 9)),
            Point::new(4, 5)
        );
    }

    #[test]
    fn test_footprint_rect_centres_on_position() {
        let terrain = MapTerrain::flat(33, 33, 0, SimScalar::ZERO);
        let rect = terrain.footprint_rect(v(0, 0, 0), 2, 2);
        assert_eq!(rect, DiscreteRect::new(15, 15, 2, 2));
        let centre = terrain.footprint_center(rect.top_left(), 2, 2);
        assert_eq!(centre, v(0, 0, 0));
    }

    #[test]
    fn test_height_interpolates_on_slope() {
        let mut heights = Grid::new(3, 3, 0u8);
        heights.set(1, 0, 16);
        heights.set(1, 1, 16);
        heights.set(1, 2, 16);
        let terrain = MapTerrain::new(heights, SimScalar::ZERO);
        // Halfway across the first tile, rising from 0 to 16.
        let h = terrain.height_at(SimScalar::from_int(-8), SimScalar::from_int(-12));
        assert_eq!(h, SimScalar::from_int(8));
    }

    #[test]
    fn test_vertical_line_hits_flat_ground() {
        let terrain = MapTerrain::flat(9, 9, 10, SimScalar::ZERO);
        let line = Line3x::new(v(3, 50, 5), v(3, -50, 5));
        assert_eq!(terrain.intersect_line(&line), Some(v(3, 10, 5)));
    }

    #[test]
    fn test_line_through_tile_corner_is_not_missed() {
        let terrain = MapTerrain::flat(9, 9, 0, SimScalar::ZERO);
        // Descends diagonally through the corner at world (0, 0, 0).
        let line = Line3x::new(v(-20, 20, -20), v(20, -20, 20));
        assert_eq!(terrain.intersect_line(&line), Some(v(0, 0, 0)));
    }

    #[test]
    fn test_line_above_ground_misses() {
        let terrain = MapTerrain::flat(9, 9, 0, SimScalar::ZERO);
        let line = Line3x::new(v(-40, 10, 0), v(40, 10, 0));
        assert_eq!(terrain.intersect_line(&line), None);
    }

    #[test]
    fn test_underwater_and_depth() {
        let terrain = MapTerrain::flat(5, 5, 5, SimScalar::from_int(20));
        assert!(terrain.is_under_water(SimScalar::ZERO, SimScalar::ZERO));
        assert_eq!(terrain.cell_water_depth(0, 0), SimScalar::from_int(15));
        assert_eq!(terrain.cell_slope(0, 0), 0);
    }
}
