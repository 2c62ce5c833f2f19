//! Map feature definitions and movement classes.

use serde::{Deserialize, Serialize};

use crate::math::SimScalar;

/// Immutable data for a map feature type (trees, rocks, wreckage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDefinition {
    /// Unique feature name.
    pub name: String,

    /// Footprint width in heightmap cells.
    #[serde(default = "default_footprint")]
    pub footprint_x: i32,

    /// Footprint depth in heightmap cells.
    #[serde(default = "default_footprint")]
    pub footprint_z: i32,

    /// Occupies its footprint on the occupancy grid.
    #[serde(default)]
    pub blocking: bool,

    /// Builders may reclaim it.
    #[serde(default)]
    pub reclaimable: bool,

    /// Cannot be destroyed by weapons.
    #[serde(default)]
    pub indestructible: bool,

    /// Hit points before it is destroyed.
    #[serde(default)]
    pub damage: u32,

    /// Metal gained by reclaiming.
    #[serde(default)]
    pub metal: SimScalar,

    /// Energy gained by reclaiming.
    #[serde(default)]
    pub energy: SimScalar,

    /// Height used for projectile collision.
    #[serde(default)]
    pub height: SimScalar,
}

const fn default_footprint() -> i32 {
    1
}

/// Terrain restrictions shared by a family of ground units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementClass {
    /// Unique class name.
    pub name: String,
    /// Footprint width in cells.
    pub footprint_x: i32,
    /// Footprint depth in cells.
    pub footprint_z: i32,
    /// Steepest dry slope.
    pub max_slope: u8,
    /// Steepest underwater slope.
    pub max_water_slope: u8,
    /// Shallowest water that may be entered.
    pub min_water_depth: i32,
    /// Deepest water that may be entered.
    pub max_water_depth: i32,
}
