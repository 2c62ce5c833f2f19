//! Map features: trees, rocks, wreckage.

use serde::{Deserialize, Serialize};

use crate::grid::DiscreteRect;
use crate::math::{SimBox, SimScalar, SimVector};
use crate::terrain::MapTerrain;

/// A feature placed on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapFeature {
    /// Definition name.
    pub feature_type: String,
    /// Centre of the footprint at ground level.
    pub position: SimVector,
    /// Footprint width in cells.
    pub footprint_x: i32,
    /// Footprint depth in cells.
    pub footprint_z: i32,
    /// Occupies its footprint.
    pub blocking: bool,
    /// Height of the hit box above `position`.
    pub height: SimScalar,
    /// Can be reclaimed.
    pub reclaimable: bool,
    /// Cannot be destroyed by damage.
    pub indestructible: bool,
    /// Damage left before it is destroyed.
    pub hit_points: u32,
    /// Metal left to reclaim.
    pub metal: SimScalar,
    /// Energy left to reclaim.
    pub energy: SimScalar,
}

impl MapFeature {
    /// Feature of the given definition at `position`.
    #[must_use]
    pub fn new(definition: &crate::data::FeatureDefinition, position: SimVector) -> Self {
        Self {
            feature_type: definition.name.clone(),
            position,
            footprint_x: definition.footprint_x,
            footprint_z: definition.footprint_z,
            blocking: definition.blocking,
            height: definition.height,
            reclaimable: definition.reclaimable,
            indestructible: definition.indestructible,
            hit_points: definition.damage,
            metal: definition.metal,
            energy: definition.energy,
        }
    }

    /// Footprint rectangle on the heightmap grid.
    #[must_use]
    pub fn footprint_rect(&self, terrain: &MapTerrain) -> DiscreteRect {
        terrain.footprint_rect(self.position, self.footprint_x, self.footprint_z)
    }

    /// Collision box in world space.
    #[must_use]
    pub fn world_bounding_box(&self) -> SimBox {
        let half_x = SimScalar::from_int(self.footprint_x * 8);
        let half_z = SimScalar::from_int(self.footprint_z * 8);
        SimBox::new(
            self.position - SimVector::new(half_x, SimScalar::ZERO, half_z),
            self.position + SimVector::new(half_x, self.height, half_z),
        )
    }

    /// True once nothing is left to reclaim.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.metal <= SimScalar::ZERO && self.energy <= SimScalar::ZERO
    }
}
