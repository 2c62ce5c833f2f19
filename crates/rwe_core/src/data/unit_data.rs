//! Unit type definitions.

use serde::{Deserialize, Serialize};

use crate::math::{SimAngle, SimScalar};
use crate::unit::FireOrders;

/// Per-cell policy of a building's yard map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YardMapCell {
    /// Never blocks.
    Passable,
    /// Always blocks.
    Blocking,
    /// Blocks only while the yard is closed.
    PassableWhenOpen,
    /// Blocks ground units; boats may pass.
    WaterOnly,
}

impl YardMapCell {
    /// True if this cell blocks ground movement given the yard state.
    #[must_use]
    pub const fn blocks(self, yard_open: bool) -> bool {
        match self {
            Self::Passable => false,
            Self::Blocking | Self::WaterOnly => true,
            Self::PassableWhenOpen => !yard_open,
        }
    }
}

/// Immutable game data for one unit type, keyed by `unit_name`.
///
/// # Example RON
///
/// ```ron
/// UnitDefinition(
///     unit_name: "ARMPW",
///     object_name: "ARMPW",
///     footprint_x: 2,
///     footprint_z: 2,
///     movement_class: Some("KBOT2"),
///     max_hit_points: 300,
///     max_velocity: 98304,      // 1.5
///     acceleration: 16384,      // 0.25
///     brake_rate: 32768,        // 0.5
///     turn_rate: 910,
///     weapons: ["EMG"],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Unique type name.
    pub unit_name: String,

    /// Model and script name.
    pub object_name: String,

    /// Owning side, e.g. "ARM" or "CORE".
    #[serde(default)]
    pub side: String,

    /// Footprint width in heightmap cells.
    pub footprint_x: i32,

    /// Footprint depth in heightmap cells.
    pub footprint_z: i32,

    /// Named movement class. Units without one get an ad-hoc class built from
    /// the fields below.
    #[serde(default)]
    pub movement_class: Option<String>,

    /// Steepest slope the unit can climb when it has no movement class.
    #[serde(default = "default_max_slope")]
    pub max_slope: u8,

    /// Steepest underwater slope when it has no movement class.
    #[serde(default = "default_max_slope")]
    pub max_water_slope: u8,

    /// Shallowest water the unit may enter.
    #[serde(default)]
    pub min_water_depth: i32,

    /// Deepest water the unit may enter.
    #[serde(default = "default_max_water_depth")]
    pub max_water_depth: i32,

    /// Full health.
    pub max_hit_points: u32,

    /// Top speed in world units per tick. Zero for structures.
    #[serde(default)]
    pub max_velocity: SimScalar,

    /// Speed gained per tick.
    #[serde(default)]
    pub acceleration: SimScalar,

    /// Speed lost per tick when braking.
    #[serde(default)]
    pub brake_rate: SimScalar,

    /// Rotation per tick.
    #[serde(default)]
    pub turn_rate: SimAngle,

    /// True for aircraft.
    #[serde(default)]
    pub can_fly: bool,

    /// Flying altitude above terrain.
    #[serde(default)]
    pub cruise_altitude: SimScalar,

    /// Work units needed to finish building this unit.
    #[serde(default = "default_build_time")]
    pub build_time: u32,

    /// Energy to build.
    #[serde(default)]
    pub build_cost_energy: SimScalar,

    /// Metal to build.
    #[serde(default)]
    pub build_cost_metal: SimScalar,

    /// True if this unit can build other units.
    #[serde(default)]
    pub builder: bool,

    /// Work units contributed per second while building.
    #[serde(default)]
    pub worker_time: u32,

    /// Maximum distance to a build target.
    #[serde(default)]
    pub build_distance: SimScalar,

    /// Unit types this builder can create.
    #[serde(default)]
    pub build_options: Vec<String>,

    /// Energy produced per tick.
    #[serde(default)]
    pub energy_make: SimScalar,

    /// Metal produced per tick.
    #[serde(default)]
    pub metal_make: SimScalar,

    /// Energy consumed per tick while active.
    #[serde(default)]
    pub energy_use: SimScalar,

    /// Metal consumed per tick while active.
    #[serde(default)]
    pub metal_use: SimScalar,

    /// Energy storage contributed to the owner.
    #[serde(default)]
    pub energy_storage: SimScalar,

    /// Metal storage contributed to the owner.
    #[serde(default)]
    pub metal_storage: SimScalar,

    /// Switch on as soon as construction completes.
    #[serde(default)]
    pub activate_when_built: bool,

    /// Players may toggle this unit on and off.
    #[serde(default)]
    pub on_off_able: bool,

    /// Losing this unit loses the game.
    #[serde(default)]
    pub commander: bool,

    /// Weapon names for the primary, secondary and tertiary slots.
    #[serde(default)]
    pub weapons: Vec<String>,

    /// Armor class used to index weapon damage tables.
    #[serde(default = "default_armor_class")]
    pub armor_class: String,

    /// Fire orders a new unit starts with.
    #[serde(default)]
    pub default_fire_orders: FireOrders,

    /// Footprint cell policies, row-major, when this is a yard building.
    #[serde(default)]
    pub yard_map: Option<Vec<YardMapCell>>,

    /// Feature left behind on death.
    #[serde(default)]
    pub corpse: Option<String>,

    /// Weapon detonated on death.
    #[serde(default)]
    pub explode_as: Option<String>,
}

const fn default_max_slope() -> u8 {
    255
}

const fn default_max_water_depth() -> i32 {
    255
}

const fn default_build_time() -> u32 {
    1
}

fn default_armor_class() -> String {
    "DEFAULT".to_string()
}

impl UnitDefinition {
    /// True if the unit can move at all.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.max_velocity > SimScalar::ZERO
    }

    /// True if the unit is a stationary builder that creates units in its yard.
    #[must_use]
    pub fn is_factory(&self) -> bool {
        self.builder && !self.is_mobile()
    }

    /// Work units contributed per tick.
    #[must_use]
    pub fn worker_time_per_tick(&self) -> u32 {
        if self.worker_time == 0 {
            return 0;
        }
        (self.worker_time / crate::constants::TICK_RATE).max(1)
    }

    /// Yard map policy at a footprint cell.
    #[must_use]
    pub fn yard_cell(&self, x: i32, z: i32) -> Option<YardMapCell> {
        if x < 0 || z < 0 || x >= self.footprint_x || z >= self.footprint_z {
            return None;
        }
        let map = self.yard_map.as_ref()?;
        map.get((z * self.footprint_x + x) as usize).copied()
    }

    /// Weapon name in a slot (0, 1 or 2).
    #[must_use]
    pub fn weapon(&self, slot: usize) -> Option<&str> {
        self.weapons.get(slot).map(String::as_str).filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_factory() -> UnitDefinition {
        ron::from_str(
            r#"UnitDefinition(
                unit_name: "ARMLAB",
                object_name: "ARMLAB",
                footprint_x: 2,
                footprint_z: 1,
                max_hit_points: 1000,
                builder: true,
                worker_time: 300,
                yard_map: Some([Blocking, PassableWhenOpen]),
            )"#,
        )
        .expect("test definition should parse")
    }

    #[test]
    fn test_defaults_from_ron() {
        let unit = create_test_factory();
        assert!(!unit.is_mobile());
        assert!(unit.is_factory());
        assert_eq!(unit.armor_class, "DEFAULT");
        assert_eq!(unit.max_slope, 255);
        assert_eq!(unit.default_fire_orders, FireOrders::FireAtWill);
    }

    #[test]
    fn test_worker_time_per_tick() {
        let unit = create_test_factory();
        assert_eq!(unit.worker_time_per_tick(), 10);
    }

    #[test]
    fn test_yard_cells() {
        let unit = create_test_factory();
        assert_eq!(unit.yard_cell(0, 0), Some(YardMapCell::Blocking));
        assert_eq!(unit.yard_cell(1, 0), Some(YardMapCell::PassableWhenOpen));
        assert_eq!(unit.yard_cell(2, 0), None);
        assert!(!YardMapCell::PassableWhenOpen.blocks(true));
        assert!(YardMapCell::PassableWhenOpen.blocks(false));
    }
}
