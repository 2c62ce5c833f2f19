//! Test fixtures and helpers.
//!
//! A small canonical data set and flat maps to run it on, so scenario
//! tests across crates agree on what a "tank" is.

use std::sync::Arc;

use rwe_core::data::{DataBundle, UnitDatabase};
use rwe_core::ids::{PlayerId, UnitId};
use rwe_core::math::{SimScalar, SimVector};
use rwe_core::player::{GamePlayerInfo, PlayerControllerType};
use rwe_core::simulation::GameSimulation;
use rwe_core::terrain::MapTerrain;

/// Heightmap corners per side of the default test map: 64 tiles of 16
/// world units, so the map spans -512..512 on both axes.
pub const TEST_MAP_CORNERS: usize = 65;

/// Ground height of the default test map.
pub const TEST_GROUND_HEIGHT: u8 = 20;

/// Starting energy and metal of every test player.
pub const TEST_STARTING_RESOURCES: i32 = 1000;

/// The canonical test data.
///
/// - `TANK`: 2x2 ground unit, speed 1, no weapons.
/// - `GUNNER`: a `TANK` with a line-of-sight `LASER`, range 200.
/// - `MORTAR`: a `TANK` with a ballistic `CANNON`, range 400.
/// - `ARMCK`: 2x2 builder, worker time 300, build distance 100.
/// - `ARMSOLAR`: 3x3 structure, build time 50, costs 50 energy / 10 metal,
///   makes 2 energy per tick.
/// - `ROCK1`: 1x1 blocking reclaimable feature worth 20 metal.
pub const TEST_DATA_RON: &str = r#"DataBundle(
    units: [
        UnitDefinition(
            unit_name: "TANK",
            object_name: "TANK",
            side: "ARM",
            footprint_x: 2,
            footprint_z: 2,
            max_slope: 20,
            max_water_depth: 10,
            max_hit_points: 100,
            max_velocity: 65536,
            acceleration: 16384,
            brake_rate: 32768,
            turn_rate: 2048,
            build_time: 100,
        ),
        UnitDefinition(
            unit_name: "GUNNER",
            object_name: "GUNNER",
            side: "ARM",
            footprint_x: 2,
            footprint_z: 2,
            max_slope: 20,
            max_water_depth: 10,
            max_hit_points: 100,
            max_velocity: 65536,
            acceleration: 16384,
            brake_rate: 32768,
            turn_rate: 2048,
            weapons: ["LASER"],
        ),
        UnitDefinition(
            unit_name: "MORTAR",
            object_name: "MORTAR",
            side: "CORE",
            footprint_x: 2,
            footprint_z: 2,
            max_slope: 20,
            max_water_depth: 10,
            max_hit_points: 150,
            max_velocity: 32768,
            acceleration: 16384,
            brake_rate: 32768,
            turn_rate: 1024,
            weapons: ["CANNON"],
        ),
        UnitDefinition(
            unit_name: "ARMCK",
            object_name: "ARMCK",
            side: "ARM",
            footprint_x: 2,
            footprint_z: 2,
            max_slope: 20,
            max_water_depth: 10,
            max_hit_points: 100,
            max_velocity: 65536,
            acceleration: 16384,
            brake_rate: 32768,
            turn_rate: 2048,
            builder: true,
            worker_time: 300,
            build_distance: 6553600,
            build_options: ["ARMSOLAR"],
        ),
        UnitDefinition(
            unit_name: "ARMSOLAR",
            object_name: "ARMSOLAR",
            side: "ARM",
            footprint_x: 3,
            footprint_z: 3,
            max_hit_points: 300,
            build_time: 50,
            build_cost_energy: 3276800,
            build_cost_metal: 655360,
            energy_make: 131072,
            energy_storage: 3276800,
        ),
    ],
    weapons: [
        WeaponDefinition(
            name: "LASER",
            physics_type: LineOfSight,
            max_range: 13107200,
            reload_time: 30,
            velocity: 655360,
            damage: {"DEFAULT": 10},
        ),
        WeaponDefinition(
            name: "CANNON",
            physics_type: Ballistic,
            max_range: 26214400,
            reload_time: 60,
            velocity: 524288,
            damage: {"DEFAULT": 40},
            damage_radius: 1572864,
        ),
    ],
    features: [
        FeatureDefinition(
            name: "ROCK1",
            blocking: true,
            reclaimable: true,
            metal: 1310720,
        ),
    ],
)"#;

/// Parse the canonical test data.
///
/// # Panics
///
/// Panics if [`TEST_DATA_RON`] stops matching the definition types.
#[must_use]
pub fn create_test_database() -> Arc<UnitDatabase> {
    let bundle: DataBundle = ron::from_str(TEST_DATA_RON).expect("test data should parse");
    Arc::new(UnitDatabase::from_bundle(bundle).expect("test data should index"))
}

/// Flat map with `corners x corners` heightmap corners at the test ground
/// height and sea level zero.
#[must_use]
pub fn flat_terrain(corners: usize) -> MapTerrain {
    MapTerrain::flat(corners, corners, TEST_GROUND_HEIGHT, SimScalar::ZERO)
}

/// A human player on `side` with the standard starting resources.
#[must_use]
pub fn test_player(side: &str) -> GamePlayerInfo {
    let resources = SimScalar::from_int(TEST_STARTING_RESOURCES);
    GamePlayerInfo::new(PlayerControllerType::Human, side, 0, resources, resources)
}

/// Simulation on the default flat map with the canonical data and
/// `players` players alternating ARM and CORE.
#[must_use]
pub fn create_test_simulation(players: u32, seed: u64) -> GameSimulation {
    let mut sim = GameSimulation::new(flat_terrain(TEST_MAP_CORNERS), create_test_database(), seed);
    for index in 0..players {
        let side = if index % 2 == 0 { "ARM" } else { "CORE" };
        sim.add_player(test_player(side));
    }
    sim
}

/// Spawn a unit at world `(x, z)` on the ground.
///
/// # Panics
///
/// Panics if the unit cannot be placed.
pub fn spawn_at(sim: &mut GameSimulation, unit_type: &str, owner: u32, x: i32, z: i32) -> UnitId {
    sim.spawn_unit(unit_type, PlayerId(owner), SimVector::from_ints(x, 0, z))
        .unwrap_or_else(|e| panic!("failed to spawn {unit_type} at ({x}, {z}): {e}"))
}

/// Horizontal distance between two positions, as `f64` for
/// readable assertions.
#[must_use]
pub fn horizontal_distance(a: SimVector, b: SimVector) -> f64 {
    let d = (a - b).xz();
    d.length().to_num::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_data_parses() {
        let database = create_test_database();
        for unit in ["TANK", "GUNNER", "MORTAR", "ARMCK", "ARMSOLAR"] {
            assert!(database.unit(unit).is_some(), "{unit} missing");
        }
        assert!(database.weapon("cannon").is_some());
        assert!(database.feature("ROCK1").is_some());
        database.validate().unwrap();
    }

    #[test]
    fn test_default_map_spans_1024_units() {
        let terrain = flat_terrain(TEST_MAP_CORNERS);
        assert_eq!(terrain.width_in_world_units(), SimScalar::from_int(1024));
        assert_eq!(terrain.left_in_world_units(), SimScalar::from_int(-512));
    }

    #[test]
    fn test_players_alternate_sides() {
        let sim = create_test_simulation(3, 1);
        assert_eq!(sim.players.len(), 3);
        assert_eq!(sim.players[1].side, "CORE");
        assert_eq!(sim.players[2].side, "ARM");
    }
}
