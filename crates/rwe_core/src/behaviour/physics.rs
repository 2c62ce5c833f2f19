//! Motion integration for ground units and aircraft.

use crate::ids::UnitId;
use crate::math::{SimScalar, SimVector, WideScalar};
use crate::simulation::GameSimulation;
use crate::unit::{AirMovementState, UnitPhysicsInfo};

/// Integrate one tick of motion.
pub fn update(sim: &mut GameSimulation, unit_id: UnitId) {
    match sim.units.get(unit_id).map(|u| u.physics) {
        Some(UnitPhysicsInfo::Ground(_)) => update_ground(sim, unit_id),
        Some(UnitPhysicsInfo::Air(_)) => update_air(sim, unit_id),
        None => {}
    }
}

fn update_ground(sim: &mut GameSimulation, unit_id: UnitId) {
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return;
    };
    let UnitPhysicsInfo::Ground(mut ground) = unit.physics else {
        return;
    };
    if !unit.is_mobile() {
        return;
    }

    unit.rotation = unit.rotation.turn_towards(ground.steering.target_angle, unit.turn_rate);

    let delta = (ground.steering.target_speed - ground.current_speed).clamp(-unit.brake_rate, unit.acceleration);
    let max_speed = if sim.terrain.is_under_water(unit.position.x, unit.position.z) {
        unit.max_speed.div_int(2)
    } else {
        unit.max_speed
    };
    let was_moving = ground.current_speed > SimScalar::ZERO;
    ground.current_speed = (ground.current_speed + delta).clamp(SimScalar::ZERO, max_speed);
    let speed = ground.current_speed;
    unit.physics = UnitPhysicsInfo::Ground(ground);
    unit.in_collision = false;

    let is_moving = speed > SimScalar::ZERO;
    if is_moving != was_moving {
        let script = if is_moving { "StartMoving" } else { "StopMoving" };
        sim.start_unit_script(unit_id, script, Vec::new());
    }
    if !is_moving {
        return;
    }

    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    let position = unit.position;
    let step = unit.facing().scaled(speed);

    let moved = try_move(sim, unit_id, position + step)
        || try_move(sim, unit_id, position + SimVector::new(step.x, SimScalar::ZERO, SimScalar::ZERO))
        || try_move(sim, unit_id, position + SimVector::new(SimScalar::ZERO, SimScalar::ZERO, step.z));

    if !moved {
        if let Some(unit) = sim.units.get_mut(unit_id) {
            unit.in_collision = true;
            if let UnitPhysicsInfo::Ground(ground) = &mut unit.physics {
                ground.current_speed = SimScalar::ZERO;
            }
        }
    }
}

/// Move to `target` if the footprint there is walkable and free.
fn try_move(sim: &mut GameSimulation, unit_id: UnitId, target: SimVector) -> bool {
    let Some(unit) = sim.units.get(unit_id) else {
        return false;
    };
    let old_rect = unit.footprint_rect(&sim.terrain);
    let new_rect = unit.footprint_rect_at(&sim.terrain, target);
    if new_rect != old_rect {
        if !sim.movement_classes().is_walkable(&unit.movement_class, new_rect.top_left())
            || sim.is_collision_at(&new_rect, Some(unit_id))
        {
            return false;
        }
        sim.move_unit_occupied_area(&old_rect, &new_rect, unit_id);
    }
    let y = sim.terrain.height_at(target.x, target.z);
    if let Some(unit) = sim.units.get_mut(unit_id) {
        unit.position = SimVector::new(target.x, y, target.z);
    }
    true
}

fn update_air(sim: &mut GameSimulation, unit_id: UnitId) {
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return;
    };
    let UnitPhysicsInfo::Air(mut air) = unit.physics else {
        return;
    };
    let ground = sim
        .terrain
        .height_at(unit.position.x, unit.position.z)
        .max(sim.terrain.sea_level());
    let cruise = ground + unit.cruise_altitude;
    let climb_rate = unit.max_speed.div_int(2).max(SimScalar::from_ratio(1, 4));
    let mut landed_change = None;

    match air.state {
        AirMovementState::Landed => {
            if air.target.is_some() {
                air.state = AirMovementState::TakingOff;
                landed_change = Some(false);
            }
        }
        AirMovementState::TakingOff => {
            unit.position.y = (unit.position.y + climb_rate).min(cruise);
            if unit.position.y >= cruise {
                air.state = AirMovementState::Flying;
            }
        }
        AirMovementState::Flying => {
            let desired = match air.target {
                Some(target) => {
                    let offset = (target - unit.position).xz();
                    let mut speed = unit.max_speed;
                    if unit.brake_rate > SimScalar::ZERO {
                        speed = speed.min((unit.brake_rate * offset.length()).mul_int(2).sqrt());
                    }
                    offset.normalized_or(SimVector::ZERO).scaled(speed)
                }
                None => SimVector::ZERO,
            };
            let mut change = desired - air.velocity.xz();
            let limit = unit.acceleration.max(SimScalar::EPSILON);
            if change.length_squared() > limit.squared() {
                change = change.normalized_or(SimVector::ZERO).scaled(limit);
            }
            air.velocity = (air.velocity.xz() + change).xz();
            unit.position += air.velocity;
            unit.position.y = cruise;
            if air.velocity.length_squared() > WideScalar::ZERO {
                unit.rotation = unit.rotation.turn_towards(air.velocity.heading(), unit.turn_rate);
            }
            if air.target.is_none() && air.velocity.length_squared() <= limit.squared() {
                air.velocity = SimVector::ZERO;
                air.state = AirMovementState::Landing;
            }
        }
        AirMovementState::Landing => {
            if air.target.is_some() {
                air.state = AirMovementState::Flying;
            } else {
                let next = unit.position.y - climb_rate;
                if next <= ground {
                    let rect = unit.footprint_rect(&sim.terrain);
                    if !sim.occupancy.is_blocked(&rect, Some(unit_id)) {
                        unit.position.y = ground;
                        air.state = AirMovementState::Landed;
                        landed_change = Some(true);
                    }
                } else {
                    unit.position.y = next;
                }
            }
        }
    }
    unit.physics = UnitPhysicsInfo::Air(air);

    if let Some(landed) = landed_change {
        sim.set_unit_landed(unit_id, landed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::{UnitDatabase, UnitDefinition};
    use crate::ids::PlayerId;
    use crate::math::SimAngle;
    use crate::occupancy::OccupiedCell;
    use crate::player::{GamePlayerInfo, PlayerControllerType};
    use crate::terrain::MapTerrain;
    use crate::unit::SteeringInfo;

    fn create_test_sim() -> GameSimulation {
        let tank: UnitDefinition = ron::from_str(
            r#"UnitDefinition(
                unit_name: "TANK",
                object_name: "TANK",
                footprint_x: 2,
                footprint_z: 2,
                max_slope: 20,
                max_water_depth: 10,
                max_hit_points: 100,
                max_velocity: 65536,
                acceleration: 65536,
                brake_rate: 65536,
                turn_rate: 65535,
            )"#,
        )
        .expect("test definition should parse");
        let mut plane = tank.clone();
        plane.unit_name = "PLANE".to_string();
        plane.object_name = "PLANE".to_string();
        plane.can_fly = true;
        plane.cruise_altitude = SimScalar::from_int(2);
        let mut database = UnitDatabase::new();
        database.add_unit(tank);
        database.add_unit(plane);
        let mut sim = GameSimulation::new(MapTerrain::flat(33, 33, 20, SimScalar::ZERO), Arc::new(database), 3);
        sim.add_player(GamePlayerInfo::new(
            PlayerControllerType::Human,
            "ARM",
            0,
            SimScalar::from_int(100),
            SimScalar::from_int(100),
        ));
        sim
    }

    fn steer(sim: &mut GameSimulation, id: UnitId, angle: SimAngle, speed: SimScalar) {
        if let UnitPhysicsInfo::Ground(ground) = &mut sim.unit_mut(id).unwrap().physics {
            ground.steering = SteeringInfo {
                target_angle: angle,
                target_speed: speed,
            };
        }
    }

    #[test]
    fn test_ground_unit_moves_and_keeps_occupancy_in_sync() {
        let mut sim = create_test_sim();
        let id = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        for _ in 0..40 {
            steer(&mut sim, id, SimAngle::QUARTER_TURN, SimScalar::ONE);
            update(&mut sim, id);
        }
        let unit = sim.unit(id).unwrap();
        assert!(unit.position.x > SimScalar::from_int(100));
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(id)), 4);
        let rect = unit.footprint_rect(&sim.terrain);
        assert_eq!(sim.occupancy.try_get(rect.x(), rect.y()), Some(OccupiedCell::Unit(id)));
    }

    #[test]
    fn test_blocked_unit_slides_along_free_axis() {
        let mut sim = create_test_sim();
        let id = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        // A wall of occupied cells directly along +X.
        for y in 0..33 {
            sim.occupancy.set_cell(6, y, OccupiedCell::Unit(UnitId::from_raw(0xfe00)));
        }
        for _ in 0..60 {
            steer(&mut sim, id, SimAngle::EIGHTH_TURN, SimScalar::ONE);
            update(&mut sim, id);
        }
        let unit = sim.unit(id).unwrap();
        let rect = unit.footprint_rect(&sim.terrain);
        assert!(rect.right() <= 6);
        assert!(unit.position.z > SimScalar::from_int(80), "slid to {:?}", unit.position);
    }

    #[test]
    fn test_aircraft_takes_off_and_lands() {
        let mut sim = create_test_sim();
        let id = sim.spawn_unit("PLANE", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(id)), 4);

        if let UnitPhysicsInfo::Air(air) = &mut sim.unit_mut(id).unwrap().physics {
            air.target = Some(SimVector::from_ints(200, 0, 64));
        }
        update(&mut sim, id);
        assert!(sim.unit(id).unwrap().is_flying());
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(id)), 0);

        for _ in 0..200 {
            update(&mut sim, id);
        }
        if let UnitPhysicsInfo::Air(air) = &mut sim.unit_mut(id).unwrap().physics {
            air.target = None;
        }
        for _ in 0..50 {
            update(&mut sim, id);
        }
        let unit = sim.unit(id).unwrap();
        assert!(!unit.is_flying());
        assert!((unit.position.x - SimScalar::from_int(200)).abs() < SimScalar::from_int(8));
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(id)), 4);
    }
}
