//! Construction, assistance and reclamation.
//!
//! Mobile builders walk into range, ask the simulation to place an
//! unfinished unit and then nanolathe it. Factories create the unit in
//! their yard and send it out once finished. Work is funded tick by tick;
//! a stalled economy simply pauses the nanolathe.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::data::UnitDefinition;
use crate::events::GameEvent;
use crate::grid::DiscreteRect;
use crate::ids::UnitId;
use crate::math::{SimScalar, SimVector};
use crate::simulation::GameSimulation;
use crate::unit::{BehaviourState, NavigationGoal, ReclaimTarget, UnitCreationStatus, UnitOrder};

use super::navigation::{navigate_to, stop_navigation, NavigationOutcome};
use super::{set_activation, OrderProgress};

fn is_factory(sim: &GameSimulation, unit_id: UnitId) -> bool {
    sim.units
        .get(unit_id)
        .and_then(|u| sim.database().unit(&u.unit_type))
        .is_some_and(UnitDefinition::is_factory)
}

/// True if the builder can reach a target of the given footprint from
/// where it stands.
fn in_build_range(sim: &GameSimulation, builder_id: UnitId, center: SimVector, footprint: (i32, i32)) -> bool {
    let Some(builder) = sim.units.get(builder_id) else {
        return false;
    };
    let build_distance = sim
        .database()
        .unit(&builder.unit_type)
        .map_or(SimScalar::ZERO, |d| d.build_distance);
    let reach = build_distance
        + SimScalar::from_int(footprint.0.max(footprint.1) * 8)
        + SimScalar::from_int(builder.footprint_x.max(builder.footprint_z) * 8);
    (center - builder.position).xz().length_squared() <= reach.squared()
}

fn set_state(sim: &mut GameSimulation, unit_id: UnitId, state: BehaviourState) {
    if let Some(unit) = sim.units.get_mut(unit_id) {
        unit.behaviour_state = state;
    }
}

/// Heading and pitch from the builder to `target`, relative to its facing.
fn nano_angles(sim: &GameSimulation, unit_id: UnitId, target: SimVector) -> Vec<i32> {
    let Some(unit) = sim.units.get(unit_id) else {
        return vec![0, 0];
    };
    let delta = target - unit.position;
    let heading = delta.xz().heading() - unit.rotation;
    let pitch = crate::math::atan2(delta.y, delta.xz().length());
    vec![i32::from(heading.signed()), i32::from(pitch.signed())]
}

/// Start the `StartBuilding` script. Mobile builders without one are
/// ready at once; a factory's stance follows its activation instead.
fn start_building(sim: &mut GameSimulation, unit_id: UnitId, target: SimVector) {
    let args = nano_angles(sim, unit_id, target);
    if sim.start_unit_script(unit_id, "StartBuilding", args).is_none() && !is_factory(sim, unit_id) {
        if let Some(unit) = sim.units.get_mut(unit_id) {
            unit.in_build_stance = true;
        }
    }
}

/// Run the `StopBuilding` script and leave the build stance.
pub(crate) fn stop_building(sim: &mut GameSimulation, unit_id: UnitId) {
    if sim.start_unit_script(unit_id, "StopBuilding", Vec::new()).is_none() && !is_factory(sim, unit_id) {
        if let Some(unit) = sim.units.get_mut(unit_id) {
            unit.in_build_stance = false;
        }
    }
}

/// Where the nano spray comes from.
fn nano_origin(sim: &mut GameSimulation, unit_id: UnitId) -> Option<SimVector> {
    let piece = sim.query_unit_piece(unit_id, "QueryNanoPiece");
    let unit = sim.units.get(unit_id)?;
    Some(piece.map_or(unit.position, |p| unit.piece_world_position(p)))
}

fn work_as_i32(work: u32) -> i32 {
    i32::try_from(work).unwrap_or(i32::MAX)
}

/// Apply one tick of construction work from `builder_id` to `target_id`.
fn nanolathe(sim: &mut GameSimulation, builder_id: UnitId, target_id: UnitId) -> OrderProgress {
    let target_ok = sim
        .units
        .get(target_id)
        .is_some_and(|t| t.is_alive() && t.is_being_built());
    if !target_ok {
        stop_building(sim, builder_id);
        return OrderProgress::Done;
    }
    let Some(builder) = sim.units.get(builder_id) else {
        return OrderProgress::Done;
    };
    if !builder.in_build_stance {
        return OrderProgress::Continue;
    }
    let database = Arc::clone(sim.database());
    let worker_time = database
        .unit(&builder.unit_type)
        .map_or(0, UnitDefinition::worker_time_per_tick);
    if worker_time == 0 {
        debug!(builder = %builder_id, "builder has no worker time");
        stop_building(sim, builder_id);
        return OrderProgress::Done;
    }
    let Some(target) = sim.units.get(target_id) else {
        return OrderProgress::Done;
    };
    let Some(target_definition) = database.unit(&target.unit_type) else {
        return OrderProgress::Done;
    };

    let remaining = target.build_time - target.build_time_completed;
    let work = worker_time.min(remaining);
    let build_time = work_as_i32(target.build_time);
    let energy = target_definition.build_cost_energy.mul_int(work_as_i32(work)).div_int(build_time);
    let metal = target_definition.build_cost_metal.mul_int(work_as_i32(work)).div_int(build_time);
    if !sim.add_resource_delta(builder_id, -energy, -metal, -energy, -metal) {
        trace!(builder = %builder_id, "nanolathe stalled");
        return OrderProgress::Continue;
    }

    let origin = nano_origin(sim, builder_id);
    let Some(target) = sim.units.get_mut(target_id) else {
        return OrderProgress::Done;
    };
    target.build_time_completed += work;
    let gained = u64::from(target.max_hit_points) * u64::from(work) / u64::from(target.build_time);
    let hit_points = (u64::from(target.hit_points) + gained).min(u64::from(target.max_hit_points));
    target.hit_points = u32::try_from(hit_points).unwrap_or(target.max_hit_points);
    let target_position = target.position;
    let complete = !target.is_being_built();

    if let Some(origin) = origin {
        sim.events.push(GameEvent::Nanolathe {
            unit: builder_id,
            origin,
            target: target_position,
            reverse: false,
        });
    }
    set_state(
        sim,
        builder_id,
        BehaviourState::Building {
            target: target_id,
            nano_origin: origin,
        },
    );

    if complete {
        sim.complete_unit(target_id);
        stop_building(sim, builder_id);
        return OrderProgress::Done;
    }
    OrderProgress::Continue
}

/// Follow a creation request until it resolves into a build.
fn after_creation(sim: &mut GameSimulation, unit_id: UnitId, status: UnitCreationStatus) {
    match status {
        UnitCreationStatus::Pending | UnitCreationStatus::Failed => {}
        UnitCreationStatus::Done(target) => {
            let position = sim.units.get(target).map_or(SimVector::ZERO, |u| u.position);
            set_state(
                sim,
                unit_id,
                BehaviourState::Building {
                    target,
                    nano_origin: None,
                },
            );
            start_building(sim, unit_id, position);
        }
    }
}

/// `Build` order for a mobile builder.
pub fn build_mobile(sim: &mut GameSimulation, unit_id: UnitId, unit_type: &str, position: SimVector) -> OrderProgress {
    let Some(unit) = sim.units.get(unit_id) else {
        return OrderProgress::Done;
    };
    match unit.behaviour_state.clone() {
        BehaviourState::CreatingUnit { status, .. } => {
            if status == UnitCreationStatus::Failed {
                debug!(builder = %unit_id, unit_type, "build site blocked");
                return OrderProgress::Done;
            }
            after_creation(sim, unit_id, status);
            OrderProgress::Continue
        }
        BehaviourState::Building { target, .. } => nanolathe(sim, unit_id, target),
        _ => {
            let Some(definition) = sim.database().unit(unit_type) else {
                debug!(builder = %unit_id, unit_type, "unknown unit type ordered");
                return OrderProgress::Done;
            };
            let (fx, fz) = (definition.footprint_x, definition.footprint_z);
            let rect = sim.terrain.footprint_rect(position, fx, fz);
            let center = sim.terrain.footprint_center(rect.top_left(), fx, fz);

            if in_build_range(sim, unit_id, center, (fx, fz)) {
                let owner = unit.owner;
                if let Some(unit) = sim.units.get_mut(unit_id) {
                    stop_navigation(unit);
                }
                sim.request_bugger_off(rect, owner, unit_id);
                set_state(
                    sim,
                    unit_id,
                    BehaviourState::CreatingUnit {
                        unit_type: unit_type.to_string(),
                        owner,
                        position: center,
                        status: UnitCreationStatus::Pending,
                    },
                );
                return OrderProgress::Continue;
            }
            approach(sim, unit_id, rect, center, (fx, fz))
        }
    }
}

/// Walk toward a target's footprint. Arriving out of reach, or failing to
/// find a path, ends the order.
fn approach(
    sim: &mut GameSimulation,
    unit_id: UnitId,
    rect: DiscreteRect,
    center: SimVector,
    footprint: (i32, i32),
) -> OrderProgress {
    let goal = NavigationGoal::Rect(rect);
    set_state(sim, unit_id, BehaviourState::Moving { goal });
    match navigate_to(sim, unit_id, goal) {
        NavigationOutcome::InProgress => OrderProgress::Continue,
        NavigationOutcome::Arrived if in_build_range(sim, unit_id, center, footprint) => OrderProgress::Continue,
        NavigationOutcome::Arrived | NavigationOutcome::GaveUp => {
            debug!(builder = %unit_id, ?rect, "build target out of reach");
            OrderProgress::Done
        }
    }
}

/// `Build` order for a factory.
pub fn build_factory(sim: &mut GameSimulation, unit_id: UnitId, unit_type: &str) -> OrderProgress {
    let Some(unit) = sim.units.get(unit_id) else {
        return OrderProgress::Done;
    };
    match unit.behaviour_state.clone() {
        BehaviourState::CreatingUnit { status, .. } => {
            if status == UnitCreationStatus::Failed {
                // Clear the yard and try again.
                let (rect, owner) = (unit.footprint_rect(&sim.terrain), unit.owner);
                sim.request_bugger_off(rect, owner, unit_id);
                set_state(sim, unit_id, BehaviourState::Idle);
            } else {
                after_creation(sim, unit_id, status);
            }
            OrderProgress::Continue
        }
        BehaviourState::Building { target, .. } => {
            let progress = nanolathe(sim, unit_id, target);
            if progress == OrderProgress::Done {
                send_out_of_yard(sim, unit_id, target);
                let more_orders = sim.units.get(unit_id).is_some_and(|u| u.orders.len() > 1);
                if !more_orders {
                    set_activation(sim, unit_id, false);
                }
            }
            progress
        }
        _ => {
            if !unit.activated {
                set_activation(sim, unit_id, true);
            }
            if !sim.units.get(unit_id).is_some_and(|u| u.in_build_stance) {
                return OrderProgress::Continue;
            }
            let piece = sim.query_unit_piece(unit_id, "QueryBuildInfo");
            let Some(unit) = sim.units.get(unit_id) else {
                return OrderProgress::Done;
            };
            let position = piece.map_or(unit.position, |p| unit.piece_world_position(p));
            let owner = unit.owner;
            set_state(
                sim,
                unit_id,
                BehaviourState::CreatingUnit {
                    unit_type: unit_type.to_string(),
                    owner,
                    position,
                    status: UnitCreationStatus::Pending,
                },
            );
            OrderProgress::Continue
        }
    }
}

/// Order a freshly built unit out in front of its factory.
fn send_out_of_yard(sim: &mut GameSimulation, factory_id: UnitId, unit_id: UnitId) {
    let Some(factory) = sim.units.get(factory_id) else {
        return;
    };
    let finished = sim.units.get(unit_id).is_some_and(|u| u.is_alive() && !u.is_being_built());
    if !finished {
        return;
    }
    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    let distance = SimScalar::from_int((factory.footprint_z + unit.footprint_z) * 8 + 16);
    let exit = factory.position + factory.facing().scaled(distance);
    if let Some(unit) = sim.units.get_mut(unit_id) {
        if unit.is_mobile() {
            unit.orders.push_back(UnitOrder::Move(exit));
        }
    }
}

/// `CompleteBuild` order: help finish an existing unfinished unit.
pub fn complete_build(sim: &mut GameSimulation, unit_id: UnitId, target_id: UnitId) -> OrderProgress {
    if let Some(BehaviourState::Building { target, .. }) = sim.units.get(unit_id).map(|u| &u.behaviour_state) {
        if *target == target_id {
            return nanolathe(sim, unit_id, target_id);
        }
    }
    let Some(target) = sim.units.get(target_id).filter(|t| t.is_alive() && t.is_being_built()) else {
        return OrderProgress::Done;
    };
    let (center, footprint) = (target.position, (target.footprint_x, target.footprint_z));
    let rect = target.footprint_rect(&sim.terrain);
    if in_build_range(sim, unit_id, center, footprint) {
        if let Some(unit) = sim.units.get_mut(unit_id) {
            stop_navigation(unit);
        }
        set_state(
            sim,
            unit_id,
            BehaviourState::Building {
                target: target_id,
                nano_origin: None,
            },
        );
        start_building(sim, unit_id, center);
        return OrderProgress::Continue;
    }
    approach(sim, unit_id, rect, center, footprint)
}

/// `Reclaim` order.
pub fn reclaim(sim: &mut GameSimulation, unit_id: UnitId, target: ReclaimTarget) -> OrderProgress {
    if let Some(BehaviourState::Reclaiming { target: current, .. }) = sim.units.get(unit_id).map(|u| &u.behaviour_state) {
        if *current == target {
            return reclaim_step(sim, unit_id, target);
        }
    }
    let located = match target {
        ReclaimTarget::Feature(id) => sim
            .features
            .get(id)
            .filter(|f| f.reclaimable)
            .map(|f| (f.position, (f.footprint_x, f.footprint_z), f.footprint_rect(&sim.terrain))),
        ReclaimTarget::Unit(id) => sim
            .units
            .get(id)
            .filter(|u| u.is_alive() && id != unit_id)
            .map(|u| (u.position, (u.footprint_x, u.footprint_z), u.footprint_rect(&sim.terrain))),
    };
    let Some((center, footprint, rect)) = located else {
        return OrderProgress::Done;
    };
    if in_build_range(sim, unit_id, center, footprint) {
        if let Some(unit) = sim.units.get_mut(unit_id) {
            stop_navigation(unit);
        }
        set_state(
            sim,
            unit_id,
            BehaviourState::Reclaiming {
                target,
                nano_origin: None,
            },
        );
        start_building(sim, unit_id, center);
        return OrderProgress::Continue;
    }
    approach(sim, unit_id, rect, center, footprint)
}

fn reclaim_step(sim: &mut GameSimulation, unit_id: UnitId, target: ReclaimTarget) -> OrderProgress {
    let Some(builder) = sim.units.get(unit_id) else {
        return OrderProgress::Done;
    };
    if !builder.in_build_stance {
        return OrderProgress::Continue;
    }
    let worker_time = sim
        .database()
        .unit(&builder.unit_type)
        .map_or(0, UnitDefinition::worker_time_per_tick);
    let work = SimScalar::from_int(work_as_i32(worker_time));
    let origin = nano_origin(sim, unit_id);

    let (target_position, finished) = match target {
        ReclaimTarget::Feature(id) => {
            let Some(feature) = sim.features.get_mut(id) else {
                stop_building(sim, unit_id);
                return OrderProgress::Done;
            };
            let metal = feature.metal.max(SimScalar::ZERO).min(work);
            let energy = feature.energy.max(SimScalar::ZERO).min(work);
            feature.metal -= metal;
            feature.energy -= energy;
            let (position, exhausted) = (feature.position, feature.is_exhausted());
            sim.add_resource_delta(unit_id, energy, metal, energy, metal);
            if exhausted {
                sim.remove_feature(id);
            }
            (position, exhausted)
        }
        ReclaimTarget::Unit(id) => {
            let Some(victim) = sim.units.get_mut(id).filter(|u| u.is_alive()) else {
                stop_building(sim, unit_id);
                return OrderProgress::Done;
            };
            let taken = worker_time.min(victim.build_time_completed);
            victim.build_time_completed -= taken;
            let (position, remaining, build_time) = (victim.position, victim.build_time_completed, victim.build_time);
            let unit_type = victim.unit_type.clone();
            let (energy, metal) = sim.database().unit(&unit_type).map_or(
                (SimScalar::ZERO, SimScalar::ZERO),
                |d| {
                    let share = |cost: SimScalar| cost.mul_int(work_as_i32(taken)).div_int(work_as_i32(build_time));
                    (share(d.build_cost_energy), share(d.build_cost_metal))
                },
            );
            sim.add_resource_delta(unit_id, energy, metal, energy, metal);
            if remaining == 0 {
                sim.apply_damage(id, u32::MAX, None);
            }
            (position, remaining == 0)
        }
    };

    if let Some(origin) = origin {
        sim.events.push(GameEvent::Nanolathe {
            unit: unit_id,
            origin,
            target: target_position,
            reverse: true,
        });
    }
    if finished {
        stop_building(sim, unit_id);
        return OrderProgress::Done;
    }
    OrderProgress::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureDefinition, UnitDatabase, YardMapCell};
    use crate::ids::PlayerId;
    use crate::player::{GamePlayerInfo, PlayerControllerType};
    use crate::terrain::MapTerrain;

    fn create_test_sim() -> GameSimulation {
        let builder: UnitDefinition = ron::from_str(
            r#"UnitDefinition(
                unit_name: "ARMCK",
                object_name: "ARMCK",
                footprint_x: 2,
                footprint_z: 2,
                max_slope: 20,
                max_water_depth: 10,
                max_hit_points: 100,
                max_velocity: 65536,
                acceleration: 65536,
                brake_rate: 65536,
                turn_rate: 65535,
                builder: true,
                worker_time: 300,
                build_distance: 6553600,
            )"#,
        )
        .expect("test definition should parse");
        let solar: UnitDefinition = ron::from_str(
            r#"UnitDefinition(
                unit_name: "ARMSOLAR",
                object_name: "ARMSOLAR",
                footprint_x: 2,
                footprint_z: 2,
                max_hit_points: 100,
                build_time: 50,
                build_cost_energy: 3276800,
                build_cost_metal: 655360,
            )"#,
        )
        .expect("test definition should parse");
        let mut factory = builder.clone();
        factory.unit_name = "ARMLAB".to_string();
        factory.object_name = "ARMLAB".to_string();
        factory.max_velocity = SimScalar::ZERO;
        factory.footprint_x = 4;
        factory.footprint_z = 4;
        factory.yard_map = Some(vec![YardMapCell::PassableWhenOpen; 16]);
        let rock: FeatureDefinition = ron::from_str(
            r#"FeatureDefinition(
                name: "ROCK1",
                footprint_x: 1,
                footprint_z: 1,
                blocking: true,
                reclaimable: true,
                metal: 1310720,
            )"#,
        )
        .expect("test feature should parse");

        let mut database = UnitDatabase::new();
        database.add_unit(builder);
        database.add_unit(solar);
        database.add_unit(factory);
        database.add_feature(rock);
        let mut sim = GameSimulation::new(MapTerrain::flat(33, 33, 20, SimScalar::ZERO), Arc::new(database), 9);
        sim.add_player(GamePlayerInfo::new(
            PlayerControllerType::Human,
            "ARM",
            0,
            SimScalar::from_int(1000),
            SimScalar::from_int(1000),
        ));
        sim
    }

    fn run_order(sim: &mut GameSimulation, id: UnitId, order: UnitOrder, ticks: usize) {
        let mut pathfinder = crate::pathfinding::PathFindingService::new();
        sim.unit_mut(id).unwrap().orders.push_back(order);
        for _ in 0..ticks {
            sim.tick(&mut pathfinder);
        }
    }

    #[test]
    fn test_mobile_builder_builds_structure_in_range() {
        let mut sim = create_test_sim();
        let builder = sim.spawn_unit("ARMCK", PlayerId(0), SimVector::from_ints(128, 0, 128)).unwrap();
        let order = UnitOrder::Build {
            unit_type: "ARMSOLAR".to_string(),
            position: SimVector::from_ints(128, 0, 192),
        };
        run_order(&mut sim, builder, order, 30);

        let solar = sim
            .units
            .iter()
            .find(|(_, u)| u.unit_type == "ARMSOLAR")
            .map(|(id, _)| id)
            .expect("structure should have been placed");
        assert!(!sim.unit(solar).unwrap().is_being_built());
        assert!(sim.unit(builder).unwrap().orders.is_empty());
        assert!(!sim.unit(builder).unwrap().in_build_stance);
        // 50 energy and 10 metal spent.
        let player = sim.player(PlayerId(0)).unwrap();
        assert_eq!(player.energy.current, SimScalar::from_int(950));
        assert_eq!(player.metal.current, SimScalar::from_int(990));
    }

    #[test]
    fn test_build_on_blocked_site_fails() {
        let mut sim = create_test_sim();
        let builder = sim.spawn_unit("ARMCK", PlayerId(0), SimVector::from_ints(128, 0, 128)).unwrap();
        sim.spawn_feature("ROCK1", SimVector::from_ints(136, 0, 200)).unwrap();
        let order = UnitOrder::Build {
            unit_type: "ARMSOLAR".to_string(),
            position: SimVector::from_ints(128, 0, 192),
        };
        run_order(&mut sim, builder, order, 5);
        assert!(sim.units.iter().all(|(_, u)| u.unit_type != "ARMSOLAR"));
        assert!(sim.unit(builder).unwrap().orders.is_empty());
    }

    #[test]
    fn test_factory_builds_and_releases_unit() {
        let mut sim = create_test_sim();
        let lab = sim.spawn_unit("ARMLAB", PlayerId(0), SimVector::from_ints(256, 0, 256)).unwrap();
        let order = UnitOrder::Build {
            unit_type: "ARMCK".to_string(),
            position: SimVector::ZERO,
        };
        run_order(&mut sim, lab, order, 10);

        let (_, new_unit) = sim
            .units
            .iter()
            .find(|(id, _)| *id != lab)
            .expect("factory should have produced a unit");
        assert!(!new_unit.is_being_built());
        assert!(matches!(new_unit.orders.front(), Some(UnitOrder::Move(_))) || new_unit.position.z > SimScalar::from_int(256));
        assert!(sim.unit(lab).unwrap().orders.is_empty());
        assert!(!sim.unit(lab).unwrap().activated);
    }

    #[test]
    fn test_reclaim_feature_credits_metal() {
        let mut sim = create_test_sim();
        let builder = sim.spawn_unit("ARMCK", PlayerId(0), SimVector::from_ints(128, 0, 128)).unwrap();
        let rock = sim.spawn_feature("ROCK1", SimVector::from_ints(136, 0, 168)).unwrap();
        // Make room in storage.
        sim.players[0].metal.current = SimScalar::from_int(900);
        run_order(&mut sim, builder, UnitOrder::Reclaim(ReclaimTarget::Feature(rock)), 10);
        assert!(!sim.features.contains(rock));
        assert_eq!(sim.player(PlayerId(0)).unwrap().metal.current, SimScalar::from_int(920));
        assert!(sim.unit(builder).unwrap().orders.is_empty());
    }
}
