//! Target acquisition, aiming and firing.
//!
//! Each weapon slot runs a small state machine. A target is chosen (or
//! kept), the unit script's `Aim*` function is started with the heading
//! and pitch relative to the unit, and once the script reports the weapon
//! aimed it fires whenever the reload time allows. Scripts that lack an
//! aim function count as aimed immediately.

use std::sync::Arc;

use tracing::trace;

use crate::constants::{GRAVITY, WEAPON_SLOTS};
use crate::data::WeaponDefinition;
use crate::events::GameEvent;
use crate::ids::UnitId;
use crate::math::{angle_between, atan, atan2, SimAngle, SimScalar, SimVector, WideScalar};
use crate::projectile::ballistic_launch_tangent;
use crate::simulation::GameSimulation;
use crate::unit::{AimState, AttackTarget, FireOrders, UnitWeapon};

const SLOT_NAMES: [&str; WEAPON_SLOTS] = ["Primary", "Secondary", "Tertiary"];

/// Script function name for a slot, e.g. `AimPrimary`.
fn script_name(prefix: &str, slot: usize) -> String {
    format!("{prefix}{}", SLOT_NAMES[slot])
}

/// Update every weapon slot of a unit.
pub fn update(sim: &mut GameSimulation, unit_id: UnitId) {
    for slot in 0..WEAPON_SLOTS {
        update_weapon(sim, unit_id, slot);
    }
}

/// Point every weapon at `target`.
pub fn set_target(sim: &mut GameSimulation, unit_id: UnitId, target: AttackTarget) {
    if let Some(unit) = sim.units.get_mut(unit_id) {
        for weapon in unit.weapons.iter_mut().flatten() {
            if weapon.target != Some(target) {
                weapon.target = Some(target);
                weapon.aim = AimState::Idle;
            }
        }
    }
}

/// Drop every weapon's target.
pub fn clear_targets(sim: &mut GameSimulation, unit_id: UnitId) {
    if let Some(unit) = sim.units.get_mut(unit_id) {
        for weapon in unit.weapons.iter_mut().flatten() {
            weapon.clear_target();
        }
    }
}

/// Longest range among the unit's weapons, zero if unarmed.
#[must_use]
pub fn max_range(sim: &GameSimulation, unit_id: UnitId) -> SimScalar {
    let Some(unit) = sim.units.get(unit_id) else {
        return SimScalar::ZERO;
    };
    unit.weapons
        .iter()
        .flatten()
        .filter_map(|w| sim.database().weapon(&w.weapon_type))
        .map(|w| w.max_range)
        .fold(SimScalar::ZERO, SimScalar::max)
}

fn in_range(from: SimVector, to: SimVector, range: SimScalar) -> bool {
    (to - from).xz().length_squared() <= range.squared()
}

/// Heading (relative to the unit) and pitch needed to hit `target`.
/// `None` if a ballistic weapon cannot reach it.
fn firing_solution(
    weapon: &WeaponDefinition,
    origin: SimVector,
    rotation: SimAngle,
    target: SimVector,
) -> Option<(SimAngle, SimAngle)> {
    let delta = target - origin;
    let heading = delta.xz().heading() - rotation;
    let horizontal = delta.xz().length();
    let pitch = if weapon.is_ballistic() {
        atan(ballistic_launch_tangent(weapon.velocity, GRAVITY, horizontal, delta.y)?)
    } else {
        atan2(delta.y, horizontal)
    };
    Some((heading, pitch))
}

/// Pick a target according to the unit's fire orders.
fn acquire_target(sim: &GameSimulation, unit_id: UnitId, range: SimScalar) -> Option<AttackTarget> {
    let unit = sim.units.get(unit_id)?;
    let is_enemy_in_range = |id: UnitId| {
        sim.units
            .get(id)
            .is_some_and(|other| other.is_alive() && other.owner != unit.owner && in_range(unit.position, other.position, range))
    };
    match unit.fire_orders {
        FireOrders::HoldFire => None,
        FireOrders::ReturnFire => unit
            .last_attacker
            .filter(|&id| is_enemy_in_range(id))
            .map(AttackTarget::Unit),
        FireOrders::FireAtWill => {
            let mut best: Option<(WideScalar, UnitId)> = None;
            for (id, other) in sim.units.iter() {
                if id == unit_id || !is_enemy_in_range(id) {
                    continue;
                }
                let distance = (other.position - unit.position).xz().length_squared();
                if best.map_or(true, |(d, _)| distance < d) {
                    best = Some((distance, id));
                }
            }
            best.map(|(_, id)| AttackTarget::Unit(id))
        }
    }
}

fn update_weapon(sim: &mut GameSimulation, unit_id: UnitId, slot: usize) {
    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    let Some(weapon) = unit.weapons[slot].as_ref() else {
        return;
    };
    let database = Arc::clone(sim.database());
    let Some(definition) = database.weapon(&weapon.weapon_type) else {
        return;
    };
    let (position, rotation) = (unit.position, unit.rotation);

    let mut target = weapon.target;
    let mut target_position = target.and_then(|t| sim.attack_target_position(&t));
    if target_position.is_none() {
        target = acquire_target(sim, unit_id, definition.max_range);
        target_position = target.and_then(|t| sim.attack_target_position(&t));
    }
    let (Some(target), Some(target_position)) = (target, target_position) else {
        if let Some(weapon) = weapon_mut(sim, unit_id, slot) {
            weapon.clear_target();
        }
        return;
    };
    if !in_range(position, target_position, definition.max_range) {
        if let Some(weapon) = weapon_mut(sim, unit_id, slot) {
            weapon.clear_target();
        }
        return;
    }
    let Some((heading, pitch)) = firing_solution(definition, position, rotation, target_position) else {
        trace!(unit = %unit_id, slot, "target out of ballistic reach");
        if let Some(weapon) = weapon_mut(sim, unit_id, slot) {
            weapon.clear_target();
        }
        return;
    };

    let now = sim.game_time;
    let Some(weapon) = weapon_mut(sim, unit_id, slot) else {
        return;
    };
    weapon.target = Some(target);
    let ready_time = weapon.ready_time;

    match weapon.aim {
        AimState::Idle => {
            let args = vec![i32::from(heading.signed()), i32::from(pitch.signed())];
            let thread = sim.start_unit_script(unit_id, &script_name("Aim", slot), args);
            if let Some(weapon) = weapon_mut(sim, unit_id, slot) {
                weapon.aim = match thread {
                    Some(thread) => AimState::Aiming { thread, heading, pitch },
                    None => AimState::Aimed { heading, pitch },
                };
            }
        }
        AimState::Aiming {
            thread,
            heading: aim_heading,
            pitch: aim_pitch,
        } => {
            let Some(env) = sim.units.get(unit_id).and_then(|u| u.cob_environment.as_ref()) else {
                return;
            };
            let next = match env.thread_result(thread) {
                Some(0) => Some(AimState::Idle),
                Some(_) => Some(AimState::Aimed {
                    heading: aim_heading,
                    pitch: aim_pitch,
                }),
                None if !env.is_thread_running(thread) => Some(AimState::Idle),
                None => None,
            };
            if let (Some(next), Some(weapon)) = (next, weapon_mut(sim, unit_id, slot)) {
                weapon.aim = next;
            }
        }
        AimState::Aimed {
            heading: aim_heading,
            pitch: aim_pitch,
        } => {
            let off_heading = i32::from(angle_between(aim_heading, heading)).abs();
            let off_pitch = i32::from(angle_between(aim_pitch, pitch)).abs();
            if off_heading > i32::from(definition.tolerance.value())
                || off_pitch > i32::from(definition.pitch_tolerance.value())
            {
                weapon.aim = AimState::Idle;
            } else if now >= ready_time {
                fire(sim, unit_id, slot, definition, target, heading, pitch);
            }
        }
    }
}

fn weapon_mut(sim: &mut GameSimulation, unit_id: UnitId, slot: usize) -> Option<&mut UnitWeapon> {
    sim.units.get_mut(unit_id)?.weapons[slot].as_mut()
}

fn fire(
    sim: &mut GameSimulation,
    unit_id: UnitId,
    slot: usize,
    definition: &WeaponDefinition,
    target: AttackTarget,
    heading: SimAngle,
    pitch: SimAngle,
) {
    let energy = -definition.energy_per_shot;
    let metal = -definition.metal_per_shot;
    if !sim.add_resource_delta(unit_id, energy, metal, energy, metal) {
        return;
    }

    let muzzle_piece = sim.query_unit_piece(unit_id, &script_name("Query", slot));
    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    let owner = unit.owner;
    let muzzle = muzzle_piece.map_or(unit.position, |piece| unit.piece_world_position(piece));
    let world_heading = unit.rotation + heading;
    let direction = SimVector::new(
        world_heading.sin() * pitch.cos(),
        pitch.sin(),
        world_heading.cos() * pitch.cos(),
    );

    sim.spawn_projectile(owner, Some(unit_id), definition, muzzle, direction, Some(target));
    sim.start_unit_script(unit_id, &script_name("Fire", slot), Vec::new());
    let ready_time = sim.game_time.plus(definition.reload_time);
    if let Some(weapon) = weapon_mut(sim, unit_id, slot) {
        weapon.ready_time = ready_time;
    }
    sim.events.push(GameEvent::WeaponFired {
        unit: unit_id,
        weapon_type: definition.name.clone(),
        position: muzzle,
    });
}
