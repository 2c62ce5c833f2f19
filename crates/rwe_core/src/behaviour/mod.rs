//! Per-unit behaviour: orders, navigation, motion, weapons and building.
//!
//! [`update`] runs once per unit per tick, in unit id order. It works on
//! the front order of the unit's queue, then integrates motion and runs
//! the weapons. Completed orders are popped; the next one starts on the
//! following tick.

pub mod build;
pub mod navigation;
pub mod physics;
pub mod steering;
pub mod weapons;

use tracing::trace;

use crate::data::UnitDefinition;
use crate::ids::UnitId;
use crate::math::SimScalar;
use crate::simulation::GameSimulation;
use crate::unit::{AttackTarget, BehaviourState, NavigationGoal, NavigationState, UnitOrder};

use navigation::{navigate_to, stop_navigation, NavigationOutcome};

/// Whether the front order is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderProgress {
    /// Keep working on it next tick.
    Continue,
    /// Pop it.
    Done,
}

/// Run one tick of behaviour for a unit.
pub fn update(sim: &mut GameSimulation, unit_id: UnitId) {
    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    if !unit.is_alive() || unit.is_being_built() {
        return;
    }
    sim.update_unit_economy(unit_id);

    let front = sim.units.get(unit_id).and_then(|u| u.orders.front().cloned());
    match front {
        Some(order) => {
            if handle_order(sim, unit_id, &order) == OrderProgress::Done {
                complete_order(sim, unit_id);
            }
        }
        None => {
            if let Some(unit) = sim.units.get_mut(unit_id) {
                if unit.is_mobile() {
                    stop_navigation(unit);
                }
            }
        }
    }

    physics::update(sim, unit_id);
    weapons::update(sim, unit_id);
}

fn complete_order(sim: &mut GameSimulation, unit_id: UnitId) {
    if let Some(unit) = sim.units.get_mut(unit_id) {
        let order = unit.orders.pop_front();
        unit.behaviour_state = BehaviourState::Idle;
        stop_navigation(unit);
        trace!(unit = %unit_id, ?order, "order complete");
    }
}

fn handle_order(sim: &mut GameSimulation, unit_id: UnitId, order: &UnitOrder) -> OrderProgress {
    match order {
        UnitOrder::Move(position) => move_to(sim, unit_id, NavigationGoal::Position(*position)),
        UnitOrder::BuggerOff(rect) => {
            let clear = sim
                .units
                .get(unit_id)
                .map_or(true, |u| !u.footprint_rect(&sim.terrain).intersects(rect));
            if clear {
                OrderProgress::Done
            } else {
                move_to(sim, unit_id, NavigationGoal::Rect(*rect))
            }
        }
        UnitOrder::Attack(target) => attack(sim, unit_id, *target),
        UnitOrder::Build { unit_type, position } => {
            let factory = sim
                .units
                .get(unit_id)
                .and_then(|u| sim.database().unit(&u.unit_type))
                .is_some_and(UnitDefinition::is_factory);
            if factory {
                build::build_factory(sim, unit_id, unit_type)
            } else {
                build::build_mobile(sim, unit_id, unit_type, *position)
            }
        }
        UnitOrder::CompleteBuild(target) => build::complete_build(sim, unit_id, *target),
        UnitOrder::Reclaim(target) => build::reclaim(sim, unit_id, *target),
    }
}

fn move_to(sim: &mut GameSimulation, unit_id: UnitId, goal: NavigationGoal) -> OrderProgress {
    if let Some(unit) = sim.units.get_mut(unit_id) {
        unit.behaviour_state = BehaviourState::Moving { goal };
    }
    match navigate_to(sim, unit_id, goal) {
        NavigationOutcome::InProgress => OrderProgress::Continue,
        NavigationOutcome::Arrived | NavigationOutcome::GaveUp => OrderProgress::Done,
    }
}

/// Chase a target until it dies. Ground attacks last until replaced.
fn attack(sim: &mut GameSimulation, unit_id: UnitId, target: AttackTarget) -> OrderProgress {
    let Some(target_position) = sim.attack_target_position(&target) else {
        return OrderProgress::Done;
    };
    weapons::set_target(sim, unit_id, target);

    let range = weapons::max_range(sim, unit_id);
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return OrderProgress::Done;
    };
    if !unit.is_mobile() {
        return OrderProgress::Continue;
    }
    if (target_position - unit.position).xz().length_squared() <= range.squared() {
        stop_navigation(unit);
        unit.behaviour_state = BehaviourState::Idle;
        return OrderProgress::Continue;
    }

    // Keep chasing the old goal while it stays near the target so a moving
    // target does not trigger a repath every tick.
    let slack = range.div_int(2).max(SimScalar::ONE);
    let goal = match &unit.navigation_state {
        NavigationState::Moving(moving) => match moving.goal {
            NavigationGoal::Position(goal) if (goal - target_position).xz().length_squared() <= slack.squared() => {
                moving.goal
            }
            _ => NavigationGoal::Position(target_position),
        },
        NavigationState::Idle => NavigationGoal::Position(target_position),
    };
    unit.behaviour_state = BehaviourState::Moving { goal };
    navigate_to(sim, unit_id, goal);
    OrderProgress::Continue
}

/// Abandon every order and whatever the unit is doing about them.
pub fn clear_orders(sim: &mut GameSimulation, unit_id: UnitId) {
    let Some(unit) = sim.units.get(unit_id) else {
        return;
    };
    if matches!(
        unit.behaviour_state,
        BehaviourState::Building { .. } | BehaviourState::Reclaiming { .. }
    ) {
        build::stop_building(sim, unit_id);
    }
    weapons::clear_targets(sim, unit_id);
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return;
    };
    unit.orders.clear();
    unit.behaviour_state = BehaviourState::Idle;
    stop_navigation(unit);
    let (activated, unit_type) = (unit.activated, unit.unit_type.clone());
    if activated && sim.database().unit(&unit_type).is_some_and(UnitDefinition::is_factory) {
        set_activation(sim, unit_id, false);
    }
}

/// Switch a unit on or off, running its `Activate` or `Deactivate` script.
///
/// A factory without the script opens or closes its yard directly and
/// enters or leaves its build stance with it.
pub fn set_activation(sim: &mut GameSimulation, unit_id: UnitId, on: bool) {
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return;
    };
    if unit.activated == on {
        return;
    }
    unit.activated = on;
    let unit_type = unit.unit_type.clone();
    let factory = sim.database().unit(&unit_type).is_some_and(UnitDefinition::is_factory);
    let script = if on { "Activate" } else { "Deactivate" };
    if sim.start_unit_script(unit_id, script, Vec::new()).is_none() && factory {
        sim.try_set_yard_open(unit_id, on);
        if let Some(unit) = sim.units.get_mut(unit_id) {
            unit.in_build_stance = on;
        }
    }
    trace!(unit = %unit_id, on, "activation changed");
}
