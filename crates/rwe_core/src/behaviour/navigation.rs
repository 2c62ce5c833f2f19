//! Navigation state machine: request paths, follow waypoints.

use crate::constants::{PATH_RECOMPUTE_TICKS, WAYPOINT_ARRIVAL_DISTANCE};
use crate::grid::Point;
use crate::ids::UnitId;
use crate::math::SimVector;
use crate::simulation::GameSimulation;
use crate::terrain::MapTerrain;
use crate::unit::{
    MovingState, NavigationGoal, NavigationState, PathType, SteeringInfo, UnitPhysicsInfo, UnitState,
};

use super::steering;

/// Progress toward a navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Still travelling or waiting for a path.
    InProgress,
    /// Reached the goal.
    Arrived,
    /// Reached the end of a partial path; the goal is unreachable.
    GaveUp,
}

enum Step {
    Wait,
    Steer { waypoint: SimVector, is_final: bool },
    Finished(PathType),
}

/// Set a ground unit's steering. Aircraft ignore it.
pub(crate) fn set_steering(unit: &mut UnitState, info: SteeringInfo) {
    if let UnitPhysicsInfo::Ground(ground) = &mut unit.physics {
        ground.steering = info;
    }
}

/// Drop any navigation goal and bring the unit to a halt.
pub fn stop_navigation(unit: &mut UnitState) {
    unit.navigation_state = NavigationState::Idle;
    let info = steering::stop(unit);
    set_steering(unit, info);
    if let UnitPhysicsInfo::Air(air) = &mut unit.physics {
        air.target = None;
    }
}

/// Drive a unit toward `goal` for one tick.
pub fn navigate_to(sim: &mut GameSimulation, unit_id: UnitId, goal: NavigationGoal) -> NavigationOutcome {
    let now = sim.game_time;
    let Some(unit) = sim.units.get_mut(unit_id) else {
        return NavigationOutcome::GaveUp;
    };
    if unit.is_air() {
        return navigate_air(unit, &sim.terrain, goal);
    }

    let on_course = matches!(&unit.navigation_state, NavigationState::Moving(m) if m.goal == goal);
    if !on_course {
        unit.navigation_state = NavigationState::Moving(MovingState {
            goal,
            path: None,
            path_creation_time: now,
            path_requested: true,
        });
        let info = steering::stop(unit);
        set_steering(unit, info);
        sim.request_path(unit_id);
        return NavigationOutcome::InProgress;
    }

    let position = unit.position;
    let NavigationState::Moving(moving) = &mut unit.navigation_state else {
        return NavigationOutcome::GaveUp;
    };
    let stale = !moving.path_requested && now.since(moving.path_creation_time) >= PATH_RECOMPUTE_TICKS;
    let arrival_squared = WAYPOINT_ARRIVAL_DISTANCE.squared();
    let step = match moving.path.as_mut() {
        None => Step::Wait,
        Some(path) => match path.current_waypoint() {
            None => Step::Finished(path.path_type),
            Some(waypoint) if (waypoint - position).xz().length_squared() < arrival_squared => {
                if path.is_final_waypoint() {
                    Step::Finished(path.path_type)
                } else {
                    path.next_waypoint += 1;
                    match path.current_waypoint() {
                        Some(next) => Step::Steer {
                            waypoint: next,
                            is_final: path.is_final_waypoint(),
                        },
                        None => Step::Finished(path.path_type),
                    }
                }
            }
            Some(waypoint) => Step::Steer {
                waypoint,
                is_final: path.is_final_waypoint(),
            },
        },
    };

    let outcome = match step {
        Step::Wait => {
            let info = steering::stop(unit);
            set_steering(unit, info);
            NavigationOutcome::InProgress
        }
        Step::Steer { waypoint, is_final } => {
            let info = if is_final {
                steering::arrive(unit, waypoint)
            } else {
                steering::seek(unit, waypoint)
            };
            set_steering(unit, info);
            NavigationOutcome::InProgress
        }
        Step::Finished(path_type) => {
            stop_navigation(unit);
            return match path_type {
                PathType::Complete => NavigationOutcome::Arrived,
                PathType::Partial => NavigationOutcome::GaveUp,
            };
        }
    };
    if stale {
        sim.request_path(unit_id);
    }
    outcome
}

/// Aircraft fly straight at the goal; no pathfinding.
fn navigate_air(unit: &mut UnitState, terrain: &MapTerrain, goal: NavigationGoal) -> NavigationOutcome {
    let target = match goal {
        NavigationGoal::Position(position) => position,
        NavigationGoal::Rect(rect) => {
            // Just past the rectangle's far edge.
            let cell = Point::new(rect.right() + unit.footprint_x, rect.y() + rect.height() / 2);
            terrain.heightmap_to_world_space(cell)
        }
    };
    let arrival_squared = WAYPOINT_ARRIVAL_DISTANCE.squared();
    if (target - unit.position).xz().length_squared() < arrival_squared {
        stop_navigation(unit);
        return NavigationOutcome::Arrived;
    }
    unit.navigation_state = NavigationState::Moving(MovingState {
        goal,
        path: None,
        path_creation_time: crate::ids::GameTime(0),
        path_requested: false,
    });
    if let UnitPhysicsInfo::Air(air) = &mut unit.physics {
        air.target = Some(target);
    }
    NavigationOutcome::InProgress
}
