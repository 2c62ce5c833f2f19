//! Per-instance unit state.
//!
//! A [`UnitState`] pairs the immutable [`UnitDefinition`] (looked up by
//! `unit_type`) with everything that changes while the unit lives: pose,
//! motion, orders, behaviour, weapons, economy and the unit's script
//! environment.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cob::{CobEnvironment, CobScript, ThreadId};
use crate::constants::WEAPON_SLOTS;
use crate::data::{MovementClass, UnitDefinition, UnitModelDefinition};
use crate::grid::DiscreteRect;
use crate::ids::{FeatureId, GameTime, PlayerId, UnitId};
use crate::math::{SimAngle, SimBox, SimScalar, SimVector};
use crate::terrain::MapTerrain;
use crate::unit_mesh::UnitMesh;

/// When a unit may open fire on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FireOrders {
    /// Never fire without an explicit attack order.
    HoldFire,
    /// Fire back at the last attacker.
    ReturnFire,
    /// Engage the nearest enemy in range.
    #[default]
    FireAtWill,
}

impl FireOrders {
    /// Value scripts see for `STANDING_FIRE_ORDERS`.
    #[must_use]
    pub const fn to_cob(self) -> i32 {
        match self {
            Self::HoldFire => 0,
            Self::ReturnFire => 1,
            Self::FireAtWill => 2,
        }
    }

    /// Fire orders from a script value. Unknown values fire at will.
    #[must_use]
    pub const fn from_cob(value: i32) -> Self {
        match value {
            0 => Self::HoldFire,
            1 => Self::ReturnFire,
            _ => Self::FireAtWill,
        }
    }
}

/// Alive or dead. Dead units are erased on the following tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifeState {
    /// Alive.
    #[default]
    Alive,
    /// Dead, awaiting removal.
    Dead,
}

/// Something a unit can shoot at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackTarget {
    /// Another unit.
    Unit(UnitId),
    /// A point on the ground.
    Ground(SimVector),
}

/// Something a builder can reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReclaimTarget {
    /// A unit, friendly or not.
    Unit(UnitId),
    /// A map feature.
    Feature(FeatureId),
}

/// One queued instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOrder {
    /// Travel to a position.
    Move(SimVector),
    /// Attack a unit or a ground position.
    Attack(AttackTarget),
    /// Build a new unit of `unit_type`. Factories ignore `position`.
    Build {
        /// Type to build.
        unit_type: String,
        /// Centre of the new unit.
        position: SimVector,
    },
    /// Get out of the given footprint.
    BuggerOff(DiscreteRect),
    /// Help finish an unfinished unit.
    CompleteBuild(UnitId),
    /// Dismantle a feature or unit for resources.
    Reclaim(ReclaimTarget),
}

/// Where a unit is trying to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationGoal {
    /// A point; the path ends on it.
    Position(SimVector),
    /// A rectangle; the path ends next to it.
    Rect(DiscreteRect),
}

/// Whether a path reaches its goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathType {
    /// Reaches the goal.
    Complete,
    /// Best effort; the goal was unreachable or the search ran out of budget.
    Partial,
}

/// A path being followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitPath {
    /// Waypoints in travel order.
    pub waypoints: Vec<SimVector>,
    /// Whether the path reaches the goal.
    pub path_type: PathType,
    /// Index of the waypoint currently steered toward.
    pub next_waypoint: usize,
}

impl UnitPath {
    /// Path starting at its first waypoint.
    #[must_use]
    pub fn new(waypoints: Vec<SimVector>, path_type: PathType) -> Self {
        Self {
            waypoints,
            path_type,
            next_waypoint: 0,
        }
    }

    /// Waypoint currently steered toward.
    #[must_use]
    pub fn current_waypoint(&self) -> Option<SimVector> {
        self.waypoints.get(self.next_waypoint).copied()
    }

    /// True if the current waypoint is the last one.
    #[must_use]
    pub fn is_final_waypoint(&self) -> bool {
        self.next_waypoint + 1 >= self.waypoints.len()
    }
}

/// Navigation progress toward a goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovingState {
    /// The goal.
    pub goal: NavigationGoal,
    /// Current path, once the pathfinder has delivered one.
    pub path: Option<UnitPath>,
    /// Tick on which `path` was computed.
    pub path_creation_time: GameTime,
    /// A request is queued with the pathfinder.
    pub path_requested: bool,
}

/// Pathfinding state, tracked independently of behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NavigationState {
    /// Not going anywhere.
    #[default]
    Idle,
    /// Travelling to a goal.
    Moving(MovingState),
}

/// Outcome of a deferred unit creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCreationStatus {
    /// Not processed yet.
    Pending,
    /// Created.
    Done(UnitId),
    /// The footprint was blocked.
    Failed,
}

/// What a unit is doing about its current order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviourState {
    /// Nothing.
    #[default]
    Idle,
    /// Travelling.
    Moving {
        /// Where to.
        goal: NavigationGoal,
    },
    /// Waiting for the simulation to create a unit.
    CreatingUnit {
        /// Type being created.
        unit_type: String,
        /// Owner of the new unit.
        owner: PlayerId,
        /// Where it is created.
        position: SimVector,
        /// Creation outcome.
        status: UnitCreationStatus,
    },
    /// Nanolathing an unfinished unit.
    Building {
        /// Unit under construction.
        target: UnitId,
        /// World position of the nano piece, if the script reported one.
        nano_origin: Option<SimVector>,
    },
    /// Dismantling a feature or unit.
    Reclaiming {
        /// What is being reclaimed.
        target: ReclaimTarget,
        /// World position of the nano piece, if the script reported one.
        nano_origin: Option<SimVector>,
    },
}

/// Desired heading and speed produced by steering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SteeringInfo {
    /// Heading to turn toward.
    pub target_angle: SimAngle,
    /// Speed to accelerate or brake toward.
    pub target_speed: SimScalar,
}

/// Motion state of a ground unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroundPhysics {
    /// Latest steering output.
    pub steering: SteeringInfo,
    /// Speed along the facing direction.
    pub current_speed: SimScalar,
}

/// Flight phase of an aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AirMovementState {
    /// On the ground, occupying its footprint.
    #[default]
    Landed,
    /// Climbing to cruise altitude.
    TakingOff,
    /// At cruise altitude.
    Flying,
    /// Descending to land.
    Landing,
}

/// Motion state of an aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AirPhysics {
    /// Flight phase.
    pub state: AirMovementState,
    /// Velocity in world units per tick.
    pub velocity: SimVector,
    /// Position being flown toward, if any.
    pub target: Option<SimVector>,
}

/// Ground or air motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitPhysicsInfo {
    /// Ground unit.
    Ground(GroundPhysics),
    /// Aircraft.
    Air(AirPhysics),
}

/// Aiming progress of a weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AimState {
    /// No aim requested.
    #[default]
    Idle,
    /// An aim script thread is running.
    Aiming {
        /// The aim thread.
        thread: ThreadId,
        /// Heading passed to the script, relative to the unit's facing.
        heading: SimAngle,
        /// Pitch passed to the script.
        pitch: SimAngle,
    },
    /// The script reported the weapon aimed.
    Aimed {
        /// Heading aimed at.
        heading: SimAngle,
        /// Pitch aimed at.
        pitch: SimAngle,
    },
}

/// One weapon slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitWeapon {
    /// Weapon definition name.
    pub weapon_type: String,
    /// Current target.
    pub target: Option<AttackTarget>,
    /// Aim progress toward the target.
    pub aim: AimState,
    /// First tick on which the weapon may fire again.
    pub ready_time: GameTime,
}

impl UnitWeapon {
    /// Idle weapon of the given type.
    #[must_use]
    pub fn new(weapon_type: &str) -> Self {
        Self {
            weapon_type: weapon_type.to_string(),
            target: None,
            aim: AimState::Idle,
            ready_time: GameTime(0),
        }
    }

    /// Drop the target and any aim in progress.
    pub fn clear_target(&mut self) {
        self.target = None;
        self.aim = AimState::Idle;
    }
}

/// Resource figures for one resource type of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitResourceFlow {
    /// Produced per tick when running.
    pub make: SimScalar,
    /// Consumed per tick when running.
    pub used: SimScalar,
    /// Storage contributed to the owner.
    pub storage: SimScalar,
    /// Produced during the last tick.
    pub production_buffer: SimScalar,
    /// Consumed during the last tick.
    pub consumption_buffer: SimScalar,
}

/// A unit in play.
#[derive(Debug, Clone)]
pub struct UnitState {
    /// Definition name.
    pub unit_type: String,
    /// Owning player.
    pub owner: PlayerId,

    /// Position of the footprint centre at ground level (or in the air).
    pub position: SimVector,
    /// Position at the start of the tick.
    pub previous_position: SimVector,
    /// Facing; zero faces +Z.
    pub rotation: SimAngle,
    /// Facing at the start of the tick.
    pub previous_rotation: SimAngle,

    /// Ground or air motion state.
    pub physics: UnitPhysicsInfo,
    /// Maximum rotation per tick.
    pub turn_rate: SimAngle,
    /// Top speed.
    pub max_speed: SimScalar,
    /// Speed gained per tick.
    pub acceleration: SimScalar,
    /// Speed lost per tick when braking.
    pub brake_rate: SimScalar,
    /// Altitude above terrain while flying.
    pub cruise_altitude: SimScalar,
    /// The last move was blocked.
    pub in_collision: bool,

    /// Footprint width in cells.
    pub footprint_x: i32,
    /// Footprint depth in cells.
    pub footprint_z: i32,
    /// Terrain restrictions.
    pub movement_class: MovementClass,

    /// Remaining health.
    pub hit_points: u32,
    /// Full health.
    pub max_hit_points: u32,
    /// Alive or dead.
    pub life_state: LifeState,
    /// Work units applied so far.
    pub build_time_completed: u32,
    /// Work units needed.
    pub build_time: u32,

    /// Queued orders, front first.
    pub orders: VecDeque<UnitOrder>,
    /// What the unit is doing about the front order.
    pub behaviour_state: BehaviourState,
    /// Pathfinding state.
    pub navigation_state: NavigationState,
    /// Script says the unit is ready to build.
    pub in_build_stance: bool,
    /// Script opened the yard.
    pub yard_open: bool,
    /// Switched on.
    pub activated: bool,
    /// Script busy flag.
    pub busy: bool,
    /// Script armored flag.
    pub armored: bool,
    /// The unit's energy demand was met last tick.
    pub is_sufficiently_powered: bool,

    /// Energy figures.
    pub energy: UnitResourceFlow,
    /// Metal figures.
    pub metal: UnitResourceFlow,

    /// Weapon slots.
    pub weapons: [Option<UnitWeapon>; WEAPON_SLOTS],
    /// Standing fire orders.
    pub fire_orders: FireOrders,
    /// Last unit to damage this one.
    pub last_attacker: Option<UnitId>,
    /// Units destroyed by this one.
    pub kills: u32,

    /// Animated pieces.
    pub mesh: UnitMesh,
    /// Selection and hit box relative to `position`.
    pub selection_box: SimBox,
    /// Script environment. Taken out only while the unit's scripts run.
    pub cob_environment: Option<CobEnvironment>,
}

impl UnitState {
    /// Fresh, fully built unit of the given definition.
    #[must_use]
    pub fn new(
        definition: &UnitDefinition,
        model: Option<&UnitModelDefinition>,
        script: Option<Arc<CobScript>>,
        movement_class: MovementClass,
        owner: PlayerId,
        position: SimVector,
    ) -> Self {
        let script = script.unwrap_or_default();
        let piece_names: Vec<String> = if script.pieces.is_empty() {
            model
                .map(|m| m.pieces.iter().map(|p| p.name.clone()).collect())
                .unwrap_or_default()
        } else {
            script.pieces.clone()
        };
        let mesh = UnitMesh::new(&piece_names, model);
        let selection_box = model.map_or_else(
            || {
                let half_x = SimScalar::from_int(definition.footprint_x * 8);
                let half_z = SimScalar::from_int(definition.footprint_z * 8);
                SimBox::new(
                    SimVector::new(-half_x, SimScalar::ZERO, -half_z),
                    SimVector::new(half_x, half_x.max(half_z), half_z),
                )
            },
            |m| SimBox::new(m.selection_min, m.selection_max),
        );

        let physics = if definition.can_fly {
            UnitPhysicsInfo::Air(AirPhysics::default())
        } else {
            UnitPhysicsInfo::Ground(GroundPhysics {
                steering: SteeringInfo::default(),
                current_speed: SimScalar::ZERO,
            })
        };

        let mut weapons: [Option<UnitWeapon>; WEAPON_SLOTS] = Default::default();
        for (slot, weapon) in weapons.iter_mut().enumerate() {
            *weapon = definition.weapon(slot).map(UnitWeapon::new);
        }

        Self {
            unit_type: definition.unit_name.clone(),
            owner,
            position,
            previous_position: position,
            rotation: SimAngle::ZERO,
            previous_rotation: SimAngle::ZERO,
            physics,
            turn_rate: definition.turn_rate,
            max_speed: definition.max_velocity,
            acceleration: definition.acceleration,
            brake_rate: definition.brake_rate,
            cruise_altitude: definition.cruise_altitude,
            in_collision: false,
            footprint_x: definition.footprint_x,
            footprint_z: definition.footprint_z,
            movement_class,
            hit_points: definition.max_hit_points,
            max_hit_points: definition.max_hit_points,
            life_state: LifeState::Alive,
            build_time_completed: definition.build_time,
            build_time: definition.build_time.max(1),
            orders: VecDeque::new(),
            behaviour_state: BehaviourState::Idle,
            navigation_state: NavigationState::Idle,
            in_build_stance: false,
            yard_open: false,
            activated: false,
            busy: false,
            armored: false,
            is_sufficiently_powered: true,
            energy: UnitResourceFlow {
                make: definition.energy_make,
                used: definition.energy_use,
                storage: definition.energy_storage,
                ..UnitResourceFlow::default()
            },
            metal: UnitResourceFlow {
                make: definition.metal_make,
                used: definition.metal_use,
                storage: definition.metal_storage,
                ..UnitResourceFlow::default()
            },
            weapons,
            fire_orders: definition.default_fire_orders,
            last_attacker: None,
            kills: 0,
            mesh,
            selection_box,
            cob_environment: Some(CobEnvironment::new(script)),
        }
    }

    /// Mark the unit as a fresh construction site with one hit point.
    pub fn start_as_unbuilt(&mut self) {
        self.build_time_completed = 0;
        self.hit_points = 1;
    }

    /// True until the unit dies.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.life_state == LifeState::Alive
    }

    /// True once the unit has died.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.life_state == LifeState::Dead
    }

    /// True while construction is unfinished.
    #[must_use]
    pub fn is_being_built(&self) -> bool {
        self.build_time_completed < self.build_time
    }

    /// Percentage of construction still to do, 0 to 100.
    #[must_use]
    pub fn build_percent_left(&self) -> u32 {
        let left = self.build_time - self.build_time_completed.min(self.build_time);
        ((u64::from(left) * 100) / u64::from(self.build_time)) as u32
    }

    /// Health as a percentage of full health.
    #[must_use]
    pub fn health_percent(&self) -> u32 {
        if self.max_hit_points == 0 {
            return 0;
        }
        ((u64::from(self.hit_points) * 100) / u64::from(self.max_hit_points)) as u32
    }

    /// True if `player` owns this unit.
    #[must_use]
    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner == player
    }

    /// True for aircraft.
    #[must_use]
    pub fn is_air(&self) -> bool {
        matches!(self.physics, UnitPhysicsInfo::Air(_))
    }

    /// True for aircraft that are off the ground.
    #[must_use]
    pub fn is_flying(&self) -> bool {
        matches!(
            self.physics,
            UnitPhysicsInfo::Air(AirPhysics {
                state: AirMovementState::TakingOff | AirMovementState::Flying | AirMovementState::Landing,
                ..
            })
        )
    }

    /// True if the unit can move.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.max_speed > SimScalar::ZERO
    }

    /// Speed along the ground (or through the air).
    #[must_use]
    pub fn current_speed(&self) -> SimScalar {
        match self.physics {
            UnitPhysicsInfo::Ground(ground) => ground.current_speed,
            UnitPhysicsInfo::Air(air) => air.velocity.xz().length(),
        }
    }

    /// Footprint rectangle at the unit's current position.
    #[must_use]
    pub fn footprint_rect(&self, terrain: &MapTerrain) -> DiscreteRect {
        terrain.footprint_rect(self.position, self.footprint_x, self.footprint_z)
    }

    /// Footprint rectangle if the unit stood at `position`.
    #[must_use]
    pub fn footprint_rect_at(&self, terrain: &MapTerrain, position: SimVector) -> DiscreteRect {
        terrain.footprint_rect(position, self.footprint_x, self.footprint_z)
    }

    /// Selection box in world space.
    #[must_use]
    pub fn world_selection_box(&self) -> SimBox {
        self.selection_box.translated(self.position)
    }

    /// Direction the unit faces, on the XZ plane.
    #[must_use]
    pub fn facing(&self) -> SimVector {
        SimVector::from_heading(self.rotation)
    }

    /// World position of a piece, ignoring rotations of parent pieces.
    #[must_use]
    pub fn piece_world_position(&self, piece: usize) -> SimVector {
        let local = self.mesh.piece_local_offset(piece);
        let (sin, cos) = (self.rotation.sin(), self.rotation.cos());
        let x = local.x * cos + local.z * sin;
        let z = local.z * cos - local.x * sin;
        self.position + SimVector::new(x, local.y, z)
    }

    /// Apply damage. Returns true if this killed the unit.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        if self.is_dead() {
            return false;
        }
        self.hit_points = self.hit_points.saturating_sub(amount);
        if self.hit_points == 0 {
            self.life_state = LifeState::Dead;
            return true;
        }
        false
    }

    /// Weapon slots that hold a weapon.
    pub fn weapon_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.weapons
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_some())
            .map(|(slot, _)| slot)
    }
}
