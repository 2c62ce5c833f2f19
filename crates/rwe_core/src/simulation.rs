//! The simulation aggregate and its fixed-order tick.
//!
//! [`GameSimulation`] owns everything that must be identical on every peer:
//! terrain, occupancy, players, units, features, projectiles, pending path
//! requests and the scene random number generator. One call to
//! [`GameSimulation::tick`] advances the world by exactly one tick.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (everything is [`SimScalar`] or [`SimAngle`])
//! - No system randomness (the scene RNG is a seeded [`ChaCha8Rng`])
//! - Units, features and projectiles are visited in id order
//! - Hashed containers are summed, so their order never matters
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rwe_core::data::UnitDatabase;
//! use rwe_core::math::SimScalar;
//! use rwe_core::pathfinding::PathFindingService;
//! use rwe_core::simulation::GameSimulation;
//! use rwe_core::terrain::MapTerrain;
//!
//! let terrain = MapTerrain::flat(64, 64, 20, SimScalar::ZERO);
//! let mut sim = GameSimulation::new(terrain, Arc::new(UnitDatabase::new()), 42);
//! let mut pathfinder = PathFindingService::new();
//! sim.tick(&mut pathfinder);
//! assert_eq!(sim.game_time.0, 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::behaviour;
use crate::command::PlayerUnitCommand;
use crate::data::{UnitDatabase, WeaponDefinition};
use crate::error::{GameError, Result};
use crate::events::GameEvent;
use crate::feature::MapFeature;
use crate::grid::DiscreteRect;
use crate::hash::{combine, FieldHasher, GameHash, SimHash};
use crate::ids::{FeatureId, FeatureTag, GameTime, PlayerId, ProjectileId, ProjectileTag, UnitId, UnitTag};
use crate::math::{SimScalar, SimVector};
use crate::movement::{ad_hoc_movement_class, MovementClassCollisionService};
use crate::occupancy::{OccupancyGrid, OccupiedCell};
use crate::pathfinding::{PathFindingService, PathRequest};
use crate::player::{GamePlayerInfo, PlayerStatus};
use crate::projectile::{Projectile, ProjectilePhysics};
use crate::terrain::{Line3x, MapTerrain};
use crate::unit::{AttackTarget, NavigationState, UnitState};
use crate::vector_map::VectorMap;

/// Outcome of the match so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinStatus {
    /// More than one player is still alive.
    Undecided,
    /// Exactly one player is alive.
    Won(PlayerId),
    /// Nobody is alive.
    Draw,
}

/// The complete deterministic game state.
pub struct GameSimulation {
    /// Ticks elapsed since the match started.
    pub game_time: GameTime,
    /// Heightmap.
    pub terrain: MapTerrain,
    /// Which unit or feature stands on each heightmap cell.
    pub occupancy: OccupancyGrid,
    /// Players, indexed by [`PlayerId`].
    pub players: Vec<GamePlayerInfo>,
    /// Units.
    pub units: VectorMap<UnitState, UnitTag>,
    /// Map features.
    pub features: VectorMap<MapFeature, FeatureTag>,
    /// Projectiles in flight.
    pub projectiles: VectorMap<Projectile, ProjectileTag>,
    /// Pending path requests, oldest first.
    pub path_requests: VecDeque<PathRequest>,
    /// Events produced since the last drain.
    pub events: Vec<GameEvent>,
    pub(crate) rng: ChaCha8Rng,
    database: Arc<UnitDatabase>,
    movement_classes: MovementClassCollisionService,
    dying_units: VecDeque<UnitId>,
}

impl std::fmt::Debug for GameSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSimulation")
            .field("game_time", &self.game_time)
            .field("players", &self.players.len())
            .field("units", &self.units.len())
            .field("features", &self.features.len())
            .field("projectiles", &self.projectiles.len())
            .field("path_requests", &self.path_requests.len())
            .finish_non_exhaustive()
    }
}

impl GameSimulation {
    /// Empty world on `terrain`, drawing randomness from `seed`.
    #[must_use]
    pub fn new(terrain: MapTerrain, database: Arc<UnitDatabase>, seed: u64) -> Self {
        let heights = terrain.heights();
        let occupancy = OccupancyGrid::new(heights.width(), heights.height());
        let mut movement_classes = MovementClassCollisionService::new();
        for class in database.movement_classes() {
            movement_classes.register(&terrain, class);
        }
        info!(
            width = heights.width(),
            height = heights.height(),
            seed,
            "simulation created"
        );
        Self {
            game_time: GameTime(0),
            terrain,
            occupancy,
            players: Vec::new(),
            units: VectorMap::new(),
            features: VectorMap::new(),
            projectiles: VectorMap::new(),
            path_requests: VecDeque::new(),
            events: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            database,
            movement_classes,
            dying_units: VecDeque::new(),
        }
    }

    /// Definitions in play.
    #[must_use]
    pub fn database(&self) -> &Arc<UnitDatabase> {
        &self.database
    }

    /// Walkability grids per movement class.
    #[must_use]
    pub fn movement_classes(&self) -> &MovementClassCollisionService {
        &self.movement_classes
    }

    /// Unit by id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&UnitState> {
        self.units.get(id)
    }

    /// Unit by id, mutably.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut UnitState> {
        self.units.get_mut(id)
    }

    /// Unit ids in ascending order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.ids()
    }

    /// Player by id.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&GamePlayerInfo> {
        self.players.get(id.index())
    }

    /// Take every event produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Uniform random integer in `[low, high]` from the scene RNG.
    pub fn random_in_range(&mut self, low: i32, high: i32) -> i32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    /// Add a player.
    pub fn add_player(&mut self, info: GamePlayerInfo) -> PlayerId {
        let id = PlayerId(self.players.len() as u32);
        debug!(player = %id, side = %info.side, "player added");
        self.players.push(info);
        id
    }

    /// Add a feature. Blocking features mark their footprint as occupied.
    pub fn add_feature(&mut self, feature: MapFeature) -> FeatureId {
        let rect = feature.footprint_rect(&self.terrain);
        let blocking = feature.blocking;
        let id = self.features.insert(feature);
        if blocking {
            let region = self.occupancy.cells().clip_region(&rect);
            self.occupancy.fill(region, OccupiedCell::Feature(id));
        }
        id
    }

    /// Feature of the named type at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature type is unknown.
    pub fn spawn_feature(&mut self, feature_type: &str, position: SimVector) -> Result<FeatureId> {
        let definition = self.database.try_feature(feature_type)?;
        let y = self.terrain.height_at(position.x, position.z);
        let feature = MapFeature::new(definition, SimVector::new(position.x, y, position.z));
        Ok(self.add_feature(feature))
    }

    /// Remove a feature and free its cells.
    pub fn remove_feature(&mut self, id: FeatureId) {
        let Some(feature) = self.features.remove(id) else {
            return;
        };
        let region = self.occupancy.cells().clip_region(&feature.footprint_rect(&self.terrain));
        self.occupancy.release(region, OccupiedCell::Feature(id));
        self.events.push(GameEvent::FeatureRemoved { feature: id });
    }

    /// Build the state for a new unit of `unit_type` from the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit type or its named movement class is
    /// unknown.
    pub fn create_unit_state(&self, unit_type: &str, owner: PlayerId, position: SimVector) -> Result<UnitState> {
        let definition = self.database.try_unit(unit_type)?;
        let movement_class = match &definition.movement_class {
            Some(name) => self
                .database
                .movement_class(name)
                .cloned()
                .ok_or_else(|| GameError::UnknownMovementClass(name.clone()))?,
            None => ad_hoc_movement_class(definition),
        };
        let model = self.database.model(&definition.object_name);
        let script = self.database.script(&definition.object_name);
        Ok(UnitState::new(definition, model, script, movement_class, owner, position))
    }

    /// Add a unit if its footprint is free.
    ///
    /// Fails iff any cell of the footprint is off the map, occupied by
    /// another unit or by a blocking feature. Ground units are placed on
    /// the terrain surface. The unit's `Create` script starts immediately.
    pub fn try_add_unit(&mut self, mut unit: UnitState) -> Option<UnitId> {
        let rect = unit.footprint_rect(&self.terrain);
        if self.is_collision_at(&rect, None) {
            debug!(unit_type = %unit.unit_type, ?rect, "unit placement blocked");
            return None;
        }
        if !unit.is_flying() {
            unit.position.y = self.terrain.height_at(unit.position.x, unit.position.z);
            unit.previous_position = unit.position;
        }
        self.movement_classes.register(&self.terrain, &unit.movement_class);
        let complete = !unit.is_being_built();
        let id = self.units.insert(unit);
        self.occupy_footprint(id);
        if let Some(env) = self.units.get_mut(id).and_then(|u| u.cob_environment.as_mut()) {
            env.create_thread("Create", Vec::new());
        }
        if complete {
            self.add_unit_storage(id);
        }
        self.events.push(GameEvent::UnitSpawned { unit: id });
        trace!(unit = %id, "unit added");
        Some(id)
    }

    /// Create and add a complete unit of `unit_type`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PlacementBlocked`] if the footprint is taken,
    /// or a data error if the type is unknown.
    pub fn spawn_unit(&mut self, unit_type: &str, owner: PlayerId, position: SimVector) -> Result<UnitId> {
        if owner.index() >= self.players.len() {
            return Err(GameError::InvalidPlayerId(owner.0));
        }
        let state = self.create_unit_state(unit_type, owner, position)?;
        let id = self.try_add_unit(state).ok_or_else(|| GameError::PlacementBlocked {
            unit_type: unit_type.to_string(),
        })?;
        if self.database.unit(unit_type).is_some_and(|d| d.activate_when_built) {
            behaviour::set_activation(self, id, true);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Occupancy
    // ------------------------------------------------------------------

    /// True if `rect` is blocked for `self_id`. Cells owned by `self_id`
    /// are free; off-grid cells block.
    #[must_use]
    pub fn is_collision_at(&self, rect: &DiscreteRect, self_id: Option<UnitId>) -> bool {
        self.occupancy.is_blocked(rect, self_id)
    }

    /// Move a unit's footprint.
    ///
    /// # Panics
    ///
    /// Panics if either rectangle leaves the grid.
    pub fn move_unit_occupied_area(&mut self, old: &DiscreteRect, new: &DiscreteRect, unit: UnitId) {
        self.occupancy.move_unit(old, new, unit);
    }

    /// Mark a unit's footprint, honouring its yard map.
    pub(crate) fn occupy_footprint(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let rect = unit.footprint_rect(&self.terrain);
        let yard_open = unit.yard_open;
        let definition = self.database.unit(&unit.unit_type);
        for dz in 0..rect.height() {
            for dx in 0..rect.width() {
                let blocks = definition
                    .and_then(|d| d.yard_cell(dx, dz))
                    .map_or(true, |cell| cell.blocks(yard_open));
                let (x, y) = (rect.x() + dx, rect.y() + dz);
                if blocks {
                    self.occupancy.set_cell(x, y, OccupiedCell::Unit(id));
                } else if self.occupancy.try_get(x, y) == Some(OccupiedCell::Unit(id)) {
                    self.occupancy.set_cell(x, y, OccupiedCell::None);
                }
            }
        }
    }

    /// Free every cell a unit holds around its current footprint.
    pub(crate) fn release_footprint(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let region = self.occupancy.cells().clip_region(&unit.footprint_rect(&self.terrain));
        self.occupancy.release(region, OccupiedCell::Unit(id));
    }

    /// Open or close a unit's yard. Closing fails, leaving the yard open,
    /// while another unit stands on a cell that would become blocking.
    pub fn try_set_yard_open(&mut self, id: UnitId, open: bool) -> bool {
        let Some(unit) = self.units.get(id) else {
            return false;
        };
        if unit.yard_open == open {
            return true;
        }
        if !open {
            let rect = unit.footprint_rect(&self.terrain);
            let definition = self.database.unit(&unit.unit_type);
            for dz in 0..rect.height() {
                for dx in 0..rect.width() {
                    let closes = definition
                        .and_then(|d| d.yard_cell(dx, dz))
                        .is_some_and(|cell| cell.blocks(false) && !cell.blocks(true));
                    let occupied = self
                        .occupancy
                        .try_get(rect.x() + dx, rect.y() + dz)
                        .is_some_and(|cell| cell.blocks(Some(id)));
                    if closes && occupied {
                        trace!(unit = %id, "yard close refused, cell occupied");
                        return false;
                    }
                }
            }
        }
        if let Some(unit) = self.units.get_mut(id) {
            unit.yard_open = open;
        }
        self.occupy_footprint(id);
        true
    }

    /// Ask idle units owned by `owner` standing in `rect` to move out of it.
    pub fn request_bugger_off(&mut self, rect: DiscreteRect, owner: PlayerId, exclude: UnitId) {
        for id in self.unit_ids() {
            if id == exclude {
                continue;
            }
            let Some(unit) = self.units.get_mut(id) else {
                continue;
            };
            if !unit.is_alive() || unit.owner != owner || !unit.is_mobile() || !unit.orders.is_empty() {
                continue;
            }
            if unit.footprint_rect(&self.terrain).intersects(&rect) {
                unit.orders.push_back(crate::unit::UnitOrder::BuggerOff(rect));
            }
        }
    }

    // ------------------------------------------------------------------
    // Spatial queries
    // ------------------------------------------------------------------

    /// First living unit hit by the segment, nearest first.
    #[must_use]
    pub fn get_first_colliding_unit(&self, line: &Line3x) -> Option<UnitId> {
        self.first_colliding_unit_excluding(line, None).map(|(id, _)| id)
    }

    /// First living unit hit by the segment other than `exclude`, with the
    /// segment parameter of the hit.
    #[must_use]
    pub fn first_colliding_unit_excluding(&self, line: &Line3x, exclude: Option<UnitId>) -> Option<(UnitId, SimScalar)> {
        let mut best: Option<(UnitId, SimScalar)> = None;
        for (id, unit) in self.units.iter() {
            if Some(id) == exclude || !unit.is_alive() {
                continue;
            }
            if let Some(t) = unit.world_selection_box().intersect_segment(line.start, line.end) {
                if best.map_or(true, |(_, best_t)| t < best_t) {
                    best = Some((id, t));
                }
            }
        }
        best
    }

    /// First blocking feature hit by the segment.
    #[must_use]
    pub fn first_colliding_feature(&self, line: &Line3x) -> Option<(FeatureId, SimScalar)> {
        let mut best: Option<(FeatureId, SimScalar)> = None;
        for (id, feature) in self.features.iter() {
            if !feature.blocking {
                continue;
            }
            if let Some(t) = feature.world_bounding_box().intersect_segment(line.start, line.end) {
                if best.map_or(true, |(_, best_t)| t < best_t) {
                    best = Some((id, t));
                }
            }
        }
        best
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Queue a path request, abandoning any earlier one for the same unit.
    pub fn request_path(&mut self, unit_id: UnitId) {
        self.path_requests.retain(|r| r.unit_id != unit_id);
        self.path_requests.push_back(PathRequest { unit_id });
        if let Some(NavigationState::Moving(moving)) = self.units.get_mut(unit_id).map(|u| &mut u.navigation_state) {
            moving.path_requested = true;
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Fire a projectile of `weapon` from `position` along `direction`.
    ///
    /// Ballistic shots get half a tick of gravity up front so that the
    /// discrete arc matches the launch-angle solution.
    pub fn spawn_projectile(
        &mut self,
        owner: PlayerId,
        source_unit: Option<UnitId>,
        weapon: &WeaponDefinition,
        position: SimVector,
        direction: SimVector,
        target: Option<AttackTarget>,
    ) -> ProjectileId {
        let mut velocity = direction.normalized_or(SimVector::ZERO).scaled(weapon.velocity);
        if weapon.is_ballistic() {
            velocity.y += crate::constants::GRAVITY.div_int(2);
        }
        let projectile = Projectile::new(weapon, owner, source_unit, position, velocity, target, self.game_time);
        self.projectiles.insert(projectile)
    }

    /// Request an explosion animation.
    pub fn spawn_explosion(&mut self, position: SimVector, animation: &str) {
        self.events.push(GameEvent::Explosion {
            position,
            animation: animation.to_string(),
        });
    }

    /// Request a smoke animation.
    pub fn spawn_smoke(&mut self, position: SimVector, animation: &str) {
        self.events.push(GameEvent::Smoke {
            position,
            animation: animation.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Economy
    // ------------------------------------------------------------------

    /// Record a unit's resource request for this tick.
    ///
    /// Negative apparent values are recorded as desire. The request may
    /// proceed unless it asks for a resource the owner is stalled on; only
    /// then are the actual values recorded as consumption or production.
    pub fn add_resource_delta(
        &mut self,
        unit_id: UnitId,
        apparent_energy: SimScalar,
        apparent_metal: SimScalar,
        actual_energy: SimScalar,
        actual_metal: SimScalar,
    ) -> bool {
        let Some(unit) = self.units.get_mut(unit_id) else {
            return false;
        };
        let Some(player) = self.players.get_mut(unit.owner.index()) else {
            return false;
        };
        player.energy.record_desire(apparent_energy);
        player.metal.record_desire(apparent_metal);

        let energy_ok = !(apparent_energy.is_negative() && player.energy.stalled);
        let metal_ok = !(apparent_metal.is_negative() && player.metal.stalled);
        if !(energy_ok && metal_ok) {
            return false;
        }

        player.energy.record_actual(actual_energy);
        player.metal.record_actual(actual_metal);
        record_unit_flow(&mut unit.energy, actual_energy);
        record_unit_flow(&mut unit.metal, actual_metal);
        true
    }

    fn begin_economy_tick(&mut self) {
        for player in &mut self.players {
            player.energy.begin_tick();
            player.metal.begin_tick();
        }
        for (_, unit) in self.units.iter_mut() {
            for flow in [&mut unit.energy, &mut unit.metal] {
                flow.production_buffer = SimScalar::ZERO;
                flow.consumption_buffer = SimScalar::ZERO;
            }
        }
    }

    fn end_economy_tick(&mut self) {
        for player in &mut self.players {
            player.energy.end_tick();
            player.metal.end_tick();
        }
    }

    /// Upkeep and production of one unit.
    ///
    /// Switchable units do nothing while off. Consumers must be funded to
    /// count as sufficiently powered, and only powered units produce.
    pub(crate) fn update_unit_economy(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        if !unit.is_alive() || unit.is_being_built() {
            return;
        }
        let on_off_able = self.database.unit(&unit.unit_type).is_some_and(|d| d.on_off_able);
        if on_off_able && !unit.activated {
            return;
        }
        let (energy_use, metal_use) = (unit.energy.used, unit.metal.used);
        let (energy_make, metal_make) = (unit.energy.make, unit.metal.make);

        let powered = if energy_use.is_positive() || metal_use.is_positive() {
            self.add_resource_delta(id, -energy_use, -metal_use, -energy_use, -metal_use)
        } else {
            true
        };
        if let Some(unit) = self.units.get_mut(id) {
            unit.is_sufficiently_powered = powered;
        }
        if powered && (energy_make.is_positive() || metal_make.is_positive()) {
            self.add_resource_delta(id, energy_make, metal_make, energy_make, metal_make);
        }
    }

    fn add_unit_storage(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let (energy, metal) = (unit.energy.storage, unit.metal.storage);
        if let Some(player) = self.players.get_mut(unit.owner.index()) {
            player.energy.max += energy;
            player.metal.max += metal;
        }
    }

    fn remove_unit_storage(&mut self, id: UnitId) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let (energy, metal) = (unit.energy.storage, unit.metal.storage);
        if let Some(player) = self.players.get_mut(unit.owner.index()) {
            player.energy.max = (player.energy.max - energy).max(SimScalar::ZERO);
            player.energy.current = player.energy.current.min(player.energy.max);
            player.metal.max = (player.metal.max - metal).max(SimScalar::ZERO);
            player.metal.current = player.metal.current.min(player.metal.max);
        }
    }

    /// A unit under construction reached full build time.
    pub(crate) fn complete_unit(&mut self, id: UnitId) {
        let Some(unit) = self.units.get_mut(id) else {
            return;
        };
        unit.build_time_completed = unit.build_time;
        unit.hit_points = unit.hit_points.max(1);
        let activate = self.database.unit(&unit.unit_type).is_some_and(|d| d.activate_when_built);
        self.add_unit_storage(id);
        self.events.push(GameEvent::UnitCompleted { unit: id });
        debug!(unit = %id, "unit completed");
        if activate {
            behaviour::set_activation(self, id, true);
        }
    }

    // ------------------------------------------------------------------
    // Damage and death
    // ------------------------------------------------------------------

    /// Damage a unit. Kills are queued for the end-of-tick death pass.
    pub fn apply_damage(&mut self, target: UnitId, amount: u32, attacker: Option<UnitId>) {
        let Some(unit) = self.units.get_mut(target) else {
            return;
        };
        if !unit.is_alive() || amount == 0 {
            return;
        }
        if attacker.is_some() {
            unit.last_attacker = attacker;
        }
        if unit.apply_damage(amount) {
            trace!(unit = %target, ?attacker, "unit killed");
            self.dying_units.push_back(target);
            if let Some(killer) = attacker.and_then(|a| self.units.get_mut(a)) {
                killer.kills += 1;
            }
        }
    }

    fn damage_feature(&mut self, id: FeatureId, amount: u32) {
        let Some(feature) = self.features.get_mut(id) else {
            return;
        };
        if feature.indestructible || amount == 0 {
            return;
        }
        feature.hit_points = feature.hit_points.saturating_sub(amount);
        if feature.hit_points == 0 {
            self.remove_feature(id);
        }
    }

    /// Damage falling off linearly to zero at `radius` from `center`.
    fn apply_area_damage(
        &mut self,
        center: SimVector,
        radius: SimScalar,
        damage_for: &dyn Fn(&str) -> u32,
        attacker: Option<UnitId>,
        exclude: Option<UnitId>,
    ) {
        if radius <= SimScalar::ZERO {
            return;
        }
        let radius_squared = radius.squared();
        let mut hits = Vec::new();
        for (id, unit) in self.units.iter() {
            if Some(id) == exclude || !unit.is_alive() {
                continue;
            }
            let distance_squared = unit.position.distance_squared(center);
            if distance_squared > radius_squared {
                continue;
            }
            let falloff = (radius - distance_squared.sqrt().saturate()) / radius;
            let armor = self
                .database
                .unit(&unit.unit_type)
                .map_or(crate::data::DEFAULT_ARMOR_CLASS, |d| d.armor_class.as_str());
            let full = SimScalar::from_int(damage_for(armor).min(i32::MAX as u32) as i32);
            hits.push((id, (full * falloff).floor_to_int().max(0) as u32));
        }
        for (id, amount) in hits {
            self.apply_damage(id, amount, attacker);
        }

        let mut feature_hits = Vec::new();
        for (id, feature) in self.features.iter() {
            if feature.position.distance_squared(center) <= radius_squared {
                feature_hits.push(id);
            }
        }
        let base = damage_for(crate::data::DEFAULT_ARMOR_CLASS);
        for id in feature_hits {
            self.damage_feature(id, base);
        }
    }

    /// Resolve deaths queued this tick, including chain reactions.
    fn process_deaths(&mut self) {
        while let Some(id) = self.dying_units.pop_front() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            let (position, owner, complete) = (unit.position, unit.owner, !unit.is_being_built());
            let definition = self.database.unit(&unit.unit_type).cloned();

            self.release_footprint(id);
            self.path_requests.retain(|r| r.unit_id != id);
            if complete {
                self.remove_unit_storage(id);
            }
            self.events.push(GameEvent::UnitDied { unit: id });
            debug!(unit = %id, player = %owner, "unit died");

            let Some(definition) = definition else {
                continue;
            };
            if definition.commander {
                if let Some(player) = self.players.get_mut(owner.index()) {
                    if player.status == PlayerStatus::Alive {
                        player.status = PlayerStatus::Dead;
                        self.events.push(GameEvent::PlayerDefeated { player: owner });
                        info!(player = %owner, "player defeated");
                    }
                }
            }
            if let Some(corpse) = definition.corpse.as_deref().filter(|_| complete) {
                if let Some(feature_def) = self.database.feature(corpse) {
                    let feature = MapFeature::new(feature_def, position);
                    let rect = feature.footprint_rect(&self.terrain);
                    if !feature.blocking || !self.is_collision_at(&rect, None) {
                        self.add_feature(feature);
                    }
                }
            }
            if let Some(weapon) = definition.explode_as.as_deref().and_then(|w| self.database.weapon(w)).cloned() {
                self.detonate(position, &weapon, Some(id), None);
            }
        }
    }

    /// Explosion effects and damage of `weapon` at `position`.
    fn detonate(&mut self, position: SimVector, weapon: &WeaponDefinition, source: Option<UnitId>, direct_hit: Option<UnitId>) {
        self.events.push(GameEvent::WeaponHit {
            position,
            weapon_type: weapon.name.clone(),
        });
        if let Some(animation) = &weapon.explosion_animation {
            self.spawn_explosion(position, animation);
        }
        if let Some(target) = direct_hit {
            let armor = self
                .units
                .get(target)
                .and_then(|u| self.database.unit(&u.unit_type))
                .map_or(crate::data::DEFAULT_ARMOR_CLASS.to_string(), |d| d.armor_class.clone());
            self.apply_damage(target, weapon.damage_for(&armor), source);
        }
        self.apply_area_damage(
            position,
            weapon.damage_radius,
            &|armor| weapon.damage_for(armor),
            source,
            direct_hit,
        );
    }

    // ------------------------------------------------------------------
    // Projectiles
    // ------------------------------------------------------------------

    fn update_projectiles(&mut self) {
        for id in self.projectiles.ids() {
            self.update_projectile(id);
        }
    }

    fn update_projectile(&mut self, id: ProjectileId) {
        let now = self.game_time;
        let Some(projectile) = self.projectiles.get(id) else {
            return;
        };
        if projectile.is_dead {
            return;
        }
        let Some(weapon) = self.database.weapon(&projectile.weapon_type).cloned() else {
            warn!(weapon = %projectile.weapon_type, "projectile of unknown weapon removed");
            self.kill_projectile(id);
            return;
        };
        if projectile.expiry_time.is_some_and(|t| now >= t) {
            self.kill_projectile(id);
            return;
        }
        if projectile.weapon_timer.is_some_and(|t| now >= t) {
            let (position, source) = (projectile.position, projectile.source_unit);
            self.kill_projectile(id);
            self.detonate(position, &weapon, source, None);
            return;
        }

        let target_position = match &projectile.physics {
            ProjectilePhysics::Tracking { target: Some(target), .. } => self.attack_target_position(target),
            _ => None,
        };
        let Some(projectile) = self.projectiles.get_mut(id) else {
            return;
        };
        projectile.integrate(target_position);
        let line = Line3x::new(projectile.previous_position, projectile.position);
        let source = projectile.source_unit;

        if let Some(hit) = self.terrain.intersect_line(&line) {
            let can_bounce = self
                .projectiles
                .get(id)
                .is_some_and(|p| p.ground_bounce && !p.has_bounced);
            if can_bounce {
                self.bounce_projectile(id, hit);
            } else {
                self.kill_projectile(id);
                self.detonate(hit, &weapon, source, None);
            }
            return;
        }
        if let Some((unit, t)) = self.first_colliding_unit_excluding(&line, source) {
            self.kill_projectile(id);
            self.detonate(line.point_at(t), &weapon, source, Some(unit));
            return;
        }
        if let Some((feature, t)) = self.first_colliding_feature(&line) {
            self.kill_projectile(id);
            let position = line.point_at(t);
            self.detonate(position, &weapon, source, None);
            self.damage_feature(feature, weapon.damage_for(crate::data::DEFAULT_ARMOR_CLASS));
            return;
        }
        if !self.is_on_map(line.end) {
            trace!(projectile = %id, "projectile left the map");
            self.kill_projectile(id);
        }
    }

    fn bounce_projectile(&mut self, id: ProjectileId, hit: SimVector) {
        let decay = self.projectiles.get(id).and_then(|p| p.random_decay).unwrap_or(0);
        let jitter = (decay / 4) as i32;
        let offset = self.random_in_range(-jitter, jitter);
        let fuse = (decay as i32 + offset).max(1) as u32;
        let now = self.game_time;
        let Some(projectile) = self.projectiles.get_mut(id) else {
            return;
        };
        projectile.has_bounced = true;
        projectile.velocity.y = projectile.velocity.y.abs();
        projectile.position = hit;
        projectile.weapon_timer = Some(now.plus(fuse));
        let weapon_type = projectile.weapon_type.clone();
        self.events.push(GameEvent::ProjectileBounced { position: hit, weapon_type });
    }

    fn kill_projectile(&mut self, id: ProjectileId) {
        if let Some(projectile) = self.projectiles.get_mut(id) {
            projectile.is_dead = true;
        }
    }

    fn is_on_map(&self, position: SimVector) -> bool {
        let left = self.terrain.left_in_world_units();
        let top = self.terrain.top_in_world_units();
        position.x >= left
            && position.z >= top
            && position.x < left + self.terrain.width_in_world_units()
            && position.z < top + self.terrain.height_in_world_units()
    }

    /// Current world position of an attack target, if it still exists.
    #[must_use]
    pub fn attack_target_position(&self, target: &AttackTarget) -> Option<SimVector> {
        match target {
            AttackTarget::Unit(id) => self.units.get(*id).filter(|u| u.is_alive()).map(|u| u.position),
            AttackTarget::Ground(position) => Some(*position),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply a unit command from `player`. Commands for units the player
    /// does not own, or for dead or missing units, are ignored.
    pub fn issue_unit_command(&mut self, player: PlayerId, unit_id: UnitId, command: &PlayerUnitCommand) {
        let Some(unit) = self.units.get_mut(unit_id) else {
            debug!(unit = %unit_id, "command for missing unit ignored");
            return;
        };
        if !unit.is_owned_by(player) || !unit.is_alive() {
            warn!(unit = %unit_id, player = %player, "command for foreign or dead unit ignored");
            return;
        }
        match command {
            PlayerUnitCommand::IssueOrder { order, mode } => match mode {
                crate::command::IssueMode::Immediate => {
                    behaviour::clear_orders(self, unit_id);
                    if let Some(unit) = self.units.get_mut(unit_id) {
                        unit.orders.push_back(order.clone());
                    }
                }
                crate::command::IssueMode::Queued => unit.orders.push_back(order.clone()),
            },
            PlayerUnitCommand::Stop => behaviour::clear_orders(self, unit_id),
            PlayerUnitCommand::SetFireOrders(orders) => unit.fire_orders = *orders,
            PlayerUnitCommand::SetOnOff(on) => behaviour::set_activation(self, unit_id, *on),
        }
    }

    // ------------------------------------------------------------------
    // Match state
    // ------------------------------------------------------------------

    /// Who has won, if anyone.
    #[must_use]
    pub fn compute_win_status(&self) -> WinStatus {
        let mut alive = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_alive())
            .map(|(i, _)| PlayerId(i as u32));
        match (alive.next(), alive.next()) {
            (None, _) => WinStatus::Draw,
            (Some(winner), None) => WinStatus::Won(winner),
            (Some(_), Some(_)) => WinStatus::Undecided,
        }
    }

    /// Structural hash of every field that influences future ticks.
    #[must_use]
    pub fn compute_hash(&self) -> GameHash {
        let units = self
            .units
            .iter()
            .fold(0u32, |h, (id, u)| h.wrapping_add(combine(id.sim_hash(), u.sim_hash())));
        let features = self
            .features
            .iter()
            .fold(0u32, |h, (id, f)| h.wrapping_add(combine(id.sim_hash(), f.sim_hash())));
        let projectiles = self
            .projectiles
            .iter()
            .fold(0u32, |h, (id, p)| h.wrapping_add(combine(id.sim_hash(), p.sim_hash())));
        let path_requests = self
            .path_requests
            .iter()
            .fold(0u32, |h, r| h.wrapping_add(r.unit_id.sim_hash()));
        let rng_position = self.rng.get_word_pos();
        GameHash(
            FieldHasher::new()
                .field(&self.game_time)
                .field(&self.players)
                .field(&units)
                .field(&features)
                .field(&projectiles)
                .field(&path_requests)
                .leaf(self.occupancy.cells().data())
                .field(&((rng_position >> 64) as u64))
                .field(&(rng_position as u64))
                .finish(),
        )
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the world by one tick.
    pub fn tick(&mut self, pathfinder: &mut PathFindingService) {
        // 1. Settle deaths from outside the tick, drop what died last tick
        self.process_deaths();
        self.remove_dead_entities();

        // 2. Fresh economy buffers, remember last pose
        self.begin_economy_tick();
        for (_, unit) in self.units.iter_mut() {
            unit.previous_position = unit.position;
            unit.previous_rotation = unit.rotation;
        }

        // 3. Bounded path work
        pathfinder.update(self);

        // 4. Behaviour, in id order
        let unit_ids = self.unit_ids();
        for &id in &unit_ids {
            behaviour::update(self, id);
        }
        self.process_unit_creation_requests();

        // 5. Scripts
        for id in self.unit_ids() {
            self.run_unit_scripts(id);
        }

        // 6. Piece animation
        for (_, unit) in self.units.iter_mut() {
            unit.mesh.update();
        }

        // 7. Projectiles and the deaths they cause
        self.update_projectiles();
        self.process_deaths();

        // 8. Economy
        self.end_economy_tick();

        #[cfg(feature = "debug-validation")]
        self.validate_occupancy();

        self.game_time = self.game_time.next();

        #[cfg(debug_assertions)]
        {
            let hash = self.compute_hash();
            tracing::debug!(tick = self.game_time.0, state_hash = %hash, "Simulation state hash");
        }
    }

    fn remove_dead_entities(&mut self) {
        for id in self.units.ids() {
            if self.units.get(id).is_some_and(UnitState::is_dead) {
                self.units.remove(id);
            }
        }
        for id in self.projectiles.ids() {
            if self.projectiles.get(id).is_some_and(|p| p.is_dead) {
                self.projectiles.remove(id);
            }
        }
    }

    /// Create units requested by builders this tick.
    fn process_unit_creation_requests(&mut self) {
        use crate::unit::{BehaviourState, UnitCreationStatus};

        for id in self.unit_ids() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            let BehaviourState::CreatingUnit {
                unit_type,
                owner,
                position,
                status: UnitCreationStatus::Pending,
            } = &unit.behaviour_state
            else {
                continue;
            };
            let (unit_type, owner, position, rotation) = (unit_type.clone(), *owner, *position, unit.rotation);

            let status = match self.create_unit_state(&unit_type, owner, position) {
                Ok(mut state) => {
                    state.start_as_unbuilt();
                    state.rotation = rotation;
                    state.previous_rotation = rotation;
                    self.try_add_unit(state).map_or(UnitCreationStatus::Failed, UnitCreationStatus::Done)
                }
                Err(error) => {
                    warn!(builder = %id, %error, "unit creation failed");
                    UnitCreationStatus::Failed
                }
            };
            if let Some(BehaviourState::CreatingUnit { status: slot, .. }) =
                self.units.get_mut(id).map(|u| &mut u.behaviour_state)
            {
                *slot = status;
            }
        }
    }

    /// Check that every occupied cell belongs to a live unit or an existing
    /// feature.
    #[cfg(feature = "debug-validation")]
    fn validate_occupancy(&self) {
        for cell in self.occupancy.cells().data() {
            match cell {
                OccupiedCell::Unit(id) => assert!(
                    self.units.get(*id).is_some_and(UnitState::is_alive),
                    "occupancy references dead or missing unit {id}"
                ),
                OccupiedCell::Feature(id) => {
                    assert!(self.features.contains(*id), "occupancy references missing feature {id}");
                }
                OccupiedCell::None => {}
            }
        }
    }

    /// Mark a flying unit as landed or airborne in the occupancy grid.
    pub(crate) fn set_unit_landed(&mut self, id: UnitId, landed: bool) {
        if landed {
            self.occupy_footprint(id);
        } else {
            self.release_footprint(id);
        }
        trace!(unit = %id, landed, "air unit occupancy changed");
    }
}

fn record_unit_flow(flow: &mut crate::unit::UnitResourceFlow, actual: SimScalar) {
    if actual.is_negative() {
        flow.consumption_buffer -= actual;
    } else {
        flow.production_buffer += actual;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureDefinition, UnitDefinition, YardMapCell};
    use crate::player::PlayerControllerType;
    use crate::unit::UnitOrder;

    fn create_test_definition(name: &str) -> UnitDefinition {
        ron::from_str(&format!(
            r#"UnitDefinition(
                unit_name: "{name}",
                object_name: "{name}",
                footprint_x: 2,
                footprint_z: 2,
                max_slope: 20,
                max_water_depth: 10,
                max_hit_points: 100,
                max_velocity: 65536,
                acceleration: 16384,
                brake_rate: 32768,
                turn_rate: 1024,
            )"#
        ))
        .expect("test definition should parse")
    }

    fn create_test_sim() -> GameSimulation {
        let mut database = UnitDatabase::new();
        database.add_unit(create_test_definition("TANK"));
        let mut factory = create_test_definition("FACTORY");
        factory.footprint_x = 3;
        factory.footprint_z = 3;
        factory.max_velocity = SimScalar::ZERO;
        factory.builder = true;
        factory.yard_map = Some(vec![
            YardMapCell::Blocking,
            YardMapCell::Blocking,
            YardMapCell::Blocking,
            YardMapCell::Blocking,
            YardMapCell::PassableWhenOpen,
            YardMapCell::Blocking,
            YardMapCell::Blocking,
            YardMapCell::PassableWhenOpen,
            YardMapCell::Blocking,
        ]);
        database.add_unit(factory);
        database.add_feature(FeatureDefinition {
            name: "ROCK".to_string(),
            footprint_x: 1,
            footprint_z: 1,
            blocking: true,
            reclaimable: true,
            indestructible: false,
            damage: 10,
            metal: SimScalar::from_int(5),
            energy: SimScalar::ZERO,
            height: SimScalar::from_int(8),
        });
        let mut sim = GameSimulation::new(MapTerrain::flat(33, 33, 20, SimScalar::ZERO), Arc::new(database), 7);
        for color in 0..2 {
            sim.add_player(GamePlayerInfo::new(
                PlayerControllerType::Human,
                "ARM",
                color,
                SimScalar::from_int(1000),
                SimScalar::from_int(1000),
            ));
        }
        sim
    }

    #[test]
    fn test_try_add_unit_rejects_overlap() {
        let mut sim = create_test_sim();
        let position = SimVector::from_ints(64, 0, 64);
        let first = sim.spawn_unit("TANK", PlayerId(0), position).unwrap();
        let rect = sim.unit(first).unwrap().footprint_rect(&sim.terrain);
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(first)), 4);
        assert!(sim.is_collision_at(&rect, None));
        assert!(!sim.is_collision_at(&rect, Some(first)));
        let second = sim.spawn_unit("TANK", PlayerId(1), position);
        assert!(matches!(second, Err(GameError::PlacementBlocked { .. })));
    }

    #[test]
    fn test_blocking_feature_prevents_placement() {
        let mut sim = create_test_sim();
        sim.spawn_feature("ROCK", SimVector::from_ints(72, 0, 72)).unwrap();
        assert!(sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).is_err());
        assert!(sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(128, 0, 128)).is_ok());
    }

    #[test]
    fn test_off_map_placement_fails() {
        let mut sim = create_test_sim();
        assert!(sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(-100, 0, 0)).is_err());
    }

    #[test]
    fn test_win_status() {
        let mut sim = create_test_sim();
        assert_eq!(sim.compute_win_status(), WinStatus::Undecided);
        sim.players[1].status = PlayerStatus::Dead;
        assert_eq!(sim.compute_win_status(), WinStatus::Won(PlayerId(0)));
        sim.players[0].status = PlayerStatus::Resigned;
        assert_eq!(sim.compute_win_status(), WinStatus::Draw);
    }

    #[test]
    fn test_request_path_replaces_existing() {
        let mut sim = create_test_sim();
        let a = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        let b = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(160, 0, 160)).unwrap();
        sim.request_path(a);
        sim.request_path(b);
        sim.request_path(a);
        let order: Vec<UnitId> = sim.path_requests.iter().map(|r| r.unit_id).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_resource_delta_refused_when_stalled() {
        let mut sim = create_test_sim();
        let unit = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        let minus = -SimScalar::from_int(10);
        assert!(sim.add_resource_delta(unit, minus, SimScalar::ZERO, minus, SimScalar::ZERO));
        sim.players[0].energy.stalled = true;
        assert!(!sim.add_resource_delta(unit, minus, SimScalar::ZERO, minus, SimScalar::ZERO));
        // Production is never refused.
        assert!(sim.add_resource_delta(unit, SimScalar::ONE, SimScalar::ZERO, SimScalar::ONE, SimScalar::ZERO));
        assert_eq!(sim.players[0].energy.desired_consumption, SimScalar::from_int(20));
        assert_eq!(sim.players[0].energy.actual_consumption, SimScalar::from_int(10));
    }

    #[test]
    fn test_consumers_stall_on_the_tick_after_demand_outruns_supply() {
        let mut sim = create_test_sim();
        let mut pathfinder = PathFindingService::new();
        let consumers = [
            sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap(),
            sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(160, 0, 64)).unwrap(),
        ];
        for &id in &consumers {
            sim.units.get_mut(id).unwrap().energy.used = SimScalar::from_int(3);
        }
        sim.players[0].energy.current = SimScalar::from_int(4);

        // Storage covers only part of the demand, but nobody is stalled yet.
        sim.tick(&mut pathfinder);
        let energy = sim.players[0].energy;
        assert!(energy.stalled);
        assert_eq!(energy.desired_consumption, SimScalar::from_int(6));
        assert_eq!(energy.actual_consumption, SimScalar::from_int(6));
        assert!(consumers.iter().all(|&id| sim.unit(id).unwrap().is_sufficiently_powered));

        sim.tick(&mut pathfinder);
        let energy = sim.players[0].energy;
        assert!(energy.stalled);
        assert_eq!(energy.desired_consumption, SimScalar::from_int(6));
        assert_eq!(energy.actual_consumption, SimScalar::ZERO);
        for &id in &consumers {
            assert!(!sim.unit(id).unwrap().is_sufficiently_powered);
        }
        let minus = -SimScalar::ONE;
        assert!(!sim.add_resource_delta(consumers[0], minus, SimScalar::ZERO, minus, SimScalar::ZERO));
    }

    #[test]
    fn test_yard_close_refused_while_occupied() {
        let mut sim = create_test_sim();
        let factory = sim.spawn_unit("FACTORY", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        let rect = sim.unit(factory).unwrap().footprint_rect(&sim.terrain);
        let pad = (rect.x() + 1, rect.y() + 1);
        assert_eq!(sim.occupancy.try_get(pad.0, pad.1), Some(OccupiedCell::Unit(factory)));

        assert!(sim.try_set_yard_open(factory, true));
        assert_eq!(sim.occupancy.try_get(pad.0, pad.1), Some(OccupiedCell::None));

        let intruder = UnitId::from_raw(0xff00);
        sim.occupancy.set_cell(pad.0, pad.1, OccupiedCell::Unit(intruder));
        assert!(!sim.try_set_yard_open(factory, false));
        assert!(sim.unit(factory).unwrap().yard_open);

        sim.occupancy.set_cell(pad.0, pad.1, OccupiedCell::None);
        assert!(sim.try_set_yard_open(factory, false));
        assert_eq!(sim.occupancy.try_get(pad.0, pad.1), Some(OccupiedCell::Unit(factory)));
    }

    #[test]
    fn test_death_releases_footprint() {
        let mut sim = create_test_sim();
        let mut pathfinder = PathFindingService::new();
        let unit = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        sim.apply_damage(unit, 1000, None);
        sim.tick(&mut pathfinder);
        assert_eq!(sim.occupancy.count(OccupiedCell::Unit(unit)), 0);
        assert!(sim.drain_events().contains(&GameEvent::UnitDied { unit }));
        sim.tick(&mut pathfinder);
        assert!(sim.unit(unit).is_none());
    }

    #[test]
    fn test_foreign_command_ignored() {
        let mut sim = create_test_sim();
        let unit = sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        let command = PlayerUnitCommand::IssueOrder {
            order: UnitOrder::Move(SimVector::from_ints(200, 0, 200)),
            mode: crate::command::IssueMode::Immediate,
        };
        sim.issue_unit_command(PlayerId(1), unit, &command);
        assert!(sim.unit(unit).unwrap().orders.is_empty());
        sim.issue_unit_command(PlayerId(0), unit, &command);
        assert_eq!(sim.unit(unit).unwrap().orders.len(), 1);
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut sim = create_test_sim();
        let before = sim.compute_hash();
        sim.spawn_unit("TANK", PlayerId(0), SimVector::from_ints(64, 0, 64)).unwrap();
        assert_ne!(before, sim.compute_hash());
    }
}
