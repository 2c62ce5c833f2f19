//! The bridge between a unit's scripts and the world.
//!
//! A unit's [`CobEnvironment`] is taken out of the unit while its threads
//! run, so the host can borrow the whole simulation mutably. It is put back
//! afterwards unless the unit disappeared in the meantime.

use tracing::trace;

use crate::cob::{
    pack_xz, to_cob_scalar, unpack_xz, CobEnvironment, CobHost, CobQuery, CobValueId, PieceCommand,
    PieceCommandKind, ThreadId,
};
use crate::events::GameEvent;
use crate::ids::{GameTime, UnitId};
use crate::math::{atan2, SimVector};
use crate::simulation::GameSimulation;
use crate::unit::FireOrders;
use crate::unit_mesh::Axis;

/// Move orders are not modelled; scripts always see "maneuver".
const STANDING_MOVE_ORDERS: i32 = 1;

/// Serves one unit's script threads.
pub struct UnitScriptHost<'a> {
    sim: &'a mut GameSimulation,
    unit_id: UnitId,
}

impl<'a> UnitScriptHost<'a> {
    /// Host for `unit_id`.
    pub fn new(sim: &'a mut GameSimulation, unit_id: UnitId) -> Self {
        Self { sim, unit_id }
    }

    fn other_unit(&self, raw_id: i32) -> Option<&crate::unit::UnitState> {
        self.sim
            .units
            .get(UnitId::from_raw(raw_id as u32))
            .filter(|u| u.is_alive())
    }

    fn value(&self, id: CobValueId, args: [i32; 4]) -> i32 {
        let Some(unit) = self.sim.units.get(self.unit_id) else {
            return 0;
        };
        match id {
            CobValueId::Activation => i32::from(unit.activated),
            CobValueId::StandingMoveOrders => STANDING_MOVE_ORDERS,
            CobValueId::StandingFireOrders => unit.fire_orders.to_cob(),
            CobValueId::Health => unit.health_percent() as i32,
            CobValueId::InBuildStance => i32::from(unit.in_build_stance),
            CobValueId::Busy => i32::from(unit.busy),
            CobValueId::PieceXz => {
                let position = unit.piece_world_position(args[0].max(0) as usize);
                pack_xz(position.x, position.z)
            }
            CobValueId::PieceY => to_cob_scalar(unit.piece_world_position(args[0].max(0) as usize).y),
            CobValueId::UnitXz => self
                .other_unit(args[0])
                .map_or(0, |u| pack_xz(u.position.x, u.position.z)),
            CobValueId::UnitY => self.other_unit(args[0]).map_or(0, |u| to_cob_scalar(u.position.y)),
            CobValueId::UnitHeight => self
                .other_unit(args[0])
                .map_or(0, |u| to_cob_scalar(u.selection_box.max.y)),
            CobValueId::XzAtan => {
                let (x, z) = unpack_xz(args[0]);
                i32::from((atan2(x, z) - unit.rotation).value())
            }
            CobValueId::XzHypot => {
                let (x, z) = unpack_xz(args[0]);
                to_cob_scalar(SimVector::new(x, crate::math::SimScalar::ZERO, z).length())
            }
            CobValueId::GroundHeight => {
                let (x, z) = unpack_xz(args[0]);
                to_cob_scalar(self.sim.terrain.height_at(x, z))
            }
            CobValueId::BuildPercentLeft => unit.build_percent_left() as i32,
            CobValueId::YardOpen => i32::from(unit.yard_open),
            CobValueId::Armored => i32::from(unit.armored),
            CobValueId::VeteranLevel => (unit.kills.saturating_mul(100)).min(i32::MAX as u32) as i32,
            CobValueId::MyId => self.unit_id.value() as i32,
            CobValueId::UnitTeam => self.other_unit(args[0]).map_or(0, |u| u.owner.0 as i32),
            CobValueId::UnitBuildPercentLeft => self
                .other_unit(args[0])
                .map_or(0, |u| u.build_percent_left() as i32),
            CobValueId::UnitAllied => self
                .other_unit(args[0])
                .map_or(0, |u| i32::from(u.owner == unit.owner)),
            CobValueId::BuggerOff | CobValueId::Atan | CobValueId::Hypot => 0,
            CobValueId::Unknown(raw) => {
                trace!(unit = %self.unit_id, value = raw, "unknown script query");
                0
            }
        }
    }
}

impl CobHost for UnitScriptHost<'_> {
    fn game_time(&self) -> GameTime {
        self.sim.game_time
    }

    fn apply_piece_command(&mut self, command: PieceCommand) {
        let unit_id = self.unit_id;
        let Some(unit) = self.sim.units.get_mut(unit_id) else {
            return;
        };
        let piece = command.piece;
        let mesh = &mut unit.mesh;
        match command.kind {
            PieceCommandKind::Move { axis, position, speed } => mesh.move_piece(piece, axis, position, speed),
            PieceCommandKind::Turn { axis, angle, speed } => mesh.turn_piece(piece, axis, angle, speed),
            PieceCommandKind::Spin {
                axis,
                target_speed,
                acceleration,
            } => mesh.spin_piece(piece, axis, target_speed, acceleration),
            PieceCommandKind::StopSpin { axis, deceleration } => mesh.stop_spin_piece(piece, axis, deceleration),
            PieceCommandKind::Show => mesh.set_visible(piece, true),
            PieceCommandKind::Hide => mesh.set_visible(piece, false),
            PieceCommandKind::Shade(shaded) => mesh.set_shaded(piece, shaded),
            PieceCommandKind::EmitSfx { sfx_type } => {
                let piece_name = mesh.piece(piece).map(|p| p.name.clone()).unwrap_or_default();
                self.sim.events.push(GameEvent::EmitParticleFromPiece {
                    sfx_type,
                    unit: unit_id,
                    piece_name,
                });
            }
            PieceCommandKind::Explode { explode_type } => {
                let piece_name = mesh.piece(piece).map(|p| p.name.clone()).unwrap_or_default();
                self.sim.events.push(GameEvent::PieceExploded {
                    unit: unit_id,
                    piece_name,
                    explode_type,
                });
            }
        }
    }

    fn query(&mut self, query: CobQuery) -> i32 {
        match query {
            CobQuery::Random { low, high } => self.sim.random_in_range(low, high),
            CobQuery::Value { id, args } => self.value(id, args),
        }
    }

    fn set_value(&mut self, id: CobValueId, value: i32) {
        let unit_id = self.unit_id;
        match id {
            CobValueId::YardOpen => {
                self.sim.try_set_yard_open(unit_id, value != 0);
                return;
            }
            CobValueId::BuggerOff => {
                if value != 0 {
                    if let Some(unit) = self.sim.units.get(unit_id) {
                        let rect = unit.footprint_rect(&self.sim.terrain);
                        let owner = unit.owner;
                        self.sim.request_bugger_off(rect, owner, unit_id);
                    }
                }
                return;
            }
            _ => {}
        }
        let Some(unit) = self.sim.units.get_mut(unit_id) else {
            return;
        };
        match id {
            CobValueId::Activation => unit.activated = value != 0,
            CobValueId::StandingFireOrders => unit.fire_orders = FireOrders::from_cob(value),
            CobValueId::InBuildStance => unit.in_build_stance = value != 0,
            CobValueId::Busy => unit.busy = value != 0,
            CobValueId::Armored => unit.armored = value != 0,
            other => trace!(unit = %unit_id, value_id = ?other, value, "script set ignored"),
        }
    }

    fn is_piece_moving(&self, piece: usize, axis: Axis) -> bool {
        self.sim
            .units
            .get(self.unit_id)
            .is_some_and(|u| u.mesh.is_moving(piece, axis))
    }

    fn is_piece_turning(&self, piece: usize, axis: Axis) -> bool {
        self.sim
            .units
            .get(self.unit_id)
            .is_some_and(|u| u.mesh.is_turning(piece, axis))
    }
}

impl GameSimulation {
    /// Run `f` with a unit's script environment and a host for it.
    /// Returns `None` if the unit is missing or has no environment.
    pub fn with_unit_scripts<R>(
        &mut self,
        unit_id: UnitId,
        f: impl FnOnce(&mut CobEnvironment, &mut UnitScriptHost<'_>) -> R,
    ) -> Option<R> {
        let mut env = self.units.get_mut(unit_id)?.cob_environment.take()?;
        let result = {
            let mut host = UnitScriptHost::new(self, unit_id);
            f(&mut env, &mut host)
        };
        if let Some(unit) = self.units.get_mut(unit_id) {
            unit.cob_environment = Some(env);
        }
        Some(result)
    }

    /// One scheduling pass of a unit's script threads.
    pub fn run_unit_scripts(&mut self, unit_id: UnitId) {
        if !self.units.get(unit_id).is_some_and(|u| u.is_alive()) {
            return;
        }
        self.with_unit_scripts(unit_id, |env, host| env.run_scripts(host));
    }

    /// Start a script function as a new thread.
    pub fn start_unit_script(&mut self, unit_id: UnitId, function: &str, args: Vec<i32>) -> Option<ThreadId> {
        self.units
            .get_mut(unit_id)?
            .cob_environment
            .as_mut()?
            .create_thread(function, args)
    }

    /// Run a script function to completion and return its locals.
    pub fn call_unit_script(&mut self, unit_id: UnitId, function: &str, args: Vec<i32>) -> Option<Vec<i32>> {
        self.with_unit_scripts(unit_id, |env, host| env.call_synchronous(function, args, host))
            .flatten()
    }

    /// Call a query function and read its first local as a piece index.
    pub fn query_unit_piece(&mut self, unit_id: UnitId, function: &str) -> Option<usize> {
        let locals = self.call_unit_script(unit_id, function, vec![0])?;
        locals.first().and_then(|&piece| usize::try_from(piece).ok())
    }
}
