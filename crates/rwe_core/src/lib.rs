//! # RWE Core
//!
//! Deterministic lockstep simulation core for a Total Annihilation engine.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond replay files
//! - No system randomness (one seeded `ChaCha8Rng` per match)
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! Every peer running the same command stream from the same seed computes
//! bit-identical state, checked by periodic state hashes.
//!
//! ## Crate Structure
//!
//! - [`math`], [`grid`], [`terrain`], [`occupancy`], [`vector_map`] - primitives
//! - [`cob`] - the unit script virtual machine
//! - [`unit_mesh`] - piece animation driven by scripts
//! - [`pathfinding`] - jump point search and the path request service
//! - [`simulation`] - the world and its tick
//! - [`behaviour`] - orders, navigation, physics, weapons and building
//! - [`scene`] - lockstep command application and hash checkpoints
//! - [`replay`] - recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod behaviour;
pub mod cob;
pub mod command;
pub mod constants;
pub mod data;
pub mod error;
pub mod events;
pub mod feature;
pub mod grid;
pub mod hash;
pub mod ids;
pub mod math;
pub mod movement;
pub mod occupancy;
pub mod pathfinding;
pub mod player;
pub mod projectile;
pub mod replay;
pub mod scene;
pub mod script_host;
pub mod simulation;
pub mod terrain;
pub mod unit;
pub mod unit_mesh;
pub mod vector_map;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{CommandSet, IssueMode, PlayerCommand, PlayerCommandService, PlayerUnitCommand};
    pub use crate::data::{UnitDatabase, UnitDefinition, WeaponDefinition};
    pub use crate::error::{GameError, Result};
    pub use crate::events::GameEvent;
    pub use crate::hash::GameHash;
    pub use crate::ids::{FeatureId, GameTime, PlayerId, ProjectileId, SceneTime, UnitId};
    pub use crate::math::{SimAngle, SimScalar, SimVector};
    pub use crate::player::{GamePlayerInfo, PlayerControllerType};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::scene::{GameScene, SceneTick};
    pub use crate::simulation::{GameSimulation, WinStatus};
    pub use crate::terrain::MapTerrain;
    pub use crate::unit::{AttackTarget, FireOrders, UnitOrder};
}
