//! Events produced by a tick for the renderer and audio.
//!
//! The simulation appends to an event list during the tick. Consumers drain
//! it on the same thread; nothing in the simulation reads events back.

use serde::{Deserialize, Serialize};

use crate::ids::{FeatureId, PlayerId, UnitId};
use crate::math::SimVector;

/// Something presentation layers may react to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEvent {
    /// A script emitted a particle effect from a piece.
    EmitParticleFromPiece {
        /// Effect type.
        sfx_type: i32,
        /// Emitting unit.
        unit: UnitId,
        /// Piece name.
        piece_name: String,
    },
    /// A script blew a piece off its unit.
    PieceExploded {
        /// Unit.
        unit: UnitId,
        /// Piece name.
        piece_name: String,
        /// Explosion flags.
        explode_type: i32,
    },
    /// A builder is nanolathing or reclaiming this tick.
    Nanolathe {
        /// The builder.
        unit: UnitId,
        /// Where the spray starts.
        origin: SimVector,
        /// Where it lands.
        target: SimVector,
        /// True when reclaiming rather than building.
        reverse: bool,
    },
    /// A weapon fired.
    WeaponFired {
        /// Firing unit.
        unit: UnitId,
        /// Weapon type.
        weapon_type: String,
        /// Muzzle position.
        position: SimVector,
    },
    /// A projectile hit something or detonated.
    WeaponHit {
        /// Impact position.
        position: SimVector,
        /// Weapon type.
        weapon_type: String,
    },
    /// A projectile bounced off the ground.
    ProjectileBounced {
        /// Bounce position.
        position: SimVector,
        /// Weapon type.
        weapon_type: String,
    },
    /// Explosion animation request.
    Explosion {
        /// Position.
        position: SimVector,
        /// Animation name.
        animation: String,
    },
    /// Smoke animation request.
    Smoke {
        /// Position.
        position: SimVector,
        /// Animation name.
        animation: String,
    },
    /// A unit was added.
    UnitSpawned {
        /// The unit.
        unit: UnitId,
    },
    /// A unit finished construction.
    UnitCompleted {
        /// The unit.
        unit: UnitId,
    },
    /// A unit died.
    UnitDied {
        /// The unit.
        unit: UnitId,
    },
    /// A feature was destroyed or fully reclaimed.
    FeatureRemoved {
        /// The feature.
        feature: FeatureId,
    },
    /// A player lost.
    PlayerDefeated {
        /// The player.
        player: PlayerId,
    },
}
