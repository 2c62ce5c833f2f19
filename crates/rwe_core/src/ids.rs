//! Typed identifiers for simulation entities.

use serde::{Deserialize, Serialize};

use crate::vector_map::OpaqueId;

/// Tag type for unit ids.
#[derive(Debug, Clone, Copy)]
pub enum UnitTag {}

/// Tag type for feature ids.
#[derive(Debug, Clone, Copy)]
pub enum FeatureTag {}

/// Tag type for projectile ids.
#[derive(Debug, Clone, Copy)]
pub enum ProjectileTag {}

/// Identifies a unit.
pub type UnitId = OpaqueId<UnitTag>;

/// Identifies a map feature.
pub type FeatureId = OpaqueId<FeatureTag>;

/// Identifies a projectile.
pub type ProjectileId = OpaqueId<ProjectileTag>;

/// Identifies a player. Players are never removed, so this is a plain index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl PlayerId {
    /// Index into the player table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Number of simulation ticks since the match started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GameTime(pub u32);

impl GameTime {
    /// The next tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// This time plus `ticks`.
    #[must_use]
    pub const fn plus(self, ticks: u32) -> Self {
        Self(self.0 + ticks)
    }

    /// Ticks elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub const fn since(self, earlier: Self) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for GameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of ticks since the lockstep scene started. Commands are keyed by it.
pub type SceneTime = GameTime;
