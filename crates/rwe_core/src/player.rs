//! Players and their resource accounts.

use serde::{Deserialize, Serialize};

use crate::math::SimScalar;

/// Who controls a player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerControllerType {
    /// A person, local or remote.
    Human,
    /// An AI.
    Computer,
    /// Unoccupied.
    Open,
}

/// Whether a player is still in the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayerStatus {
    /// Playing.
    #[default]
    Alive,
    /// Lost their commander.
    Dead,
    /// Left the match.
    Resigned,
}

/// Per-tick bookkeeping for one resource type.
///
/// During a tick units report desired consumption (whether or not it is
/// granted), actual consumption and production. At the end of the tick the
/// stall flag for the next tick is computed and the stored amount updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceAccount {
    /// Stored amount.
    pub current: SimScalar,
    /// Storage capacity.
    pub max: SimScalar,
    /// Consumption requested this tick.
    pub desired_consumption: SimScalar,
    /// Consumption requested last tick.
    pub previous_desired_consumption: SimScalar,
    /// Consumption granted this tick.
    pub actual_consumption: SimScalar,
    /// Consumption granted last tick.
    pub previous_actual_consumption: SimScalar,
    /// Production this tick.
    pub production: SimScalar,
    /// Production last tick.
    pub previous_production: SimScalar,
    /// Demand exceeded supply at the end of last tick.
    pub stalled: bool,
}

impl ResourceAccount {
    /// Account holding `current` out of `max`.
    #[must_use]
    pub fn new(current: SimScalar, max: SimScalar) -> Self {
        Self {
            current,
            max,
            ..Self::default()
        }
    }

    /// Move this tick's buffers into the previous-tick slots.
    pub fn begin_tick(&mut self) {
        self.previous_desired_consumption = std::mem::take(&mut self.desired_consumption);
        self.previous_actual_consumption = std::mem::take(&mut self.actual_consumption);
        self.previous_production = std::mem::take(&mut self.production);
    }

    /// Record a desired consumption (negative `apparent`).
    pub fn record_desire(&mut self, apparent: SimScalar) {
        if apparent.is_negative() {
            self.desired_consumption -= apparent;
        }
    }

    /// Record a granted delta: negative values are consumption, positive
    /// values production.
    pub fn record_actual(&mut self, actual: SimScalar) {
        if actual.is_negative() {
            self.actual_consumption -= actual;
        } else {
            self.production += actual;
        }
    }

    /// Compute the stall flag for next tick and settle storage.
    pub fn end_tick(&mut self) {
        self.stalled = self.desired_consumption > self.production + self.current;
        self.current = (self.current - self.actual_consumption + self.production).clamp(SimScalar::ZERO, self.max);
    }
}

/// A player in the match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GamePlayerInfo {
    /// Display name, if any.
    pub name: Option<String>,
    /// Controller type.
    pub controller: PlayerControllerType,
    /// Match status.
    pub status: PlayerStatus,
    /// Side (faction) name.
    pub side: String,
    /// Palette colour index.
    pub color_index: u8,
    /// Energy account.
    pub energy: ResourceAccount,
    /// Metal account.
    pub metal: ResourceAccount,
}

impl GamePlayerInfo {
    /// A living player with the given starting resources and storage.
    #[must_use]
    pub fn new(
        controller: PlayerControllerType,
        side: &str,
        color_index: u8,
        energy: SimScalar,
        metal: SimScalar,
    ) -> Self {
        Self {
            name: None,
            controller,
            status: PlayerStatus::Alive,
            side: side.to_string(),
            color_index,
            energy: ResourceAccount::new(energy, energy),
            metal: ResourceAccount::new(metal, metal),
        }
    }

    /// True while the player is still playing.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.status == PlayerStatus::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: i32) -> SimScalar {
        SimScalar::from_int(v)
    }

    #[test]
    fn test_end_tick_settles_and_clamps() {
        let mut account = ResourceAccount::new(scalar(100), scalar(120));
        account.record_actual(scalar(50));
        account.record_actual(scalar(-10));
        account.end_tick();
        assert_eq!(account.current, scalar(120));
        assert!(!account.stalled);

        account.begin_tick();
        assert_eq!(account.previous_production, scalar(50));
        assert_eq!(account.production, SimScalar::ZERO);
    }

    #[test]
    fn test_stall_when_desire_exceeds_supply() {
        let mut account = ResourceAccount::new(scalar(5), scalar(100));
        account.record_desire(scalar(-10));
        account.record_actual(scalar(-5));
        account.end_tick();
        assert!(account.stalled);
        assert_eq!(account.current, SimScalar::ZERO);
    }

    #[test]
    fn test_positive_desire_is_ignored() {
        let mut account = ResourceAccount::default();
        account.record_desire(scalar(3));
        assert_eq!(account.desired_consumption, SimScalar::ZERO);
    }
}
