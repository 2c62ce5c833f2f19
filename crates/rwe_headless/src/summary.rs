//! JSON match summary.

use std::path::Path;

use rwe_core::events::GameEvent;
use rwe_core::ids::PlayerId;
use rwe_core::player::PlayerStatus;
use rwe_core::simulation::{GameSimulation, WinStatus};
use serde::{Deserialize, Serialize};

use crate::error::{HeadlessError, Result};

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// One player left standing.
    Won {
        /// The winner.
        player: PlayerId,
    },
    /// Nobody left standing.
    Draw,
    /// The tick limit was reached first.
    TickLimit,
    /// Peers disagreed on the state hash.
    Desync {
        /// Game time of the mismatching checkpoint.
        tick: u32,
        /// Our hash.
        local_hash: u32,
        /// The peer's hash.
        remote_hash: u32,
    },
}

impl MatchOutcome {
    /// Outcome from a decided win status, or `None` while undecided.
    #[must_use]
    pub fn from_win_status(status: WinStatus) -> Option<Self> {
        match status {
            WinStatus::Undecided => None,
            WinStatus::Won(player) => Some(Self::Won { player }),
            WinStatus::Draw => Some(Self::Draw),
        }
    }
}

/// Event counts over a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// Units added, including unfinished buildings.
    pub units_spawned: u32,
    /// Units finished.
    pub units_completed: u32,
    /// Units killed.
    pub units_died: u32,
    /// Weapon discharges.
    pub weapons_fired: u32,
    /// Features destroyed or reclaimed.
    pub features_removed: u32,
}

impl EventCounts {
    /// Count one event.
    pub fn record(&mut self, event: &GameEvent) {
        match event {
            GameEvent::UnitSpawned { .. } => self.units_spawned += 1,
            GameEvent::UnitCompleted { .. } => self.units_completed += 1,
            GameEvent::UnitDied { .. } => self.units_died += 1,
            GameEvent::WeaponFired { .. } => self.weapons_fired += 1,
            GameEvent::FeatureRemoved { .. } => self.features_removed += 1,
            _ => {}
        }
    }
}

/// One player at the end of the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player id.
    pub player: PlayerId,
    /// Side name.
    pub side: String,
    /// Final status.
    pub status: PlayerStatus,
    /// Units still alive.
    pub units: usize,
    /// Stored metal.
    pub metal: f64,
    /// Stored energy.
    pub energy: f64,
}

/// Everything worth reporting about a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Match name.
    pub name: String,
    /// Simulation seed.
    pub seed: u64,
    /// How it ended.
    pub outcome: MatchOutcome,
    /// Scene ticks run.
    pub scene_ticks: u32,
    /// Game ticks run.
    pub game_ticks: u32,
    /// Hash of the final state.
    pub final_hash: u32,
    /// Hash checkpoints verified against peers.
    pub verified_checkpoints: usize,
    /// Event counts.
    pub events: EventCounts,
    /// Per-player state.
    pub players: Vec<PlayerSummary>,
    /// Wall-clock run time.
    pub duration_seconds: f64,
}

impl MatchSummary {
    /// Per-player state of `simulation`.
    #[must_use]
    pub fn players_of(simulation: &GameSimulation) -> Vec<PlayerSummary> {
        simulation
            .players
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let player = PlayerId(index as u32);
                PlayerSummary {
                    player,
                    side: info.side.clone(),
                    status: info.status,
                    units: simulation.units.iter().filter(|(_, u)| u.owner == player).count(),
                    metal: info.metal.current.to_num::<f64>(),
                    energy: info.energy.current.to_num::<f64>(),
                }
            })
            .collect()
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| HeadlessError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwe_core::ids::UnitId;

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(MatchOutcome::Won { player: PlayerId(1) }).unwrap();
        assert_eq!(json["kind"], "won");
        assert_eq!(json["player"], 1);
        assert_eq!(MatchOutcome::from_win_status(WinStatus::Undecided), None);
    }

    #[test]
    fn test_event_counts() {
        let mut counts = EventCounts::default();
        let unit = UnitId::from_raw(0);
        counts.record(&GameEvent::UnitSpawned { unit });
        counts.record(&GameEvent::UnitDied { unit });
        counts.record(&GameEvent::UnitDied { unit });
        assert_eq!(counts.units_spawned, 1);
        assert_eq!(counts.units_died, 2);
    }
}
