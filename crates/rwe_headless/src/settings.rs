//! Match settings.
//!
//! A match file describes everything needed to start a skirmish: the seed,
//! the heightmap, the players, what stands on the map at tick zero and an
//! optional command script. Every peer in a networked match must load an
//! identical file.
//!
//! ```ron
//! MatchSettings(
//!     name: "Coast",
//!     seed: 42,
//!     terrain: Flat(width: 65, height: 65, ground: 20),
//!     players: [
//!         PlayerSettings(controller: Human, side: "ARM"),
//!         PlayerSettings(controller: Computer, side: "CORE"),
//!     ],
//!     units: [UnitPlacement(unit_type: "ARMCK", owner: 0, x: -200, z: 0)],
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rwe_core::command::{CommandSet, PlayerCommand, PlayerUnitCommand};
use rwe_core::constants::{HASH_INTERVAL_TICKS, TICK_RATE};
use rwe_core::data::UnitDatabase;
use rwe_core::grid::Grid;
use rwe_core::ids::{GameTime, PlayerId, SceneTime, UnitId};
use rwe_core::math::{SimScalar, SimVector};
use rwe_core::player::{GamePlayerInfo, PlayerControllerType};
use rwe_core::simulation::GameSimulation;
use rwe_core::terrain::MapTerrain;
use rwe_net::NetworkConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HeadlessError, Result};

/// Heightmap source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerrainSettings {
    /// Every corner at one height.
    Flat {
        /// Corners per row.
        width: usize,
        /// Corners per column.
        height: usize,
        /// Corner height.
        ground: u8,
    },
    /// Explicit corner heights, row by row.
    Heights {
        /// Corners per row.
        width: usize,
        /// Corners per column.
        height: usize,
        /// `width * height` corner heights.
        heights: Vec<u8>,
    },
}

/// One player slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Who controls the slot.
    pub controller: PlayerControllerType,
    /// Side name.
    pub side: String,
    /// Palette colour index.
    #[serde(default)]
    pub color: u8,
    /// Starting energy and energy storage.
    #[serde(default = "default_resources")]
    pub energy: i32,
    /// Starting metal and metal storage.
    #[serde(default = "default_resources")]
    pub metal: i32,
}

fn default_resources() -> i32 {
    1000
}

/// A unit present at tick zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type name.
    pub unit_type: String,
    /// Owning player index.
    pub owner: u32,
    /// World X.
    pub x: i32,
    /// World Z.
    pub z: i32,
}

/// A feature present at tick zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePlacement {
    /// Feature type name.
    pub feature_type: String,
    /// World X.
    pub x: i32,
    /// World Z.
    pub z: i32,
}

/// What a scripted command does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptedAction {
    /// Pause the match.
    PauseGame,
    /// Resume the match.
    UnpauseGame,
    /// Command one of the starting units, by index into `units`.
    Unit {
        /// Index into [`MatchSettings::units`].
        unit: usize,
        /// The command. Unit ids inside orders are raw packed ids.
        command: PlayerUnitCommand,
    },
}

/// A command issued by a player at a fixed scene time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Scene time the command applies at.
    pub scene_time: u32,
    /// Issuing player index.
    pub player: u32,
    /// The command.
    pub action: ScriptedAction,
}

/// A complete match description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    /// Match name, recorded in replays.
    pub name: String,
    /// Seed of the simulation RNG.
    pub seed: u64,
    /// Heightmap.
    pub terrain: TerrainSettings,
    /// Sea level in world units.
    #[serde(default)]
    pub sea_level: i32,
    /// Player slots; slot `i` is player `i`.
    pub players: Vec<PlayerSettings>,
    /// Starting units.
    #[serde(default)]
    pub units: Vec<UnitPlacement>,
    /// Starting features.
    #[serde(default)]
    pub features: Vec<FeaturePlacement>,
    /// Scripted commands.
    #[serde(default)]
    pub commands: Vec<ScriptedCommand>,
    /// Scene ticks to run before stopping.
    #[serde(default = "default_tick_limit")]
    pub tick_limit: u32,
    /// Game ticks between hash checkpoints.
    #[serde(default = "default_hash_interval")]
    pub hash_interval: u32,
    /// Scene ticks between issuing a command and applying it.
    #[serde(default = "default_command_delay")]
    pub command_delay: u32,
    /// The player this process controls in a networked match.
    #[serde(default)]
    pub local_player: PlayerId,
    /// Peers, for a networked match.
    #[serde(default)]
    pub network: Option<NetworkConfig>,
}

fn default_tick_limit() -> u32 {
    5 * 60 * TICK_RATE
}

fn default_hash_interval() -> u32 {
    HASH_INTERVAL_TICKS
}

fn default_command_delay() -> u32 {
    3
}

/// A freshly built simulation and the ids its starting units received.
#[derive(Debug)]
pub struct LoadedMatch {
    /// The simulation at tick zero.
    pub simulation: GameSimulation,
    /// Id of each entry in [`MatchSettings::units`].
    pub unit_ids: Vec<UnitId>,
}

impl MatchSettings {
    /// Parse a match file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| HeadlessError::io(path, e))?;
        ron::from_str(&contents).map_err(|source| HeadlessError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every player id.
    #[must_use]
    pub fn player_ids(&self) -> Vec<PlayerId> {
        (0..self.players.len() as u32).map(PlayerId).collect()
    }

    /// Players whose commands this process produces: everyone not driven
    /// by a network peer.
    #[must_use]
    pub fn local_players(&self) -> Vec<PlayerId> {
        let remote: Vec<PlayerId> = self
            .network
            .as_ref()
            .map(|n| n.peers.iter().map(|p| p.player).collect())
            .unwrap_or_default();
        self.player_ids().into_iter().filter(|p| !remote.contains(p)).collect()
    }

    fn check(&self) -> Result<()> {
        let invalid = |message: String| Err(HeadlessError::InvalidSettings(message));
        if self.players.is_empty() {
            return invalid("no players".into());
        }
        let player_count = self.players.len() as u32;
        if let TerrainSettings::Heights { width, height, heights } = &self.terrain {
            if heights.len() != width * height {
                return invalid(format!("{} heights for a {width}x{height} map", heights.len()));
            }
        }
        let (width, height) = match &self.terrain {
            TerrainSettings::Flat { width, height, .. } | TerrainSettings::Heights { width, height, .. } => {
                (*width, *height)
            }
        };
        if width < 2 || height < 2 {
            return invalid(format!("a {width}x{height} heightmap has no cells"));
        }
        if let Some(unit) = self.units.iter().find(|u| u.owner >= player_count) {
            return invalid(format!("{} is owned by missing player {}", unit.unit_type, unit.owner));
        }
        for command in &self.commands {
            if command.player >= player_count {
                return invalid(format!("command for missing player {}", command.player));
            }
            if let ScriptedAction::Unit { unit, .. } = command.action {
                if unit >= self.units.len() {
                    return invalid(format!("command for missing unit {unit}"));
                }
            }
        }
        if self.local_player.0 >= player_count {
            return invalid(format!("local player {} does not exist", self.local_player));
        }
        if let Some(network) = &self.network {
            if network.peers.iter().any(|p| p.player == self.local_player || p.player.0 >= player_count) {
                return invalid("peer assigned to the local player or a missing player".into());
            }
        }
        Ok(())
    }

    fn build_terrain(&self) -> MapTerrain {
        let sea_level = SimScalar::from_int(self.sea_level);
        match &self.terrain {
            TerrainSettings::Flat { width, height, ground } => MapTerrain::flat(*width, *height, *ground, sea_level),
            TerrainSettings::Heights { width, height, heights } => {
                MapTerrain::new(Grid::from_vec(*width, *height, heights.clone()), sea_level)
            }
        }
    }

    /// Build the tick-zero simulation, seeded with `seed`.
    ///
    /// # Errors
    /// Returns an error if the settings are inconsistent, name unknown
    /// types, or place units on blocked ground.
    pub fn build_with_seed(&self, database: Arc<UnitDatabase>, seed: u64) -> Result<LoadedMatch> {
        self.check()?;
        let mut simulation = GameSimulation::new(self.build_terrain(), database, seed);
        for player in &self.players {
            let mut info = GamePlayerInfo::new(
                player.controller,
                &player.side,
                player.color,
                SimScalar::from_int(player.energy),
                SimScalar::from_int(player.metal),
            );
            info.name.clone_from(&player.name);
            simulation.add_player(info);
        }
        for feature in &self.features {
            simulation.spawn_feature(&feature.feature_type, SimVector::from_ints(feature.x, 0, feature.z))?;
        }
        let mut unit_ids = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            let position = SimVector::from_ints(unit.x, 0, unit.z);
            unit_ids.push(simulation.spawn_unit(&unit.unit_type, PlayerId(unit.owner), position)?);
        }
        info!(
            name = %self.name,
            seed,
            players = self.players.len(),
            units = unit_ids.len(),
            features = self.features.len(),
            "match loaded"
        );
        Ok(LoadedMatch { simulation, unit_ids })
    }

    /// Build the tick-zero simulation with the match seed.
    ///
    /// # Errors
    /// See [`MatchSettings::build_with_seed`].
    pub fn build(&self, database: Arc<UnitDatabase>) -> Result<LoadedMatch> {
        self.build_with_seed(database, self.seed)
    }

    /// Scripted commands grouped by scene time and player, with unit
    /// indices resolved against `unit_ids`.
    #[must_use]
    pub fn resolve_commands(&self, unit_ids: &[UnitId]) -> BTreeMap<(SceneTime, PlayerId), CommandSet> {
        let mut sets: BTreeMap<(SceneTime, PlayerId), CommandSet> = BTreeMap::new();
        for scripted in &self.commands {
            let command = match &scripted.action {
                ScriptedAction::PauseGame => PlayerCommand::PauseGame,
                ScriptedAction::UnpauseGame => PlayerCommand::UnpauseGame,
                ScriptedAction::Unit { unit, command } => {
                    let Some(&id) = unit_ids.get(*unit) else {
                        continue;
                    };
                    PlayerCommand::UnitCommand {
                        unit: id,
                        command: command.clone(),
                    }
                }
            };
            sets.entry((GameTime(scripted.scene_time), PlayerId(scripted.player)))
                .or_default()
                .push(command);
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwe_core::command::IssueMode;
    use rwe_core::unit::UnitOrder;
    use rwe_test_utils::fixtures::create_test_database;

    const SKIRMISH_RON: &str = r#"MatchSettings(
        name: "Skirmish",
        seed: 42,
        terrain: Flat(width: 65, height: 65, ground: 20),
        players: [
            PlayerSettings(controller: Human, side: "ARM"),
            PlayerSettings(controller: Computer, side: "CORE", color: 1, metal: 500),
        ],
        units: [
            UnitPlacement(unit_type: "TANK", owner: 0, x: -200, z: 0),
            UnitPlacement(unit_type: "MORTAR", owner: 1, x: 200, z: 0),
        ],
        features: [FeaturePlacement(feature_type: "ROCK1", x: 0, z: 64)],
        commands: [
            ScriptedCommand(
                scene_time: 5,
                player: 0,
                action: Unit(unit: 0, command: IssueOrder(order: Move((x: 0, y: 0, z: 0)), mode: Immediate)),
            ),
            ScriptedCommand(scene_time: 5, player: 0, action: PauseGame),
        ],
        tick_limit: 90,
    )"#;

    #[test]
    fn test_parse_and_build() {
        let settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        assert_eq!(settings.hash_interval, HASH_INTERVAL_TICKS);
        assert_eq!(settings.command_delay, 3);
        assert_eq!(settings.players[1].metal, 500);
        assert_eq!(settings.players[0].energy, 1000);

        let loaded = settings.build(create_test_database()).unwrap();
        assert_eq!(loaded.unit_ids.len(), 2);
        assert_eq!(loaded.simulation.players.len(), 2);
        assert_eq!(loaded.simulation.features.len(), 1);
        let mortar = loaded.simulation.unit(loaded.unit_ids[1]).unwrap();
        assert_eq!(mortar.owner, PlayerId(1));
    }

    #[test]
    fn test_resolve_commands() {
        let settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        let ids = [UnitId::from_raw(0x100), UnitId::from_raw(0x200)];
        let sets = settings.resolve_commands(&ids);
        let set = &sets[&(GameTime(5), PlayerId(0))];
        assert_eq!(
            set[0],
            PlayerCommand::UnitCommand {
                unit: ids[0],
                command: PlayerUnitCommand::IssueOrder {
                    order: UnitOrder::Move(SimVector::from_ints(0, 0, 0)),
                    mode: IssueMode::Immediate,
                },
            }
        );
        assert_eq!(set[1], PlayerCommand::PauseGame);
    }

    #[test]
    fn test_inconsistent_settings_rejected() {
        let mut settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        settings.units[0].owner = 5;
        assert!(matches!(
            settings.build(create_test_database()),
            Err(HeadlessError::InvalidSettings(_))
        ));

        let mut settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        settings.terrain = TerrainSettings::Heights {
            width: 3,
            height: 3,
            heights: vec![0; 8],
        };
        assert!(matches!(
            settings.build(create_test_database()),
            Err(HeadlessError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_unknown_unit_type_is_data_error() {
        let mut settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        settings.units[0].unit_type = "ARMNOPE".into();
        assert!(matches!(
            settings.build(create_test_database()),
            Err(HeadlessError::Game(_))
        ));
    }

    #[test]
    fn test_local_players_exclude_peers() {
        let mut settings: MatchSettings = ron::from_str(SKIRMISH_RON).unwrap();
        assert_eq!(settings.local_players(), vec![PlayerId(0), PlayerId(1)]);
        settings.network = Some(
            NetworkConfig::new("127.0.0.1:0".parse().unwrap()).with_peer("127.0.0.1:9".parse().unwrap(), PlayerId(1)),
        );
        assert_eq!(settings.local_players(), vec![PlayerId(0)]);
    }
}
