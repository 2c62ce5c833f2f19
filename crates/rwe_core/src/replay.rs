//! Replay recording and verification.
//!
//! A replay is the match seed plus every command set applied, keyed by
//! scene time and player, and the hash checkpoints seen while recording.
//! Feeding the same command stream into a freshly loaded match must
//! reproduce every checkpoint; the first mismatch is a desync.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CommandSet, PlayerCommandService};
use crate::error::{GameError, Result};
use crate::hash::GameHash;
use crate::ids::{GameTime, PlayerId, SceneTime};
use crate::scene::{GameScene, SceneTick};
use crate::simulation::GameSimulation;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// One player's commands for one scene tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommandSet {
    /// Scene time the set was applied at.
    pub scene_time: SceneTime,
    /// Issuing player.
    pub player: PlayerId,
    /// The commands, possibly none.
    pub commands: CommandSet,
}

/// A recorded match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Seed of the simulation RNG.
    pub seed: u64,
    /// Name of the map or match file that was loaded.
    pub match_name: String,
    /// Every applied command set in scene-time order.
    pub commands: Vec<ReplayCommandSet>,
    /// Hash checkpoints in game-time order.
    pub hashes: Vec<(GameTime, GameHash)>,
    /// Scene time after the last recorded tick.
    pub final_scene_time: SceneTime,
}

impl Replay {
    /// Empty replay for a match.
    #[must_use]
    pub fn new(match_name: impl Into<String>, seed: u64) -> Self {
        Self {
            version: REPLAY_VERSION,
            seed,
            match_name: match_name.into(),
            commands: Vec::new(),
            hashes: Vec::new(),
            final_scene_time: SceneTime::default(),
        }
    }

    /// Record everything a scene tick applied and reported.
    pub fn record_tick(&mut self, tick: &SceneTick) {
        for (player, commands) in &tick.commands {
            self.commands.push(ReplayCommandSet {
                scene_time: tick.scene_time,
                player: *player,
                commands: commands.clone(),
            });
        }
        if let Some(hash) = tick.hash {
            self.hashes.push(hash);
        }
        self.final_scene_time = tick.scene_time.next();
    }

    /// Number of scene ticks recorded.
    #[must_use]
    pub const fn duration(&self) -> u32 {
        self.final_scene_time.0
    }

    /// Players that appear in the command stream, ascending.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.commands.iter().map(|c| c.player).collect();
        players.sort_unstable();
        players.dedup();
        players
    }

    /// Encode with bincode.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::InvalidState(format!("failed to serialize replay: {e}")))
    }

    /// Decode with bincode, checking the format version.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a replay of this version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self =
            bincode::deserialize(bytes).map_err(|e| GameError::InvalidState(format!("failed to decode replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or decoding fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Plays a replay back against a freshly loaded match.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    scene: GameScene,
    next_hash: usize,
}

impl ReplayPlayer {
    /// Queue the whole command stream for `simulation`, which must be the
    /// match state the replay was recorded from, seeded with its seed.
    #[must_use]
    pub fn new(replay: Replay, simulation: GameSimulation) -> Self {
        let players = replay.players();
        let service = Arc::new(PlayerCommandService::new(&players));
        for set in &replay.commands {
            service.push_commands(set.player, set.commands.clone());
        }
        Self {
            replay,
            scene: GameScene::new(simulation, service),
            next_hash: 0,
        }
    }

    /// Use the hash interval the replay was recorded with.
    #[must_use]
    pub fn with_hash_interval(mut self, ticks: u32) -> Self {
        self.scene = self.scene.with_hash_interval(ticks);
        self
    }

    /// Run one scene tick, checking any hash it produces.
    ///
    /// Returns `Ok(false)` once the replay is exhausted.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] at the first checkpoint whose
    /// hash differs from the recording.
    pub fn advance(&mut self) -> Result<bool> {
        if self.is_finished() {
            return Ok(false);
        }
        let Some(tick) = self.scene.try_tick() else {
            return Ok(false);
        };
        if let Some((time, hash)) = tick.hash {
            if let Some(&(recorded_time, recorded)) = self.replay.hashes.get(self.next_hash) {
                if recorded_time != time || recorded != hash {
                    return Err(GameError::DesyncDetected {
                        tick: time.0,
                        local_hash: hash.0,
                        remote_hash: recorded.0,
                    });
                }
                self.next_hash += 1;
            }
        }
        Ok(!self.is_finished())
    }

    /// Play to the end, checking every checkpoint.
    ///
    /// # Errors
    /// Returns the first desync.
    pub fn verify(&mut self) -> Result<()> {
        while self.advance()? {}
        debug!(checkpoints = self.next_hash, "replay verified");
        Ok(())
    }

    /// Hash checkpoints matched so far.
    #[must_use]
    pub fn checkpoints_verified(&self) -> usize {
        self.next_hash
    }

    /// True once every recorded scene tick has run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.scene.scene_time() >= self.replay.final_scene_time
    }

    /// The scene being played.
    #[must_use]
    pub fn scene(&self) -> &GameScene {
        &self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{PlayerCommand, PlayerUnitCommand};
    use crate::data::UnitDatabase;
    use crate::math::SimScalar;
    use crate::player::{GamePlayerInfo, PlayerControllerType};
    use crate::terrain::MapTerrain;
    use crate::unit::FireOrders;

    fn create_test_simulation() -> GameSimulation {
        let mut sim = GameSimulation::new(MapTerrain::flat(9, 9, 0, SimScalar::ZERO), Arc::new(UnitDatabase::new()), 7);
        sim.add_player(GamePlayerInfo::new(
            PlayerControllerType::Human,
            "ARM",
            0,
            SimScalar::ZERO,
            SimScalar::ZERO,
        ));
        sim
    }

    fn record(ticks: u32) -> Replay {
        let service = Arc::new(PlayerCommandService::new(&[PlayerId(0)]));
        let mut scene = GameScene::new(create_test_simulation(), Arc::clone(&service)).with_hash_interval(5);
        let mut replay = Replay::new("test_map", 7);
        for i in 0..ticks {
            let commands = if i == 3 {
                vec![PlayerCommand::UnitCommand {
                    unit: crate::ids::UnitId::from_raw(0),
                    command: PlayerUnitCommand::SetFireOrders(FireOrders::HoldFire),
                }]
            } else {
                Vec::new()
            };
            service.push_commands(PlayerId(0), commands);
            let tick = scene.try_tick().expect("single player always ready");
            replay.record_tick(&tick);
        }
        replay
    }

    #[test]
    fn test_record_captures_commands_and_hashes() {
        let replay = record(20);
        assert_eq!(replay.duration(), 20);
        assert_eq!(replay.commands.len(), 20);
        assert_eq!(replay.hashes.len(), 4);
        assert_eq!(replay.commands[3].commands.len(), 1);
        assert_eq!(replay.players(), vec![PlayerId(0)]);
    }

    #[test]
    fn test_bytes_round_trip_and_version_check() {
        let replay = record(6);
        let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, replay);

        let mut future = replay;
        future.version = REPLAY_VERSION + 1;
        assert!(Replay::from_bytes(&future.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn test_replay_verifies_against_fresh_match() {
        let replay = record(20);
        let mut player = ReplayPlayer::new(replay, create_test_simulation()).with_hash_interval(5);
        player.verify().unwrap();
        assert!(player.is_finished());
        assert_eq!(player.checkpoints_verified(), 4);
    }

    #[test]
    fn test_tampered_hash_is_a_desync() {
        let mut replay = record(10);
        replay.hashes[1].1 = GameHash(replay.hashes[1].1 .0 ^ 1);
        let mut player = ReplayPlayer::new(replay, create_test_simulation()).with_hash_interval(5);
        let error = player.verify().unwrap_err();
        assert!(matches!(error, GameError::DesyncDetected { tick: 10, .. }));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.rwr");
        let replay = record(5);
        replay.save(&path).unwrap();
        assert_eq!(Replay::load(&path).unwrap(), replay);
    }
}
