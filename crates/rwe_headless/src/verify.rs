//! Replay verification.
//!
//! A replay is re-simulated from the match file it was recorded on. Every
//! recorded hash checkpoint must match, and with more than one run all
//! runs must end on the same state.

use std::sync::Arc;

use rayon::prelude::*;
use rwe_core::data::UnitDatabase;
use rwe_core::replay::{Replay, ReplayPlayer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HeadlessError, Result};
use crate::settings::MatchSettings;

/// Result of one verified playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRun {
    /// Hash checkpoints that matched.
    pub checkpoints: usize,
    /// Scene ticks played.
    pub scene_ticks: u32,
    /// Hash of the final state.
    pub final_hash: u32,
}

/// Play `replay` once against a fresh simulation.
pub fn verify_once(settings: &MatchSettings, database: Arc<UnitDatabase>, replay: Replay) -> Result<VerifiedRun> {
    let loaded = settings.build_with_seed(database, replay.seed)?;
    let mut player = ReplayPlayer::new(replay, loaded.simulation).with_hash_interval(settings.hash_interval);
    player.verify()?;
    let scene = player.scene();
    Ok(VerifiedRun {
        checkpoints: player.checkpoints_verified(),
        scene_ticks: scene.scene_time().0,
        final_hash: scene.simulation().compute_hash().0,
    })
}

/// Play `replay` `runs` times in parallel and check every run agrees.
///
/// # Errors
/// Returns [`HeadlessError::Game`] with a desync if a run diverges from
/// the recorded hashes, or [`HeadlessError::NonDeterministic`] if runs end
/// on different states.
pub fn verify_replay(
    settings: &MatchSettings,
    database: &Arc<UnitDatabase>,
    replay: &Replay,
    runs: usize,
) -> Result<VerifiedRun> {
    if replay.match_name != settings.name {
        return Err(HeadlessError::InvalidSettings(format!(
            "replay was recorded on '{}', not '{}'",
            replay.match_name, settings.name
        )));
    }
    let runs = runs.max(1);
    info!(runs, ticks = replay.duration(), checkpoints = replay.hashes.len(), "verifying replay");

    let results: Vec<VerifiedRun> = (0..runs)
        .into_par_iter()
        .map(|run| {
            let result = verify_once(settings, Arc::clone(database), replay.clone())?;
            debug!(run, hash = result.final_hash, "replay run finished");
            Ok(result)
        })
        .collect::<Result<_>>()?;

    let first = results[0];
    if let Some((run, other)) = results.iter().enumerate().find(|(_, r)| **r != first) {
        return Err(HeadlessError::NonDeterministic(format!(
            "run {run} ended on hash {:08x} at tick {}, run 0 on {:08x} at tick {}",
            other.final_hash, other.scene_ticks, first.final_hash, first.scene_ticks
        )));
    }
    info!(checkpoints = first.checkpoints, hash = first.final_hash, "replay verified");
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockstep::{MatchRunner, RunOptions};
    use crate::settings::MatchSettings;
    use rwe_core::error::GameError;
    use rwe_core::hash::GameHash;
    use rwe_test_utils::fixtures::create_test_database;

    const MATCH_RON: &str = r#"MatchSettings(
        name: "duel",
        seed: 3,
        terrain: Flat(width: 65, height: 65, ground: 20),
        players: [
            PlayerSettings(controller: Human, side: "ARM"),
            PlayerSettings(controller: Human, side: "CORE"),
        ],
        units: [
            UnitPlacement(unit_type: "TANK", owner: 0, x: -150, z: 0),
            UnitPlacement(unit_type: "TANK", owner: 1, x: 150, z: 0),
        ],
        commands: [
            ScriptedCommand(
                scene_time: 1,
                player: 0,
                action: Unit(unit: 0, command: IssueOrder(order: Move((x: 0, y: 0, z: 0)), mode: Immediate)),
            ),
        ],
        tick_limit: 45,
        hash_interval: 15,
    )"#;

    fn record() -> (MatchSettings, Replay) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.ron");
        std::fs::write(&path, MATCH_RON).unwrap();
        let settings = MatchSettings::load(&path).unwrap();
        let loaded = settings.build(create_test_database()).unwrap();
        let mut runner = MatchRunner::new(&settings, loaded, RunOptions::default());
        runner.run().unwrap();
        (settings, runner.replay().clone())
    }

    #[test]
    fn test_recorded_match_verifies() {
        let (settings, replay) = record();
        let result = verify_replay(&settings, &create_test_database(), &replay, 3).unwrap();
        assert_eq!(result.scene_ticks, 45);
        assert_eq!(result.checkpoints, 3);
    }

    #[test]
    fn test_tampered_hash_is_a_desync() {
        let (settings, mut replay) = record();
        replay.hashes[1].1 = GameHash(replay.hashes[1].1 .0 ^ 1);
        let err = verify_replay(&settings, &create_test_database(), &replay, 1).unwrap_err();
        assert!(matches!(err, HeadlessError::Game(GameError::DesyncDetected { tick: 30, .. })));
    }

    #[test]
    fn test_wrong_match_is_rejected() {
        let (mut settings, replay) = record();
        settings.name = "other".into();
        let err = verify_replay(&settings, &create_test_database(), &replay, 1).unwrap_err();
        assert!(matches!(err, HeadlessError::InvalidSettings(_)));
    }
}
