//! Full skirmish: data directory on disk, play, record, verify.

use std::fs;
use std::path::Path;

use rwe_core::replay::Replay;
use rwe_headless::{load_match, paths, verify_replay, MatchOutcome, MatchRunner, MatchSummary, RunOptions};
use rwe_test_utils::fixtures::TEST_DATA_RON;

const DUEL_RON: &str = r#"MatchSettings(
    name: "duel",
    seed: 1234,
    terrain: Flat(width: 65, height: 65, ground: 20),
    players: [
        PlayerSettings(name: Some("Alice"), controller: Human, side: "ARM"),
        PlayerSettings(name: Some("Bob"), controller: Computer, side: "CORE", color: 1),
    ],
    units: [
        UnitPlacement(unit_type: "TANK", owner: 0, x: -120, z: 0),
        UnitPlacement(unit_type: "TANK", owner: 1, x: 120, z: 0),
    ],
    features: [FeaturePlacement(feature_type: "ROCK1", x: 0, z: 80)],
    commands: [
        ScriptedCommand(
            scene_time: 3,
            player: 1,
            action: Unit(unit: 1, command: IssueOrder(order: Move((x: 0, y: 0, z: 0)), mode: Immediate)),
        ),
    ],
    tick_limit: 120,
)"#;

fn create_data_dir(root: &Path) {
    fs::create_dir_all(paths::definitions_directory(root)).unwrap();
    fs::write(paths::definitions_directory(root).join("units.ron"), TEST_DATA_RON).unwrap();
    let map = paths::map_path(root, "duel");
    fs::create_dir_all(map.parent().unwrap()).unwrap();
    fs::write(map, DUEL_RON).unwrap();
}

fn play(root: &Path) -> (MatchSummary, Replay) {
    let (settings, database) = load_match(root, "duel").unwrap();
    let loaded = settings.build(database).unwrap();
    let mut runner = MatchRunner::new(&settings, loaded, RunOptions::default());
    let summary = runner.run().unwrap();
    (summary, runner.replay().clone())
}

#[test]
fn test_skirmish_plays_and_replays() {
    let dir = tempfile::tempdir().unwrap();
    create_data_dir(dir.path());

    let (summary, replay) = play(dir.path());
    assert_eq!(summary.outcome, MatchOutcome::TickLimit);
    assert_eq!(summary.scene_ticks, 120);
    assert_eq!(summary.verified_checkpoints, 4);
    assert_eq!(summary.players.len(), 2);
    assert_eq!(summary.players[0].units, 1);

    let replay_path = paths::replay_directory(dir.path()).join("duel.replay");
    fs::create_dir_all(replay_path.parent().unwrap()).unwrap();
    replay.save(&replay_path).unwrap();
    let loaded = Replay::load(&replay_path).unwrap();
    assert_eq!(loaded, replay);

    let (settings, database) = load_match(dir.path(), &loaded.match_name).unwrap();
    let verified = verify_replay(&settings, &database, &loaded, 2).unwrap();
    assert_eq!(verified.final_hash, summary.final_hash);
    assert_eq!(verified.checkpoints, 4);
}

#[test]
fn test_summary_is_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    create_data_dir(dir.path());
    let (summary, _) = play(dir.path());

    let path = dir.path().join("summary.json");
    summary.save(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["name"], "duel");
    assert_eq!(json["seed"], 1234);
    assert_eq!(json["outcome"]["kind"], "tick_limit");
}

#[test]
fn test_missing_map_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    create_data_dir(dir.path());
    assert!(load_match(dir.path(), "nowhere").is_err());
}
