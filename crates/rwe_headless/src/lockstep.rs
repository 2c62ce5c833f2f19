//! The lockstep main loop.
//!
//! Each iteration the runner tops up its local players' command sets to
//! `command_delay` ticks ahead of the scene, hands them to the network,
//! then runs as many scene ticks as pacing allows. A tick runs only once
//! every player's set for it has arrived. Hash checkpoints go to the peers
//! and into the ledger; the first mismatch ends the match as a desync.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rwe_core::command::{CommandSet, PlayerCommandService};
use rwe_core::constants::TICK_DURATION_MS;
use rwe_core::error::GameError;
use rwe_core::ids::{GameTime, PlayerId, SceneTime};
use rwe_core::replay::Replay;
use rwe_core::scene::GameScene;
use rwe_net::hashes::HashLedger;
use rwe_net::loading::LoadingNetworkService;
use rwe_net::service::GameNetworkService;
use rwe_net::NetworkConfig;
use tracing::{debug, error, info, warn};

use crate::error::{HeadlessError, Result};
use crate::settings::{LoadedMatch, MatchSettings};
use crate::summary::{EventCounts, MatchOutcome, MatchSummary};

/// How long to wait for every peer to finish loading.
pub const LOADING_TIMEOUT: Duration = Duration::from_secs(60);

const TICK_DURATION: Duration = Duration::from_millis(TICK_DURATION_MS as u64);

/// Scene ticks to run this frame: one normally, two when the peers'
/// average scene time is more than a tick ahead of ours, none when it is
/// more than a tick behind.
#[must_use]
pub fn ticks_to_run(local: SceneTime, average: SceneTime) -> u32 {
    if average.0 > local.0 + 1 {
        2
    } else if average.0 + 1 < local.0 {
        0
    } else {
        1
    }
}

/// Runner options that are not part of the match file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Pace ticks to wall-clock time. Networked matches always do.
    pub realtime: bool,
    /// Override the match file's tick limit.
    pub tick_limit: Option<u32>,
}

/// A match in progress.
#[derive(Debug)]
pub struct MatchRunner {
    name: String,
    seed: u64,
    scene: GameScene,
    local_players: Vec<PlayerId>,
    scripted: BTreeMap<(SceneTime, PlayerId), CommandSet>,
    command_delay: u32,
    tick_limit: u32,
    realtime: bool,
    network: Option<GameNetworkService>,
    hashes: Arc<HashLedger>,
    replay: Replay,
    next_local_set: u32,
    events: EventCounts,
    verified_checkpoints: usize,
}

impl MatchRunner {
    /// Runner over an already loaded match with no network.
    #[must_use]
    pub fn new(settings: &MatchSettings, loaded: LoadedMatch, options: RunOptions) -> Self {
        let commands = Arc::new(PlayerCommandService::new(&settings.player_ids()));
        let scene = GameScene::new(loaded.simulation, commands).with_hash_interval(settings.hash_interval);
        Self {
            name: settings.name.clone(),
            seed: settings.seed,
            scene,
            local_players: settings.local_players(),
            scripted: settings.resolve_commands(&loaded.unit_ids),
            command_delay: settings.command_delay,
            tick_limit: options.tick_limit.unwrap_or(settings.tick_limit),
            realtime: options.realtime,
            network: None,
            hashes: Arc::new(HashLedger::new(&[])),
            replay: Replay::new(&settings.name, settings.seed),
            next_local_set: 0,
            events: EventCounts::default(),
            verified_checkpoints: 0,
        }
    }

    /// Wait for every peer to load, then start the game network.
    ///
    /// # Errors
    /// Returns an error if a socket cannot be bound or the peers do not
    /// all report ready within [`LOADING_TIMEOUT`].
    pub fn connect(&mut self, config: &NetworkConfig) -> Result<()> {
        wait_for_peers(config, LOADING_TIMEOUT)?;
        let peers: Vec<PlayerId> = config.peers.iter().map(|p| p.player).collect();
        self.hashes = Arc::new(HashLedger::new(&peers));
        let commands = Arc::clone(self.scene.command_service());
        self.network = Some(GameNetworkService::start(config, commands, Arc::clone(&self.hashes))?);
        self.realtime = true;
        Ok(())
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &GameScene {
        &self.scene
    }

    /// Everything applied so far.
    #[must_use]
    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    fn finished(&self) -> Option<MatchOutcome> {
        if let Some(outcome) = MatchOutcome::from_win_status(self.scene.win_status()) {
            return Some(outcome);
        }
        (self.scene.scene_time().0 >= self.tick_limit).then_some(MatchOutcome::TickLimit)
    }

    fn submit_local_sets(&mut self) -> Result<()> {
        let horizon = self.scene.scene_time().0 + self.command_delay;
        while self.next_local_set <= horizon {
            let time = GameTime(self.next_local_set);
            for &player in &self.local_players {
                let set = self.scripted.remove(&(time, player)).unwrap_or_default();
                if let Some(network) = &self.network {
                    network.submit_commands(self.scene.scene_time(), set.clone())?;
                }
                self.scene.command_service().push_commands(player, set);
            }
            self.next_local_set += 1;
        }
        Ok(())
    }

    /// Run one scene tick if its commands are in. Returns whether it ran.
    fn tick_once(&mut self) -> Result<bool> {
        let Some(tick) = self.scene.try_tick() else {
            return Ok(false);
        };
        if let Some((time, hash)) = tick.hash {
            self.hashes.record_local(time, hash);
            if let Some(network) = &self.network {
                network.submit_hash(tick.scene_time, hash)?;
            }
        }
        self.replay.record_tick(&tick);
        for event in self.scene.simulation_mut().drain_events() {
            self.events.record(&event);
        }
        Ok(true)
    }

    fn check_hashes(&mut self) -> std::result::Result<(), GameError> {
        self.verified_checkpoints = self.hashes.check()?;
        Ok(())
    }

    fn average_scene_time(&self) -> SceneTime {
        let local = self.scene.scene_time();
        self.network
            .as_ref()
            .map_or(local, |network| network.estimate_average_scene_time(local))
    }

    /// Play until someone wins, the tick limit, or a desync.
    ///
    /// A desync is reported in the summary outcome rather than as an
    /// error; the network is shut down so no further peer commands are
    /// accepted.
    ///
    /// # Errors
    /// Returns an error if the network thread dies.
    pub fn run(&mut self) -> Result<MatchSummary> {
        let started = Instant::now();
        let mut next_frame = started;
        info!(name = %self.name, tick_limit = self.tick_limit, realtime = self.realtime, "match started");

        let outcome = loop {
            if let Some(outcome) = self.finished() {
                break outcome;
            }
            if let Err(GameError::DesyncDetected {
                tick,
                local_hash,
                remote_hash,
            }) = self.check_hashes()
            {
                error!(tick, local_hash, remote_hash, "match desynced, aborting");
                if let Some(network) = self.network.take() {
                    network.stop();
                }
                break MatchOutcome::Desync {
                    tick,
                    local_hash,
                    remote_hash,
                };
            }
            if let Some(network) = &self.network {
                if !network.is_running() {
                    return Err(HeadlessError::Network(rwe_net::NetworkError::Disconnected));
                }
            }
            self.submit_local_sets()?;

            if !self.realtime {
                if !self.tick_once()? {
                    warn!(scene_time = %self.scene.scene_time(), "no commands for the next tick");
                    thread::sleep(Duration::from_millis(1));
                }
                continue;
            }

            let now = Instant::now();
            if now < next_frame {
                thread::sleep(next_frame - now);
                continue;
            }
            let budget = ticks_to_run(self.scene.scene_time(), self.average_scene_time());
            let mut ran = 0;
            while ran < budget && self.finished().is_none() && self.tick_once()? {
                ran += 1;
            }
            if ran == budget {
                next_frame += TICK_DURATION;
            } else {
                debug!(scene_time = %self.scene.scene_time(), "waiting for peer commands");
                thread::sleep(Duration::from_millis(1));
            }
        };

        // Final comparison for checkpoints that arrived during the last frame.
        if !matches!(outcome, MatchOutcome::Desync { .. }) {
            let _ = self.check_hashes();
        }
        if let Some(network) = self.network.take() {
            network.stop();
        }

        let simulation = self.scene.simulation();
        let summary = MatchSummary {
            name: self.name.clone(),
            seed: self.seed,
            outcome,
            scene_ticks: self.scene.scene_time().0,
            game_ticks: simulation.game_time.0,
            final_hash: simulation.compute_hash().0,
            verified_checkpoints: self.verified_checkpoints,
            events: self.events,
            players: MatchSummary::players_of(simulation),
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        info!(outcome = ?summary.outcome, scene_ticks = summary.scene_ticks, hash = summary.final_hash, "match finished");
        Ok(summary)
    }
}

/// Exchange loading status with every peer until all are ready.
///
/// # Errors
/// Returns [`HeadlessError::LoadingTimeout`] if some peer is still
/// loading after `timeout`.
pub fn wait_for_peers(config: &NetworkConfig, timeout: Duration) -> Result<()> {
    let loading = LoadingNetworkService::start(config)?;
    loading.set_ready();
    let started = Instant::now();
    while !loading.all_ready() {
        if started.elapsed() > timeout {
            for status in loading.statuses() {
                warn!(player = %status.player, endpoint = %status.address, state = ?status.state, "peer status");
            }
            loading.stop();
            return Err(HeadlessError::LoadingTimeout);
        }
        thread::sleep(Duration::from_millis(10));
    }
    info!(peers = config.peers.len(), "all peers ready");
    loading.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwe_test_utils::fixtures::{create_test_database, TEST_GROUND_HEIGHT};

    use crate::settings::{PlayerSettings, ScriptedAction, ScriptedCommand, TerrainSettings, UnitPlacement};
    use rwe_core::command::{IssueMode, PlayerUnitCommand};
    use rwe_core::math::SimVector;
    use rwe_core::player::PlayerControllerType;
    use rwe_core::unit::UnitOrder;

    fn create_test_settings() -> MatchSettings {
        let player = |side: &str| PlayerSettings {
            name: None,
            controller: PlayerControllerType::Human,
            side: side.to_string(),
            color: 0,
            energy: 1000,
            metal: 1000,
        };
        MatchSettings {
            name: "test".into(),
            seed: 9,
            terrain: TerrainSettings::Flat {
                width: 65,
                height: 65,
                ground: TEST_GROUND_HEIGHT,
            },
            sea_level: 0,
            players: vec![player("ARM"), player("CORE")],
            units: vec![
                UnitPlacement {
                    unit_type: "TANK".into(),
                    owner: 0,
                    x: -100,
                    z: 0,
                },
                UnitPlacement {
                    unit_type: "TANK".into(),
                    owner: 1,
                    x: 100,
                    z: 0,
                },
            ],
            features: Vec::new(),
            commands: vec![ScriptedCommand {
                scene_time: 2,
                player: 0,
                action: ScriptedAction::Unit {
                    unit: 0,
                    command: PlayerUnitCommand::IssueOrder {
                        order: UnitOrder::Move(SimVector::from_ints(-100, 0, 200)),
                        mode: IssueMode::Immediate,
                    },
                },
            }],
            tick_limit: 60,
            hash_interval: 10,
            command_delay: 3,
            local_player: PlayerId(0),
            network: None,
        }
    }

    fn run_test_match() -> (MatchSummary, Replay) {
        let settings = create_test_settings();
        let loaded = settings.build(create_test_database()).unwrap();
        let mut runner = MatchRunner::new(&settings, loaded, RunOptions::default());
        let summary = runner.run().unwrap();
        (summary, runner.replay().clone())
    }

    #[test]
    fn test_pacing() {
        assert_eq!(ticks_to_run(GameTime(10), GameTime(10)), 1);
        assert_eq!(ticks_to_run(GameTime(10), GameTime(11)), 1);
        assert_eq!(ticks_to_run(GameTime(10), GameTime(12)), 2);
        assert_eq!(ticks_to_run(GameTime(10), GameTime(9)), 1);
        assert_eq!(ticks_to_run(GameTime(10), GameTime(8)), 0);
    }

    #[test]
    fn test_offline_match_runs_to_tick_limit() {
        let (summary, replay) = run_test_match();
        assert_eq!(summary.outcome, MatchOutcome::TickLimit);
        assert_eq!(summary.scene_ticks, 60);
        assert_eq!(summary.game_ticks, 60);
        assert_eq!(replay.duration(), 60);
        assert_eq!(replay.hashes.len(), 6);
        // Two players, one set each per scene tick.
        assert_eq!(replay.commands.len(), 120);
        assert!(replay.commands.iter().any(|c| c.scene_time == GameTime(2) && !c.commands.is_empty()));
    }

    #[test]
    fn test_runs_are_reproducible() {
        let (first, _) = run_test_match();
        let (second, _) = run_test_match();
        assert_eq!(first.final_hash, second.final_hash);
    }

    #[test]
    fn test_tick_limit_override() {
        let settings = create_test_settings();
        let loaded = settings.build(create_test_database()).unwrap();
        let options = RunOptions {
            realtime: false,
            tick_limit: Some(5),
        };
        let summary = MatchRunner::new(&settings, loaded, options).run().unwrap();
        assert_eq!(summary.scene_ticks, 5);
    }
}
