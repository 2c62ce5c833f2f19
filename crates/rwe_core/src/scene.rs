//! The lockstep game scene.
//!
//! A scene owns the simulation and steps it one scene tick at a time. A
//! tick can only run once every player's command set for the current scene
//! time has arrived; the scene then applies the sets in player order and,
//! unless paused, advances the simulation. Every `hash_interval` game ticks
//! the state hash is computed and reported so peers can compare.

use std::sync::Arc;

use tracing::{debug, info};

use crate::command::{CommandSet, PlayerCommand, PlayerCommandService};
use crate::constants::HASH_INTERVAL_TICKS;
use crate::hash::GameHash;
use crate::ids::{GameTime, PlayerId, SceneTime};
use crate::pathfinding::PathFindingService;
use crate::simulation::{GameSimulation, WinStatus};

/// What happened during one scene tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneTick {
    /// Scene time the commands were applied at.
    pub scene_time: SceneTime,
    /// Command sets applied, in player order.
    pub commands: Vec<(PlayerId, CommandSet)>,
    /// State hash, on hash ticks.
    pub hash: Option<(GameTime, GameHash)>,
}

/// A running match.
#[derive(Debug)]
pub struct GameScene {
    simulation: GameSimulation,
    pathfinder: PathFindingService,
    commands: Arc<PlayerCommandService>,
    scene_time: SceneTime,
    paused: bool,
    hash_interval: u32,
}

impl GameScene {
    /// Scene over `simulation`, reading commands from `commands`.
    #[must_use]
    pub fn new(simulation: GameSimulation, commands: Arc<PlayerCommandService>) -> Self {
        Self {
            simulation,
            pathfinder: PathFindingService::new(),
            commands,
            scene_time: SceneTime::default(),
            paused: false,
            hash_interval: HASH_INTERVAL_TICKS,
        }
    }

    /// Use a different hash interval. Zero disables hashing.
    #[must_use]
    pub fn with_hash_interval(mut self, ticks: u32) -> Self {
        self.hash_interval = ticks;
        self
    }

    /// The simulation.
    #[must_use]
    pub fn simulation(&self) -> &GameSimulation {
        &self.simulation
    }

    /// The simulation, mutably. For setup before the first tick.
    pub fn simulation_mut(&mut self) -> &mut GameSimulation {
        &mut self.simulation
    }

    /// Shared command queues.
    #[must_use]
    pub fn command_service(&self) -> &Arc<PlayerCommandService> {
        &self.commands
    }

    /// Next scene time to run.
    #[must_use]
    pub fn scene_time(&self) -> SceneTime {
        self.scene_time
    }

    /// True while a player has paused the match.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Match outcome so far.
    #[must_use]
    pub fn win_status(&self) -> WinStatus {
        self.simulation.compute_win_status()
    }

    /// Run one scene tick if every player's commands are in, else `None`.
    pub fn try_tick(&mut self) -> Option<SceneTick> {
        let sets = self.commands.pop_commands(self.scene_time)?;
        let scene_time = self.scene_time;
        for (player, set) in &sets {
            self.apply_commands(*player, set);
        }
        self.scene_time = scene_time.next();

        let mut hash = None;
        if !self.paused {
            self.simulation.tick(&mut self.pathfinder);
            let now = self.simulation.game_time;
            if self.hash_interval > 0 && now.0 % self.hash_interval == 0 {
                let value = self.simulation.compute_hash();
                debug!(tick = now.0, hash = %value, "hash checkpoint");
                hash = Some((now, value));
            }
        }

        Some(SceneTick {
            scene_time,
            commands: sets,
            hash,
        })
    }

    fn apply_commands(&mut self, player: PlayerId, commands: &[PlayerCommand]) {
        for command in commands {
            match command {
                PlayerCommand::PauseGame => {
                    if !self.paused {
                        info!(%player, "game paused");
                    }
                    self.paused = true;
                }
                PlayerCommand::UnpauseGame => {
                    if self.paused {
                        info!(%player, "game resumed");
                    }
                    self.paused = false;
                }
                PlayerCommand::UnitCommand { unit, command } => {
                    self.simulation.issue_unit_command(player, *unit, command);
                }
            }
        }
    }
}
