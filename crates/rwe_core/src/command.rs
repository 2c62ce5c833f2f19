//! Player commands and the per-player command queue.
//!
//! Commands are grouped into command sets, one per player per scene tick.
//! The network thread pushes remote sets and the main loop pushes local
//! ones; the main loop pops every player's set for the current scene time
//! before advancing the simulation.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::ids::{PlayerId, SceneTime, UnitId};
use crate::unit::{FireOrders, UnitOrder};

/// Whether an order replaces the queue or joins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueMode {
    /// Clear existing orders first.
    Immediate,
    /// Append to the queue.
    Queued,
}

/// Operation on a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerUnitCommand {
    /// Give an order.
    IssueOrder {
        /// The order.
        order: UnitOrder,
        /// Replace or append.
        mode: IssueMode,
    },
    /// Clear all orders and stop.
    Stop,
    /// Change standing fire orders.
    SetFireOrders(FireOrders),
    /// Switch on or off.
    SetOnOff(bool),
}

/// A command from one player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerCommand {
    /// Pause the match.
    PauseGame,
    /// Resume the match.
    UnpauseGame,
    /// Command a unit.
    UnitCommand {
        /// Target unit.
        unit: UnitId,
        /// What to do.
        command: PlayerUnitCommand,
    },
}

/// Commands one player issued for one scene tick.
pub type CommandSet = Vec<PlayerCommand>;

#[derive(Debug, Default)]
struct PlayerQueue {
    player: PlayerId,
    sets: VecDeque<(SceneTime, CommandSet)>,
    next_scene_time: SceneTime,
}

/// Per-player queues of command sets, shared between the network thread
/// and the main loop.
#[derive(Debug, Default)]
pub struct PlayerCommandService {
    queues: Mutex<Vec<PlayerQueue>>,
}

impl PlayerCommandService {
    /// Service with a queue for each listed player.
    #[must_use]
    pub fn new(players: &[PlayerId]) -> Self {
        let queues = players
            .iter()
            .map(|&player| PlayerQueue {
                player,
                ..PlayerQueue::default()
            })
            .collect();
        Self {
            queues: Mutex::new(queues),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PlayerQueue>> {
        // A panic on another thread cannot leave the queues half-updated.
        self.queues.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a player after construction. Does nothing if already known.
    pub fn register_player(&self, player: PlayerId) {
        let mut queues = self.lock();
        if !queues.iter().any(|q| q.player == player) {
            queues.push(PlayerQueue {
                player,
                ..PlayerQueue::default()
            });
        }
    }

    /// Append the next command set for `player`. Sets are numbered by
    /// arrival: the first set pushed is for scene time 0.
    pub fn push_commands(&self, player: PlayerId, commands: CommandSet) {
        let mut queues = self.lock();
        let Some(queue) = queues.iter_mut().find(|q| q.player == player) else {
            tracing::warn!(%player, "command set for unknown player dropped");
            return;
        };
        let time = queue.next_scene_time;
        queue.sets.push_back((time, commands));
        queue.next_scene_time = time.next();
    }

    /// True if every player has a set queued for `time`.
    #[must_use]
    pub fn check_all_players_ready(&self, time: SceneTime) -> bool {
        self.lock()
            .iter()
            .all(|q| q.sets.front().is_some_and(|(t, _)| *t <= time))
    }

    /// Pop each player's set for `time`, or `None` for every player if any
    /// player has not delivered yet.
    pub fn pop_commands(&self, time: SceneTime) -> Option<Vec<(PlayerId, CommandSet)>> {
        let mut queues = self.lock();
        if !queues.iter().all(|q| q.sets.front().is_some_and(|(t, _)| *t <= time)) {
            return None;
        }
        let mut result = Vec::with_capacity(queues.len());
        for queue in queues.iter_mut() {
            if let Some((_, set)) = queue.sets.pop_front() {
                result.push((queue.player, set));
            }
        }
        result.sort_by_key(|(player, _)| *player);
        Some(result)
    }

    /// Number of sets queued for `player`.
    #[must_use]
    pub fn buffered_count(&self, player: PlayerId) -> usize {
        self.lock()
            .iter()
            .find(|q| q.player == player)
            .map_or(0, |q| q.sets.len())
    }

    /// Scene time the next pushed set for `player` will carry.
    #[must_use]
    pub fn next_scene_time(&self, player: PlayerId) -> Option<SceneTime> {
        self.lock()
            .iter()
            .find(|q| q.player == player)
            .map(|q| q.next_scene_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SimVector;

    fn move_command() -> PlayerCommand {
        PlayerCommand::UnitCommand {
            unit: UnitId::from_raw(0),
            command: PlayerUnitCommand::IssueOrder {
                order: UnitOrder::Move(SimVector::from_ints(10, 0, 0)),
                mode: IssueMode::Immediate,
            },
        }
    }

    #[test]
    fn test_pop_waits_for_every_player() {
        let service = PlayerCommandService::new(&[PlayerId(0), PlayerId(1)]);
        service.push_commands(PlayerId(0), vec![move_command()]);
        assert!(!service.check_all_players_ready(SceneTime::default()));
        assert!(service.pop_commands(SceneTime::default()).is_none());

        service.push_commands(PlayerId(1), vec![]);
        let sets = service.pop_commands(SceneTime::default()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0], (PlayerId(0), vec![move_command()]));
        assert_eq!(service.buffered_count(PlayerId(0)), 0);
    }

    #[test]
    fn test_sets_are_numbered_by_arrival() {
        let service = PlayerCommandService::new(&[PlayerId(0)]);
        service.push_commands(PlayerId(0), vec![]);
        service.push_commands(PlayerId(0), vec![PlayerCommand::PauseGame]);
        assert_eq!(service.next_scene_time(PlayerId(0)), Some(crate::ids::GameTime(2)));
        assert!(service.pop_commands(crate::ids::GameTime(0)).is_some());
        let second = service.pop_commands(crate::ids::GameTime(1)).unwrap();
        assert_eq!(second[0].1, vec![PlayerCommand::PauseGame]);
    }

    #[test]
    fn test_unknown_player_is_ignored() {
        let service = PlayerCommandService::new(&[PlayerId(0)]);
        service.push_commands(PlayerId(7), vec![PlayerCommand::PauseGame]);
        assert_eq!(service.buffered_count(PlayerId(7)), 0);
        service.register_player(PlayerId(7));
        service.push_commands(PlayerId(7), vec![]);
        assert_eq!(service.buffered_count(PlayerId(7)), 1);
    }
}
