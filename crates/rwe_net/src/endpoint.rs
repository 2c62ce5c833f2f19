//! Per-peer lockstep state.
//!
//! Each endpoint tracks two independent streams in each direction: command
//! sets and state hashes. Outbound items stay buffered until the peer's
//! ack covers them and are resent in every datagram until then. Inbound
//! items are accepted in order; duplicates from retransmission are skipped
//! by offset.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rwe_core::command::{CommandSet, PlayerCommandService};
use rwe_core::constants::TICK_RATE;
use rwe_core::hash::GameHash;
use rwe_core::ids::{GameTime, PlayerId, SceneTime};
use tracing::{debug, error, trace};

use crate::error::Result;
use crate::wire::{GameUpdate, PlayerCommandSet};

/// A peer's scene time as of some local instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTimeSample {
    /// What the peer reported.
    pub scene_time: SceneTime,
    /// When we received it.
    pub received_at: Instant,
}

/// Lockstep state for one remote peer.
#[derive(Debug)]
pub struct EndpointState {
    /// The player the peer controls.
    pub player: PlayerId,
    /// Where the peer listens.
    pub address: SocketAddr,
    /// Number of the first set in `send_buffer`.
    pub next_command_to_send: u32,
    /// Number of the next set we expect from the peer.
    pub next_command_to_receive: u32,
    /// Our sets the peer has not acknowledged.
    pub send_buffer: VecDeque<CommandSet>,
    /// Number of the first hash in `hash_send_buffer`.
    pub next_hash_to_send: u32,
    /// Number of the next hash we expect from the peer.
    pub next_hash_to_receive: u32,
    /// Our hashes the peer has not acknowledged.
    pub hash_send_buffer: VecDeque<GameHash>,
    /// When each command sequence end was first sent.
    pub send_times: VecDeque<(u32, Instant)>,
    /// Latest scene time the peer reported.
    pub last_known_scene_time: Option<SceneTimeSample>,
    /// Smoothed round-trip time, once there is a sample.
    pub average_round_trip_time: Option<Duration>,
    rtt_smoothing: f64,
}

/// What a received update delivered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceivedUpdate {
    /// Command sets newly pushed to the command service.
    pub command_sets: usize,
    /// Hashes newly received, in stream order.
    pub hashes: Vec<GameHash>,
    /// A round-trip sample, if the ack matched a recorded send.
    pub round_trip: Option<Duration>,
}

impl EndpointState {
    /// Fresh state for a peer.
    #[must_use]
    pub fn new(player: PlayerId, address: SocketAddr, rtt_smoothing: f64) -> Self {
        Self {
            player,
            address,
            next_command_to_send: 0,
            next_command_to_receive: 0,
            send_buffer: VecDeque::new(),
            next_hash_to_send: 0,
            next_hash_to_receive: 0,
            hash_send_buffer: VecDeque::new(),
            send_times: VecDeque::new(),
            last_known_scene_time: None,
            average_round_trip_time: None,
            rtt_smoothing: rtt_smoothing.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Queue a local command set for delivery.
    pub fn queue_commands(&mut self, commands: CommandSet) {
        self.send_buffer.push_back(commands);
    }

    /// Queue a local state hash for delivery.
    pub fn queue_hash(&mut self, hash: GameHash) {
        self.hash_send_buffer.push_back(hash);
    }

    /// Number one past the last set in `send_buffer`.
    #[must_use]
    pub fn command_sequence_end(&self) -> u32 {
        self.next_command_to_send + self.send_buffer.len() as u32
    }

    /// Build the next datagram for this peer.
    ///
    /// The first time a sequence end goes out its send time is recorded
    /// so the ack that covers it yields a round-trip sample.
    pub fn build_update(&mut self, current_scene_time: SceneTime, now: Instant) -> GameUpdate {
        let end = self.command_sequence_end();
        if !self.send_buffer.is_empty() && self.send_times.back().map_or(true, |(seq, _)| *seq < end) {
            self.send_times.push_back((end, now));
        }

        GameUpdate {
            next_command_set_to_send: self.next_command_to_send,
            next_command_set_to_receive: self.next_command_to_receive,
            command_sets: self
                .send_buffer
                .iter()
                .map(|set| PlayerCommandSet::from(set.as_slice()))
                .collect(),
            hashes: self.hash_send_buffer.iter().map(|h| h.0).collect(),
            next_hash_to_send: self.next_hash_to_send,
            next_hash_to_receive: self.next_hash_to_receive,
            current_scene_time: current_scene_time.0,
        }
    }

    /// Apply a datagram from this peer.
    ///
    /// Acked sets and hashes leave the send buffers. New command sets are
    /// pushed to `commands` under this peer's player id; new hashes are
    /// returned for comparison.
    ///
    /// # Errors
    /// Returns [`crate::NetworkError::MalformedCommand`] if a new command
    /// set cannot be decoded. Nothing from the update is applied then.
    pub fn receive_update(
        &mut self,
        update: GameUpdate,
        commands: &PlayerCommandService,
        now: Instant,
    ) -> Result<ReceivedUpdate> {
        let new_sets = if update.next_command_set_to_send <= self.next_command_to_receive {
            let skip = (self.next_command_to_receive - update.next_command_set_to_send) as usize;
            update
                .command_sets
                .into_iter()
                .skip(skip)
                .map(PlayerCommandSet::into_commands)
                .collect::<Result<Vec<_>>>()?
        } else {
            error!(
                player = %self.player,
                endpoint = %self.address,
                first = update.next_command_set_to_send,
                expected = self.next_command_to_receive,
                "peer skipped command sets"
            );
            Vec::new()
        };

        let round_trip = self.acknowledge_commands(update.next_command_set_to_receive, now);
        self.acknowledge_hashes(update.next_hash_to_receive);

        let received = ReceivedUpdate {
            command_sets: new_sets.len(),
            hashes: self.accept_hashes(update.next_hash_to_send, &update.hashes),
            round_trip,
        };
        for set in new_sets {
            commands.push_commands(self.player, set);
            self.next_command_to_receive += 1;
        }

        let reported = GameTime(update.current_scene_time);
        if self.last_known_scene_time.map_or(true, |s| s.scene_time <= reported) {
            self.last_known_scene_time = Some(SceneTimeSample {
                scene_time: reported,
                received_at: now,
            });
        }

        trace!(
            player = %self.player,
            sets = received.command_sets,
            hashes = received.hashes.len(),
            "update received"
        );
        Ok(received)
    }

    fn acknowledge_commands(&mut self, ack: u32, now: Instant) -> Option<Duration> {
        let ack = ack.min(self.command_sequence_end());
        while self.next_command_to_send < ack {
            self.send_buffer.pop_front();
            self.next_command_to_send += 1;
        }

        let mut sample = None;
        while let Some(&(seq, sent_at)) = self.send_times.front() {
            if seq > ack {
                break;
            }
            self.send_times.pop_front();
            if seq == ack {
                sample = Some(now.saturating_duration_since(sent_at));
            }
        }
        if let Some(rtt) = sample {
            self.record_round_trip(rtt);
        }
        sample
    }

    fn acknowledge_hashes(&mut self, ack: u32) {
        let end = self.next_hash_to_send + self.hash_send_buffer.len() as u32;
        let ack = ack.min(end);
        while self.next_hash_to_send < ack {
            self.hash_send_buffer.pop_front();
            self.next_hash_to_send += 1;
        }
    }

    fn accept_hashes(&mut self, first: u32, hashes: &[u32]) -> Vec<GameHash> {
        if first > self.next_hash_to_receive {
            error!(
                player = %self.player,
                first,
                expected = self.next_hash_to_receive,
                "peer skipped hashes"
            );
            return Vec::new();
        }
        let skip = (self.next_hash_to_receive - first) as usize;
        let fresh: Vec<GameHash> = hashes.iter().skip(skip).copied().map(GameHash).collect();
        self.next_hash_to_receive += fresh.len() as u32;
        fresh
    }

    fn record_round_trip(&mut self, sample: Duration) {
        let average = match self.average_round_trip_time {
            None => sample,
            Some(previous) => previous.mul_f64(1.0 - self.rtt_smoothing) + sample.mul_f64(self.rtt_smoothing),
        };
        debug!(player = %self.player, sample_ms = sample.as_millis() as u64, average_ms = average.as_millis() as u64, "rtt");
        self.average_round_trip_time = Some(average);
    }

    /// Where the peer's scene time should be now: the last report plus the
    /// time since it arrived plus half a round trip.
    #[must_use]
    pub fn estimate_scene_time(&self, now: Instant) -> Option<SceneTime> {
        let sample = self.last_known_scene_time?;
        let in_flight = self.average_round_trip_time.unwrap_or_default() / 2;
        let elapsed = now.saturating_duration_since(sample.received_at) + in_flight;
        Some(GameTime(sample.scene_time.0 + duration_to_ticks(elapsed)))
    }
}

/// Whole scene ticks in `duration`.
#[must_use]
pub fn duration_to_ticks(duration: Duration) -> u32 {
    (duration.as_millis() * u128::from(TICK_RATE) / 1000) as u32
}

/// Average of the local scene time and every peer's estimate. Peers that
/// have not reported yet are left out.
#[must_use]
pub fn estimate_average_scene_time<'a>(
    local: SceneTime,
    endpoints: impl IntoIterator<Item = &'a EndpointState>,
    now: Instant,
) -> SceneTime {
    let mut total = u64::from(local.0);
    let mut count = 1u64;
    for estimate in endpoints.into_iter().filter_map(|e| e.estimate_scene_time(now)) {
        total += u64::from(estimate.0);
        count += 1;
    }
    GameTime((total / count) as u32)
}
