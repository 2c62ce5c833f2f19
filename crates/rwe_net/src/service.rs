//! In-game network service.
//!
//! Owns a UDP socket on a background thread. The main loop submits its
//! command set for each scene tick and its hash checkpoints; the thread
//! sends every peer everything it has not acknowledged, on submission and
//! every send interval, and feeds what peers send into the shared
//! [`PlayerCommandService`] and [`HashLedger`].

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use prost::Message;
use rwe_core::command::{CommandSet, PlayerCommandService};
use rwe_core::hash::GameHash;
use rwe_core::ids::{PlayerId, SceneTime};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::endpoint::{estimate_average_scene_time, EndpointState};
use crate::error::{NetworkError, Result};
use crate::hashes::HashLedger;
use crate::wire::{network_message::Payload, NetworkMessage};
use crate::worker::{is_transient, Worker, MAX_DATAGRAM_SIZE};
use crate::NetworkConfig;

/// Work posted from the main loop to the network thread.
#[derive(Debug)]
enum Outbound {
    Commands(SceneTime, CommandSet),
    Hash(SceneTime, GameHash),
}

/// Snapshot of one peer for display and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// The peer's player.
    pub player: PlayerId,
    /// The peer's address.
    pub address: SocketAddr,
    /// Our sets awaiting acknowledgement.
    pub unacknowledged: usize,
    /// Sets received from the peer.
    pub received: u32,
    /// Smoothed round-trip time.
    pub average_round_trip_time: Option<Duration>,
}

#[derive(Debug)]
struct Shared {
    endpoints: Mutex<Vec<EndpointState>>,
    commands: Arc<PlayerCommandService>,
    hashes: Arc<HashLedger>,
}

impl Shared {
    fn endpoints(&self) -> MutexGuard<'_, Vec<EndpointState>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The in-game network thread and its shared state.
#[derive(Debug)]
pub struct GameNetworkService {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    local_address: SocketAddr,
    worker: Worker,
}

impl GameNetworkService {
    /// Bind `config.bind_address` and start exchanging with every peer.
    ///
    /// # Errors
    /// Returns [`NetworkError::Io`] if the socket cannot be bound or the
    /// thread cannot start.
    pub fn start(
        config: &NetworkConfig,
        commands: Arc<PlayerCommandService>,
        hashes: Arc<HashLedger>,
    ) -> Result<Self> {
        let socket = StdUdpSocket::bind(config.bind_address)?;
        Self::with_socket(socket, config, commands, hashes)
    }

    /// Start over an already bound socket. `config.bind_address` is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`NetworkError::Io`] if the thread cannot start.
    pub fn with_socket(
        socket: StdUdpSocket,
        config: &NetworkConfig,
        commands: Arc<PlayerCommandService>,
        hashes: Arc<HashLedger>,
    ) -> Result<Self> {
        let local_address = socket.local_addr()?;
        let endpoints = config
            .peers
            .iter()
            .map(|peer| {
                commands.register_player(peer.player);
                EndpointState::new(peer.player, peer.address, config.rtt_smoothing)
            })
            .collect();
        let shared = Arc::new(Shared {
            endpoints: Mutex::new(endpoints),
            commands,
            hashes,
        });
        let (outbound, queue) = mpsc::unbounded_channel();
        let send_interval = config.send_interval();

        let loop_shared = Arc::clone(&shared);
        let worker = Worker::spawn("rwe-game-network", socket, move |socket, stop| {
            run(socket, loop_shared, queue, stop, send_interval)
        })?;
        info!(address = %local_address, peers = config.peers.len(), "game network started");

        Ok(Self {
            shared,
            outbound,
            local_address,
            worker,
        })
    }

    /// The bound address.
    #[must_use]
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Send the local command set for `scene_time` to every peer.
    ///
    /// # Errors
    /// Returns [`NetworkError::Disconnected`] if the thread has stopped.
    pub fn submit_commands(&self, scene_time: SceneTime, commands: CommandSet) -> Result<()> {
        self.outbound
            .send(Outbound::Commands(scene_time, commands))
            .map_err(|_| NetworkError::Disconnected)
    }

    /// Send a local hash checkpoint to every peer.
    ///
    /// # Errors
    /// Returns [`NetworkError::Disconnected`] if the thread has stopped.
    pub fn submit_hash(&self, scene_time: SceneTime, hash: GameHash) -> Result<()> {
        self.outbound
            .send(Outbound::Hash(scene_time, hash))
            .map_err(|_| NetworkError::Disconnected)
    }

    /// Average of `local` and every peer's estimated scene time.
    #[must_use]
    pub fn estimate_average_scene_time(&self, local: SceneTime) -> SceneTime {
        let endpoints = self.shared.endpoints();
        estimate_average_scene_time(local, endpoints.iter(), Instant::now())
    }

    /// Snapshot of every peer.
    #[must_use]
    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.shared
            .endpoints()
            .iter()
            .map(|e| EndpointInfo {
                player: e.player,
                address: e.address,
                unacknowledged: e.send_buffer.len(),
                received: e.next_command_to_receive,
                average_round_trip_time: e.average_round_trip_time,
            })
            .collect()
    }

    /// True while the network thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop the thread. Unsent data is dropped.
    pub fn stop(mut self) {
        self.worker.stop();
    }
}

async fn run(
    socket: UdpSocket,
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    mut stop: oneshot::Receiver<()>,
    send_interval: Duration,
) {
    let mut ticker = interval(send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut scene_time = SceneTime::default();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => send_updates(&socket, &shared, scene_time).await,
            posted = queue.recv() => {
                let Some(posted) = posted else { break };
                scene_time = enqueue(&shared, posted);
                send_updates(&socket, &shared, scene_time).await;
            }
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) => handle_datagram(&shared, from, &buffer[..len]),
                Err(e) if is_transient(&e) => debug!(error = %e, "transient receive error"),
                Err(e) => {
                    error!(error = %e, "socket failed, network thread exiting");
                    break;
                }
            },
        }
    }
}

fn enqueue(shared: &Shared, posted: Outbound) -> SceneTime {
    let mut endpoints = shared.endpoints();
    match posted {
        Outbound::Commands(time, set) => {
            for endpoint in endpoints.iter_mut() {
                endpoint.queue_commands(set.clone());
            }
            time
        }
        Outbound::Hash(time, hash) => {
            for endpoint in endpoints.iter_mut() {
                endpoint.queue_hash(hash);
            }
            time
        }
    }
}

async fn send_updates(socket: &UdpSocket, shared: &Shared, scene_time: SceneTime) {
    let now = Instant::now();
    let datagrams: Vec<(SocketAddr, Vec<u8>)> = shared
        .endpoints()
        .iter_mut()
        .map(|e| {
            let message = NetworkMessage::game_update(e.build_update(scene_time, now));
            (e.address, message.encode_to_vec())
        })
        .collect();

    for (address, bytes) in datagrams {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            warn!(endpoint = %address, size = bytes.len(), "update too large for one datagram");
            continue;
        }
        if let Err(e) = socket.send_to(&bytes, address).await {
            warn!(endpoint = %address, error = %e, "send failed");
        }
    }
}

fn handle_datagram(shared: &Shared, from: SocketAddr, bytes: &[u8]) {
    let message = match NetworkMessage::from_datagram(bytes) {
        Ok(message) => message,
        Err(e) => {
            debug!(endpoint = %from, error = %e, "dropping undecodable datagram");
            return;
        }
    };
    let Some(Payload::GameUpdate(update)) = message.payload else {
        debug!(endpoint = %from, "dropping non-game message");
        return;
    };

    let mut endpoints = shared.endpoints();
    let Some(endpoint) = endpoints.iter_mut().find(|e| e.address == from) else {
        debug!(endpoint = %from, "dropping datagram from unknown address");
        return;
    };
    match endpoint.receive_update(update, &shared.commands, Instant::now()) {
        Ok(received) => {
            if !received.hashes.is_empty() {
                shared.hashes.record_remote(endpoint.player, received.hashes);
            }
        }
        Err(e) => debug!(endpoint = %from, error = %e, "dropping malformed update"),
    }
}
