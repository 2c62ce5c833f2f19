//! Pre-game ready exchange.
//!
//! While the match loads, every peer announces its loading state to every
//! other peer each send interval. The match starts once every endpoint has
//! reported ready.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use prost::Message;
use rwe_core::ids::PlayerId;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::wire::{network_message::Payload, LoadingState, NetworkMessage};
use crate::worker::{is_transient, Worker, MAX_DATAGRAM_SIZE};
use crate::NetworkConfig;

/// What we know about one peer's loading progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStatus {
    /// The peer's player.
    pub player: PlayerId,
    /// The peer's address.
    pub address: SocketAddr,
    /// Last state the peer reported.
    pub state: LoadingState,
}

#[derive(Debug)]
struct Shared {
    statuses: Mutex<Vec<EndpointStatus>>,
    ready: AtomicBool,
}

impl Shared {
    fn statuses(&self) -> MutexGuard<'_, Vec<EndpointStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background ready-state exchange.
#[derive(Debug)]
pub struct LoadingNetworkService {
    shared: Arc<Shared>,
    worker: Worker,
}

impl LoadingNetworkService {
    /// Bind `config.bind_address` and start announcing.
    ///
    /// # Errors
    /// Returns [`crate::NetworkError::Io`] if the socket cannot be bound.
    pub fn start(config: &NetworkConfig) -> Result<Self> {
        let socket = StdUdpSocket::bind(config.bind_address)?;
        Self::with_socket(socket, config)
    }

    /// Start over an already bound socket.
    ///
    /// # Errors
    /// Returns [`crate::NetworkError::Io`] if the thread cannot start.
    pub fn with_socket(socket: StdUdpSocket, config: &NetworkConfig) -> Result<Self> {
        let statuses = config
            .peers
            .iter()
            .map(|peer| EndpointStatus {
                player: peer.player,
                address: peer.address,
                state: LoadingState::Loading,
            })
            .collect();
        let shared = Arc::new(Shared {
            statuses: Mutex::new(statuses),
            ready: AtomicBool::new(false),
        });
        let loop_shared = Arc::clone(&shared);
        let send_interval = config.send_interval();
        let worker = Worker::spawn("rwe-loading-network", socket, move |socket, stop| {
            run(socket, loop_shared, stop, send_interval)
        })?;
        Ok(Self { shared, worker })
    }

    /// Announce that this peer has finished loading.
    pub fn set_ready(&self) {
        if !self.shared.ready.swap(true, Ordering::Relaxed) {
            info!("local loading complete");
        }
    }

    /// Every peer's last reported state.
    #[must_use]
    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.shared.statuses().clone()
    }

    /// True once every peer has reported ready.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.shared.statuses().iter().all(|s| s.state == LoadingState::Ready)
    }

    /// Stop announcing. The socket is closed once the thread exits.
    pub fn stop(mut self) {
        self.worker.stop();
    }
}

async fn run(socket: UdpSocket, shared: Arc<Shared>, mut stop: oneshot::Receiver<()>, send_interval: Duration) {
    let mut ticker = interval(send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let state = if shared.ready.load(Ordering::Relaxed) { LoadingState::Ready } else { LoadingState::Loading };
                let bytes = NetworkMessage::loading_status(state).encode_to_vec();
                let addresses: Vec<SocketAddr> = shared.statuses().iter().map(|s| s.address).collect();
                for address in addresses {
                    if let Err(e) = socket.send_to(&bytes, address).await {
                        debug!(endpoint = %address, error = %e, "loading status send failed");
                    }
                }
            }
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) => handle_datagram(&shared, from, &buffer[..len]),
                Err(e) if is_transient(&e) => debug!(error = %e, "transient receive error"),
                Err(e) => {
                    error!(error = %e, "socket failed, loading thread exiting");
                    break;
                }
            },
        }
    }
}

fn handle_datagram(shared: &Shared, from: SocketAddr, bytes: &[u8]) {
    // A peer already exchanging game updates has finished loading.
    let state = match NetworkMessage::from_datagram(bytes) {
        Ok(NetworkMessage {
            payload: Some(Payload::LoadingStatus(status)),
        }) => status.state(),
        Ok(NetworkMessage {
            payload: Some(Payload::GameUpdate(_)),
        }) => LoadingState::Ready,
        _ => {
            debug!(endpoint = %from, "dropping datagram during loading");
            return;
        }
    };
    let mut statuses = shared.statuses();
    let Some(endpoint) = statuses.iter_mut().find(|s| s.address == from) else {
        debug!(endpoint = %from, "loading status from unknown address");
        return;
    };
    if endpoint.state != state {
        info!(player = %endpoint.player, ?state, "peer loading state changed");
        endpoint.state = state;
    }
}
