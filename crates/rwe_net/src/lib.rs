//! # RWE Networking
//!
//! Lockstep command exchange between peers over UDP.
//!
//! Every peer runs the same simulation, so the only traffic is each
//! player's command sets and the periodic state hashes. Datagrams are
//! unreliable: each message carries every set the peer has not yet
//! acknowledged, and acknowledgements ride along in the other direction.
//!
//! - [`wire`] - Protobuf messages
//! - [`endpoint`] - per-peer sequence, ack and round-trip state
//! - [`hashes`] - comparison of local and remote state hashes
//! - [`service`] - the in-game network thread
//! - [`loading`] - ready-state exchange before the match starts

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::time::Duration;

use rwe_core::ids::PlayerId;
use serde::{Deserialize, Serialize};

pub mod endpoint;
pub mod error;
pub mod hashes;
pub mod loading;
pub mod service;
pub mod wire;
mod worker;

pub use error::{NetworkError, Result};

/// Default period between unsolicited sends.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Default weight of a new round-trip sample in the moving average.
pub const DEFAULT_RTT_SMOOTHING: f64 = 0.1;

/// A remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Where the peer listens.
    pub address: SocketAddr,
    /// The player the peer controls.
    pub player: PlayerId,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local address to bind.
    pub bind_address: SocketAddr,
    /// Every remote peer.
    pub peers: Vec<PeerConfig>,
    /// Milliseconds between unsolicited sends.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// Weight of a new round-trip sample, in `(0, 1]`.
    #[serde(default = "default_rtt_smoothing")]
    pub rtt_smoothing: f64,
}

fn default_send_interval_ms() -> u64 {
    DEFAULT_SEND_INTERVAL.as_millis() as u64
}

fn default_rtt_smoothing() -> f64 {
    DEFAULT_RTT_SMOOTHING
}

impl NetworkConfig {
    /// Config binding `bind_address` with no peers and default timings.
    #[must_use]
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            peers: Vec::new(),
            send_interval_ms: default_send_interval_ms(),
            rtt_smoothing: DEFAULT_RTT_SMOOTHING,
        }
    }

    /// Add a peer.
    #[must_use]
    pub fn with_peer(mut self, address: SocketAddr, player: PlayerId) -> Self {
        self.peers.push(PeerConfig { address, player });
        self
    }

    /// Period between unsolicited sends.
    #[must_use]
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::new("127.0.0.1:1337".parse().unwrap())
            .with_peer("127.0.0.1:1338".parse().unwrap(), PlayerId(1));
        assert_eq!(config.send_interval(), Duration::from_millis(100));
        assert!((config.rtt_smoothing - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.peers[0].player, PlayerId(1));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = NetworkConfig::new("127.0.0.1:0".parse().unwrap());
        config.send_interval_ms = 0;
        assert_eq!(config.send_interval(), Duration::from_millis(1));
    }
}
