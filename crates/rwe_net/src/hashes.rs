//! Desync detection.
//!
//! Every peer hashes its simulation at the same game times, so the n-th
//! hash from any peer must equal our n-th hash. The main loop records
//! local checkpoints, the network thread records what peers sent, and
//! [`HashLedger::check`] compares whatever both sides have produced.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rwe_core::error::GameError;
use rwe_core::hash::GameHash;
use rwe_core::ids::{GameTime, PlayerId};
use tracing::error;

#[derive(Debug, Default)]
struct Ledger {
    local: VecDeque<(GameTime, GameHash)>,
    remote: BTreeMap<PlayerId, VecDeque<GameHash>>,
    verified: usize,
}

/// Local and remote hash checkpoints awaiting comparison.
#[derive(Debug, Default)]
pub struct HashLedger {
    inner: Mutex<Ledger>,
}

impl HashLedger {
    /// Ledger comparing against each of `peers`.
    #[must_use]
    pub fn new(peers: &[PlayerId]) -> Self {
        let remote = peers.iter().map(|&p| (p, VecDeque::new())).collect();
        Self {
            inner: Mutex::new(Ledger {
                remote,
                ..Ledger::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a local checkpoint.
    pub fn record_local(&self, time: GameTime, hash: GameHash) {
        self.lock().local.push_back((time, hash));
    }

    /// Record hashes received from `player`, in stream order.
    pub fn record_remote(&self, player: PlayerId, hashes: impl IntoIterator<Item = GameHash>) {
        let mut ledger = self.lock();
        if let Some(queue) = ledger.remote.get_mut(&player) {
            queue.extend(hashes);
        }
    }

    /// Compare every checkpoint all peers have reported.
    ///
    /// Returns the total number of checkpoints verified so far.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] at the first mismatch. The
    /// mismatching checkpoint stays in the ledger.
    pub fn check(&self) -> Result<usize, GameError> {
        let mut ledger = self.lock();
        loop {
            let Some(&(time, local)) = ledger.local.front() else {
                break;
            };
            if ledger.remote.values().any(VecDeque::is_empty) {
                break;
            }
            for (player, queue) in &ledger.remote {
                let remote = queue[0];
                if remote != local {
                    error!(tick = time.0, %player, local = %local, remote = %remote, "desync");
                    return Err(GameError::DesyncDetected {
                        tick: time.0,
                        local_hash: local.0,
                        remote_hash: remote.0,
                    });
                }
            }
            ledger.local.pop_front();
            for queue in ledger.remote.values_mut() {
                queue.pop_front();
            }
            ledger.verified += 1;
        }
        Ok(ledger.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_hashes_verify() {
        let ledger = HashLedger::new(&[PlayerId(1), PlayerId(2)]);
        ledger.record_local(GameTime(30), GameHash(7));
        ledger.record_remote(PlayerId(1), [GameHash(7)]);
        assert_eq!(ledger.check().unwrap(), 0);
        ledger.record_remote(PlayerId(2), [GameHash(7), GameHash(8)]);
        assert_eq!(ledger.check().unwrap(), 1);
    }

    #[test]
    fn test_mismatch_is_desync() {
        let ledger = HashLedger::new(&[PlayerId(1)]);
        ledger.record_local(GameTime(30), GameHash(7));
        ledger.record_local(GameTime(60), GameHash(9));
        ledger.record_remote(PlayerId(1), [GameHash(7), GameHash(10)]);
        match ledger.check() {
            Err(GameError::DesyncDetected {
                tick,
                local_hash,
                remote_hash,
            }) => {
                assert_eq!((tick, local_hash, remote_hash), (60, 9, 10));
            }
            other => panic!("expected desync, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_peer_ignored() {
        let ledger = HashLedger::new(&[]);
        ledger.record_remote(PlayerId(4), [GameHash(1)]);
        ledger.record_local(GameTime(30), GameHash(2));
        assert_eq!(ledger.check().unwrap(), 1);
    }
}
