//! Simulation-wide constants.
//!
//! Everything here feeds the deterministic simulation, so values are fixed
//! for a given build and identical on every peer.

use crate::math::{sim_scalar, SimScalar};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 30;

/// Duration of one tick in milliseconds (rounded down).
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// Path requests serviced per tick.
pub const MAX_PATH_TASKS_PER_TICK: usize = 10;

/// Nodes the pathfinder may expand for one request before giving up with a
/// partial path.
pub const MAX_PATH_EXPANSIONS: usize = 16_384;

/// Ticks between state hashes exchanged by peers.
pub const HASH_INTERVAL_TICKS: u32 = 30;

/// Distance at which a waypoint counts as reached.
pub const WAYPOINT_ARRIVAL_DISTANCE: SimScalar = sim_scalar(8);

/// Age after which a unit still travelling re-requests its path.
pub const PATH_RECOMPUTE_TICKS: u32 = 10 * TICK_RATE;

/// Downward acceleration applied to ballistic projectiles each tick.
pub const GRAVITY: SimScalar = SimScalar::from_bits(6_553);

/// Number of weapon slots per unit.
pub const WEAPON_SLOTS: usize = 3;

