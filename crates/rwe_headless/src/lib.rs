//! Headless match runner for the RWE simulation core.
//!
//! Loads game data and a match file from the per-user data directory, then
//! plays the match through the lockstep loop without graphics. Matches can
//! be networked with other peers over UDP, recorded to replays, and replays
//! verified against their recorded hashes.
//!
//! - **Skirmish**: `rwe <map>` plays `<data>/maps/<map>.ron` to its end
//! - **Multiplayer**: a `network` section in the match file names the peers
//! - **Replay verification**: re-simulate a recording and check every hash
//!
//! # Example
//!
//! ```bash
//! # Play a skirmish and write a JSON summary
//! cargo run -p rwe_headless -- duel --summary duel.json
//!
//! # Check a recording replays identically on four threads
//! cargo run -p rwe_headless -- --verify-replay duel.replay --verify-runs 4
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod data_loader;
pub mod error;
pub mod lockstep;
pub mod logging;
pub mod paths;
pub mod settings;
pub mod summary;
pub mod verify;

use std::path::Path;
use std::sync::Arc;

use rwe_core::data::UnitDatabase;

pub use error::{HeadlessError, Result};
pub use lockstep::{MatchRunner, RunOptions};
pub use settings::{LoadedMatch, MatchSettings};
pub use summary::{MatchOutcome, MatchSummary};
pub use verify::{verify_replay, VerifiedRun};

/// Load the definitions and the match file for `map_name` from `data_dir`.
///
/// # Errors
/// Returns an error if either cannot be read or parsed.
pub fn load_match(data_dir: &Path, map_name: &str) -> Result<(MatchSettings, Arc<UnitDatabase>)> {
    let database = data_loader::load_database(&paths::definitions_directory(data_dir))?;
    let settings = MatchSettings::load(&paths::map_path(data_dir, map_name))?;
    Ok((settings, database))
}
