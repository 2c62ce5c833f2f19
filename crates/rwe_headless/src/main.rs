//! Headless RWE match runner.
//!
//! # Usage
//!
//! ```bash
//! # Play <data>/maps/duel.ron, recording to <data>/replays/duel.replay
//! cargo run -p rwe_headless -- duel
//!
//! # Pace to wall-clock time and write a summary
//! cargo run -p rwe_headless -- duel --realtime --summary results/duel.json
//!
//! # Verify a recording, replaying it on several threads
//! cargo run -p rwe_headless -- --verify-replay duel.replay --verify-runs 4
//! ```
//!
//! Logs go to stderr and to `rwe.log` in the data directory. The process
//! exits with code 1 on any error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rwe_core::replay::Replay;
use tracing::{error, info};

use rwe_headless::{
    load_match, logging, paths, verify_replay, HeadlessError, MatchOutcome, MatchRunner, RunOptions,
};

#[derive(Parser)]
#[command(name = "rwe")]
#[command(about = "Headless lockstep match runner")]
#[command(version)]
struct Cli {
    /// Map to play, loaded from <data>/maps/<MAP_NAME>.ron
    #[arg(required_unless_present = "verify_replay")]
    map_name: Option<String>,

    /// Data directory (default: %APPDATA%/RWE or $HOME/.rwe)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Verify a recorded replay instead of playing
    #[arg(long, value_name = "FILE")]
    verify_replay: Option<PathBuf>,

    /// Number of parallel verification runs
    #[arg(long, default_value = "1")]
    verify_runs: usize,

    /// Write a JSON match summary
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Replay output path (default: <data>/replays/<MAP_NAME>.replay)
    #[arg(long, value_name = "FILE")]
    record: Option<PathBuf>,

    /// Pace ticks to wall-clock time
    #[arg(long)]
    realtime: bool,

    /// Stop after this many scene ticks
    #[arg(long)]
    tick_limit: Option<u32>,

    /// Enable debug logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<(), HeadlessError> {
    let data_dir = paths::data_directory(cli.data_dir.as_deref())?;
    logging::init(cli.verbose, Some(&data_dir.join(paths::LOG_FILE_NAME)))?;
    info!(data_dir = %data_dir.display(), "starting");

    if let Some(replay_path) = &cli.verify_replay {
        let replay = Replay::load(replay_path)?;
        let map_name = cli.map_name.clone().unwrap_or_else(|| replay.match_name.clone());
        let (settings, database) = load_match(&data_dir, &map_name)?;
        let result = verify_replay(&settings, &database, &replay, cli.verify_runs)?;
        println!(
            "replay ok: {} ticks, {} checkpoints, final hash {:08x}",
            result.scene_ticks, result.checkpoints, result.final_hash
        );
        return Ok(());
    }

    let map_name = cli
        .map_name
        .as_deref()
        .ok_or_else(|| HeadlessError::InvalidSettings("no map name given".into()))?;
    let (settings, database) = load_match(&data_dir, map_name)?;
    let loaded = settings.build(database)?;
    let options = RunOptions {
        realtime: cli.realtime,
        tick_limit: cli.tick_limit,
    };
    let mut runner = MatchRunner::new(&settings, loaded, options);
    if let Some(network) = &settings.network {
        runner.connect(network)?;
    }
    let summary = runner.run()?;

    let record_path = match &cli.record {
        Some(path) => path.clone(),
        None => {
            let dir = paths::replay_directory(&data_dir);
            std::fs::create_dir_all(&dir).map_err(|e| HeadlessError::io(&dir, e))?;
            dir.join(format!("{map_name}.replay"))
        }
    };
    runner.replay().save(&record_path)?;
    info!(path = %record_path.display(), "replay saved");

    if let Some(path) = &cli.summary {
        summary.save(path)?;
    }
    println!("{}", serde_json::to_string(&summary.outcome)?);

    if let MatchOutcome::Desync {
        tick,
        local_hash,
        remote_hash,
    } = summary.outcome
    {
        return Err(rwe_core::error::GameError::DesyncDetected {
            tick,
            local_hash,
            remote_hash,
        }
        .into());
    }
    Ok(())
}
