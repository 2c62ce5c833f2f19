//! Error type for the headless runner.

use std::path::PathBuf;

use rwe_core::error::GameError;
use rwe_net::NetworkError;
use thiserror::Error;

/// Everything that can stop a headless run.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// A file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: std::io::Error,
    },

    /// A RON file did not parse.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: ron::error::SpannedError,
    },

    /// The match file is inconsistent.
    #[error("invalid match settings: {0}")]
    InvalidSettings(String),

    /// No data directory was given and none could be derived.
    #[error("no data directory: set --data-dir, HOME or APPDATA")]
    NoDataDirectory,

    /// Game data or simulation error, including desyncs.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Network failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Peers never finished loading.
    #[error("timed out waiting for peers to load")]
    LoadingTimeout,

    /// Parallel replay runs disagreed.
    #[error("replay runs diverged: {0}")]
    NonDeterministic(String),

    /// The summary could not be encoded.
    #[error("failed to write summary: {0}")]
    Summary(#[from] serde_json::Error),

    /// The logger could not be installed.
    #[error("failed to set up logging: {0}")]
    Logging(String),
}

impl HeadlessError {
    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for headless operations.
pub type Result<T> = std::result::Result<T, HeadlessError>;
