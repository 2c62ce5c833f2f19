//! Tracing setup: human-readable stderr plus a plain-text log file.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{HeadlessError, Result};

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `debug` with `verbose`
/// and `info` otherwise. When `log_file` is given, a non-ANSI copy of every
/// event at `debug` and above is written there.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false).with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HeadlessError::io(parent, e))?;
            }
            let file = File::create(path).map_err(|e| HeadlessError::io(path, e))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| HeadlessError::Logging(e.to_string()))
}
