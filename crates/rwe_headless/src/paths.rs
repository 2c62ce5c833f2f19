//! Data directory layout.
//!
//! ```text
//! <data>/
//!   data/*.ron     unit, weapon, feature, movement-class, model and script definitions
//!   maps/<map>.ron match settings
//!   replays/       recorded matches
//!   rwe.log        debug log
//! ```

use std::path::{Path, PathBuf};

use crate::error::{HeadlessError, Result};

/// Name of the log file in the data directory.
pub const LOG_FILE_NAME: &str = "rwe.log";

/// Resolve the data directory: `override_dir` if given, else
/// `%APPDATA%/RWE` on Windows or `$HOME/.rwe` elsewhere.
pub fn data_directory(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    default_data_directory(|name| std::env::var_os(name).map(PathBuf::from)).ok_or(HeadlessError::NoDataDirectory)
}

fn default_data_directory(env: impl Fn(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    if cfg!(windows) {
        env("APPDATA").map(|dir| dir.join("RWE"))
    } else {
        env("HOME").map(|dir| dir.join(".rwe"))
    }
}

/// Directory holding data definition files.
#[must_use]
pub fn definitions_directory(data_dir: &Path) -> PathBuf {
    data_dir.join("data")
}

/// Match settings file for `map_name`.
#[must_use]
pub fn map_path(data_dir: &Path, map_name: &str) -> PathBuf {
    data_dir.join("maps").join(format!("{map_name}.ron"))
}

/// Directory for recorded replays.
#[must_use]
pub fn replay_directory(data_dir: &Path) -> PathBuf {
    data_dir.join("replays")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = data_directory(Some(Path::new("/tmp/rwe-data"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/rwe-data"));
    }

    #[test]
    fn test_platform_default() {
        let dir = default_data_directory(|name| Some(PathBuf::from(format!("/{name}"))));
        if cfg!(windows) {
            assert_eq!(dir, Some(PathBuf::from("/APPDATA/RWE")));
        } else {
            assert_eq!(dir, Some(PathBuf::from("/HOME/.rwe")));
        }
        assert_eq!(default_data_directory(|_| None), None);
    }

    #[test]
    fn test_layout() {
        let root = Path::new("/d");
        assert_eq!(map_path(root, "Coast"), PathBuf::from("/d/maps/Coast.ron"));
        assert_eq!(definitions_directory(root), PathBuf::from("/d/data"));
    }
}
