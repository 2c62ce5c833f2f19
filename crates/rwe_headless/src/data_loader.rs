//! Loading game data from RON files.
//!
//! Every `*.ron` file in the definitions directory is a
//! [`DataBundle`](rwe_core::data::DataBundle). Files are read in name
//! order and merged, so a later file can add scripts for units defined in
//! an earlier one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rwe_core::data::{DataBundle, UnitDatabase};
use tracing::{debug, info};

use crate::error::{HeadlessError, Result};

/// Parse one bundle file.
pub fn load_bundle(path: &Path) -> Result<DataBundle> {
    let contents = fs::read_to_string(path).map_err(|e| HeadlessError::io(path, e))?;
    ron::from_str(&contents).map_err(|source| HeadlessError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Bundle files in `dir`, sorted by name.
pub fn bundle_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| HeadlessError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| HeadlessError::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Append everything in `other` to `into`.
pub fn merge_bundle(into: &mut DataBundle, other: DataBundle) {
    into.units.extend(other.units);
    into.weapons.extend(other.weapons);
    into.features.extend(other.features);
    into.movement_classes.extend(other.movement_classes);
    into.models.extend(other.models);
    into.scripts.extend(other.scripts);
}

/// Load and validate every bundle in `dir`.
pub fn load_database(dir: &Path) -> Result<Arc<UnitDatabase>> {
    let mut bundle = DataBundle::default();
    let files = bundle_files(dir)?;
    for file in &files {
        debug!(file = %file.display(), "loading data bundle");
        merge_bundle(&mut bundle, load_bundle(file)?);
    }
    let units = bundle.units.len();
    let database = UnitDatabase::from_bundle(bundle)?;
    info!(files = files.len(), units, "game data loaded");
    Ok(Arc::new(database))
}
