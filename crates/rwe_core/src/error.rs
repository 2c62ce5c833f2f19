//! Error types for the game simulation.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// A unit type name is not in the database.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// A weapon name is not in the database.
    #[error("Unknown weapon type: {0}")]
    UnknownWeaponType(String),

    /// A feature name is not in the database.
    #[error("Unknown feature type: {0}")]
    UnknownFeatureType(String),

    /// A movement class name is not in the database.
    #[error("Unknown movement class: {0}")]
    UnknownMovementClass(String),

    /// No model is registered for a unit's object name.
    #[error("Unknown unit model: {0}")]
    UnknownModel(String),

    /// A unit script failed validation.
    #[error("Malformed script '{name}': {message}")]
    MalformedScript {
        /// Script name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid unit identifier.
    #[error("Invalid unit ID: {0}")]
    InvalidUnitId(u32),

    /// Invalid player identifier.
    #[error("Invalid player ID: {0}")]
    InvalidPlayerId(u32),

    /// A unit could not be placed because its footprint is blocked.
    #[error("Cannot place unit '{unit_type}': footprint is blocked")]
    PlacementBlocked {
        /// Unit type that could not be placed.
        unit_type: String,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Desync detected in multiplayer.
    #[error("Desync detected at tick {tick}: local hash {local_hash:#010x}, remote hash {remote_hash:#010x}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u32,
        /// Local simulation hash.
        local_hash: u32,
        /// Remote simulation hash.
        remote_hash: u32,
    },
}
