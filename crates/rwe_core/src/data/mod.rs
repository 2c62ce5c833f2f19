//! Game data definitions.
//!
//! Plain data records for unit, weapon, feature, movement class and model
//! types. All structs deserialize from RON so the asset layer (or a test)
//! can hand them to the simulation fully parsed.
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by `rwe_headless`.

mod database;
mod feature_data;
mod model_data;
mod unit_data;
mod weapon_data;

pub use database::{DataBundle, UnitDatabase};
pub use feature_data::{FeatureDefinition, MovementClass};
pub use model_data::{PieceDefinition, UnitModelDefinition};
pub use unit_data::{UnitDefinition, YardMapCell};
pub use weapon_data::{WeaponDefinition, WeaponPhysicsType, DEFAULT_ARMOR_CLASS};
