//! Registry of every definition a match needs, keyed by upper-cased name.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FeatureDefinition, MovementClass, UnitDefinition, UnitModelDefinition, WeaponDefinition};
use crate::cob::CobScript;
use crate::error::{GameError, Result};

/// Definitions as delivered by the asset layer, before indexing.
///
/// # Example RON
///
/// ```ron
/// DataBundle(
///     units: [UnitDefinition(unit_name: "ARMPW", ...)],
///     weapons: [WeaponDefinition(name: "EMG", ...)],
///     movement_classes: [MovementClass(name: "KBOT2", ...)],
///     scripts: {"ARMPW": CobScript(...)},
/// )
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataBundle {
    /// Unit types.
    #[serde(default)]
    pub units: Vec<UnitDefinition>,
    /// Weapon types.
    #[serde(default)]
    pub weapons: Vec<WeaponDefinition>,
    /// Feature types.
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
    /// Movement classes.
    #[serde(default)]
    pub movement_classes: Vec<MovementClass>,
    /// Unit models.
    #[serde(default)]
    pub models: Vec<UnitModelDefinition>,
    /// Unit scripts keyed by object name.
    #[serde(default)]
    pub scripts: BTreeMap<String, CobScript>,
}

/// Read-only game data shared by the simulation.
#[derive(Debug, Clone, Default)]
pub struct UnitDatabase {
    units: BTreeMap<String, UnitDefinition>,
    weapons: BTreeMap<String, WeaponDefinition>,
    features: BTreeMap<String, FeatureDefinition>,
    movement_classes: BTreeMap<String, MovementClass>,
    models: BTreeMap<String, UnitModelDefinition>,
    scripts: BTreeMap<String, Arc<CobScript>>,
}

fn key(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl UnitDatabase {
    /// Empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a bundle and check every cross-reference.
    pub fn from_bundle(bundle: DataBundle) -> Result<Self> {
        let mut db = Self::new();
        for unit in bundle.units {
            db.add_unit(unit);
        }
        for weapon in bundle.weapons {
            db.add_weapon(weapon);
        }
        for feature in bundle.features {
            db.add_feature(feature);
        }
        for class in bundle.movement_classes {
            db.add_movement_class(class);
        }
        for model in bundle.models {
            db.add_model(model);
        }
        for (name, script) in bundle.scripts {
            db.add_script(&name, script)?;
        }
        db.validate()?;
        debug!(
            units = db.units.len(),
            weapons = db.weapons.len(),
            features = db.features.len(),
            "unit database loaded"
        );
        Ok(db)
    }

    /// Register a unit type.
    pub fn add_unit(&mut self, unit: UnitDefinition) {
        self.units.insert(key(&unit.unit_name), unit);
    }

    /// Register a weapon type.
    pub fn add_weapon(&mut self, weapon: WeaponDefinition) {
        self.weapons.insert(key(&weapon.name), weapon);
    }

    /// Register a feature type.
    pub fn add_feature(&mut self, feature: FeatureDefinition) {
        self.features.insert(key(&feature.name), feature);
    }

    /// Register a movement class.
    pub fn add_movement_class(&mut self, class: MovementClass) {
        self.movement_classes.insert(key(&class.name), class);
    }

    /// Register a unit model.
    pub fn add_model(&mut self, model: UnitModelDefinition) {
        self.models.insert(key(&model.name), model);
    }

    /// Register a script after checking it is well formed.
    pub fn add_script(&mut self, object_name: &str, script: CobScript) -> Result<()> {
        script.validate().map_err(|e| GameError::MalformedScript {
            name: object_name.to_string(),
            message: e.to_string(),
        })?;
        self.scripts.insert(key(object_name), Arc::new(script));
        Ok(())
    }

    /// Unit type by name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitDefinition> {
        self.units.get(&key(name))
    }

    /// Unit type by name, or a data error.
    pub fn try_unit(&self, name: &str) -> Result<&UnitDefinition> {
        self.unit(name)
            .ok_or_else(|| GameError::UnknownUnitType(name.to_string()))
    }

    /// Weapon type by name.
    #[must_use]
    pub fn weapon(&self, name: &str) -> Option<&WeaponDefinition> {
        self.weapons.get(&key(name))
    }

    /// Weapon type by name, or a data error.
    pub fn try_weapon(&self, name: &str) -> Result<&WeaponDefinition> {
        self.weapon(name)
            .ok_or_else(|| GameError::UnknownWeaponType(name.to_string()))
    }

    /// Feature type by name.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&FeatureDefinition> {
        self.features.get(&key(name))
    }

    /// Feature type by name, or a data error.
    pub fn try_feature(&self, name: &str) -> Result<&FeatureDefinition> {
        self.feature(name)
            .ok_or_else(|| GameError::UnknownFeatureType(name.to_string()))
    }

    /// Movement class by name.
    #[must_use]
    pub fn movement_class(&self, name: &str) -> Option<&MovementClass> {
        self.movement_classes.get(&key(name))
    }

    /// All movement classes in name order.
    pub fn movement_classes(&self) -> impl Iterator<Item = &MovementClass> {
        self.movement_classes.values()
    }

    /// Model by object name.
    #[must_use]
    pub fn model(&self, object_name: &str) -> Option<&UnitModelDefinition> {
        self.models.get(&key(object_name))
    }

    /// Script by object name.
    #[must_use]
    pub fn script(&self, object_name: &str) -> Option<Arc<CobScript>> {
        self.scripts.get(&key(object_name)).cloned()
    }

    /// Check that every name a definition mentions resolves.
    pub fn validate(&self) -> Result<()> {
        for unit in self.units.values() {
            for weapon in unit.weapons.iter().filter(|w| !w.is_empty()) {
                self.try_weapon(weapon)?;
            }
            if let Some(explode_as) = &unit.explode_as {
                self.try_weapon(explode_as)?;
            }
            if let Some(class) = &unit.movement_class {
                if self.movement_class(class).is_none() {
                    return Err(GameError::UnknownMovementClass(class.clone()));
                }
            }
            for option in &unit.build_options {
                self.try_unit(option)?;
            }
            if let Some(corpse) = &unit.corpse {
                self.try_feature(corpse)?;
            }
            if let Some(yard_map) = &unit.yard_map {
                let cells = (unit.footprint_x * unit.footprint_z).max(0) as usize;
                if yard_map.len() != cells {
                    return Err(GameError::DataParseError {
                        path: unit.unit_name.clone(),
                        message: format!("yard map has {} cells, footprint has {cells}", yard_map.len()),
                    });
                }
            }
        }
        Ok(())
    }
}
