//! Weapon definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{SimAngle, SimScalar};

/// How a weapon's projectiles move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponPhysicsType {
    /// Straight line at constant velocity.
    LineOfSight,
    /// Arcing under gravity.
    Ballistic,
    /// Homing on the target, turning at most `turn_rate` per tick.
    Tracking {
        /// Maximum heading change per tick.
        turn_rate: SimAngle,
    },
}

/// Immutable game data for one weapon type.
///
/// # Example RON
///
/// ```ron
/// WeaponDefinition(
///     name: "ARM_LIGHTLASER",
///     physics_type: LineOfSight,
///     max_range: 11796480,   // 180
///     reload_time: 30,
///     velocity: 1310720,     // 20
///     damage: {"DEFAULT": 30},
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponDefinition {
    /// Unique weapon name.
    pub name: String,

    /// Projectile movement model.
    pub physics_type: WeaponPhysicsType,

    /// Maximum engagement distance.
    pub max_range: SimScalar,

    /// Ticks between shots.
    pub reload_time: u32,

    /// Launch speed in world units per tick.
    pub velocity: SimScalar,

    /// Damage per armor class. `DEFAULT` applies to unlisted classes.
    #[serde(default)]
    pub damage: BTreeMap<String, u32>,

    /// Radius of area damage.
    #[serde(default)]
    pub damage_radius: SimScalar,

    /// Maximum heading error at which the weapon will fire.
    #[serde(default = "default_tolerance")]
    pub tolerance: SimAngle,

    /// Maximum pitch error at which the weapon will fire.
    #[serde(default = "default_tolerance")]
    pub pitch_tolerance: SimAngle,

    /// Ticks until the projectile detonates on its own.
    #[serde(default)]
    pub weapon_timer: Option<u32>,

    /// Lifetime of line-of-sight projectiles in ticks.
    #[serde(default)]
    pub duration: Option<u32>,

    /// Projectile bounces once off the ground before detonating.
    #[serde(default)]
    pub ground_bounce: bool,

    /// Remaining-timer jitter applied on bounce, in ticks.
    #[serde(default)]
    pub random_decay: Option<u32>,

    /// Explosion animation name for renderers.
    #[serde(default)]
    pub explosion_animation: Option<String>,

    /// Sound played when fired.
    #[serde(default)]
    pub sound_start: Option<String>,

    /// Energy drawn per shot.
    #[serde(default)]
    pub energy_per_shot: SimScalar,

    /// Metal drawn per shot.
    #[serde(default)]
    pub metal_per_shot: SimScalar,
}

const fn default_tolerance() -> SimAngle {
    SimAngle::new(1024)
}

/// Armor class whose damage applies when no specific entry matches.
pub const DEFAULT_ARMOR_CLASS: &str = "DEFAULT";

impl WeaponDefinition {
    /// Damage dealt to a target of `armor_class`.
    #[must_use]
    pub fn damage_for(&self, armor_class: &str) -> u32 {
        self.damage
            .get(armor_class)
            .or_else(|| self.damage.get(DEFAULT_ARMOR_CLASS))
            .copied()
            .unwrap_or(0)
    }

    /// True if projectiles arc under gravity.
    #[must_use]
    pub fn is_ballistic(&self) -> bool {
        self.physics_type == WeaponPhysicsType::Ballistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_falls_back_to_default() {
        let weapon: WeaponDefinition = ron::from_str(
            r#"WeaponDefinition(
                name: "CANNON",
                physics_type: Ballistic,
                max_range: 26214400,
                reload_time: 60,
                velocity: 262144,
                damage: {"DEFAULT": 100, "COMMANDER": 20},
            )"#,
        )
        .expect("test weapon should parse");
        assert_eq!(weapon.damage_for("COMMANDER"), 20);
        assert_eq!(weapon.damage_for("TANK"), 100);
        assert!(weapon.is_ballistic());
        assert_eq!(weapon.max_range, SimScalar::from_int(400));
    }

    #[test]
    fn test_tracking_turn_rate_parses() {
        let weapon: WeaponDefinition = ron::from_str(
            r#"WeaponDefinition(
                name: "MISSILE",
                physics_type: Tracking(turn_rate: 800),
                max_range: 0,
                reload_time: 1,
                velocity: 0,
            )"#,
        )
        .expect("test weapon should parse");
        assert_eq!(
            weapon.physics_type,
            WeaponPhysicsType::Tracking {
                turn_rate: SimAngle::new(800)
            }
        );
        assert_eq!(weapon.damage_for("ANY"), 0);
    }
}
