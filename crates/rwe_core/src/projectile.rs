//! Projectiles in flight.
//!
//! Motion is integrated here; collision, damage and bouncing need the rest
//! of the world and are resolved by the simulation's projectile pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::GRAVITY;
use crate::data::{WeaponDefinition, WeaponPhysicsType};
use crate::ids::{GameTime, PlayerId, UnitId};
use crate::math::{SimAngle, SimScalar, SimVector, WideScalar};
use crate::unit::AttackTarget;

/// How a projectile moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectilePhysics {
    /// Straight line at constant velocity.
    LineOfSight,
    /// Falls under gravity.
    Ballistic,
    /// Steers toward its target.
    Tracking {
        /// Maximum heading change per tick.
        turn_rate: SimAngle,
        /// What it homes on.
        target: Option<AttackTarget>,
    },
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Weapon definition name.
    pub weapon_type: String,
    /// Player credited with hits.
    pub owner: PlayerId,
    /// Firing unit; never hit by its own shot.
    pub source_unit: Option<UnitId>,
    /// Current position.
    pub position: SimVector,
    /// Position at the start of the tick.
    pub previous_position: SimVector,
    /// Where it was fired from.
    pub origin: SimVector,
    /// World units per tick.
    pub velocity: SimVector,
    /// Radius of splash damage.
    pub damage_radius: SimScalar,
    /// Damage per armor class.
    pub damage: BTreeMap<String, u32>,
    /// Motion model.
    pub physics: ProjectilePhysics,
    /// Tick on which the fuse detonates it.
    pub weapon_timer: Option<GameTime>,
    /// Tick on which a beam fades out without detonating.
    pub expiry_time: Option<GameTime>,
    /// May bounce once off the ground.
    pub ground_bounce: bool,
    /// Fuse length after a bounce, in ticks.
    pub random_decay: Option<u32>,
    /// Already bounced.
    pub has_bounced: bool,
    /// Hit or expired; removed next tick.
    pub is_dead: bool,
}

impl Projectile {
    /// Projectile for `weapon` fired from `position` with `velocity`.
    #[must_use]
    pub fn new(
        weapon: &WeaponDefinition,
        owner: PlayerId,
        source_unit: Option<UnitId>,
        position: SimVector,
        velocity: SimVector,
        target: Option<AttackTarget>,
        now: GameTime,
    ) -> Self {
        let physics = match weapon.physics_type {
            WeaponPhysicsType::LineOfSight => ProjectilePhysics::LineOfSight,
            WeaponPhysicsType::Ballistic => ProjectilePhysics::Ballistic,
            WeaponPhysicsType::Tracking { turn_rate } => ProjectilePhysics::Tracking { turn_rate, target },
        };
        Self {
            weapon_type: weapon.name.clone(),
            owner,
            source_unit,
            position,
            previous_position: position,
            origin: position,
            velocity,
            damage_radius: weapon.damage_radius,
            damage: weapon.damage.clone(),
            physics,
            weapon_timer: weapon.weapon_timer.map(|t| now.plus(t)),
            expiry_time: weapon.duration.map(|t| now.plus(t)),
            ground_bounce: weapon.ground_bounce,
            random_decay: weapon.random_decay,
            has_bounced: false,
            is_dead: false,
        }
    }

    /// Damage against an armor class, falling back to the default class.
    #[must_use]
    pub fn damage_for(&self, armor_class: &str) -> u32 {
        self.damage
            .get(armor_class)
            .or_else(|| self.damage.get(crate::data::DEFAULT_ARMOR_CLASS))
            .copied()
            .unwrap_or(0)
    }

    /// Advance one tick. `target_position` is where a tracking projectile's
    /// target currently is.
    pub fn integrate(&mut self, target_position: Option<SimVector>) {
        self.previous_position = self.position;
        match self.physics {
            ProjectilePhysics::LineOfSight => {}
            ProjectilePhysics::Ballistic => {
                self.velocity.y -= GRAVITY;
            }
            ProjectilePhysics::Tracking { turn_rate, .. } => {
                if let Some(target) = target_position {
                    self.velocity = steer_towards(self.velocity, target - self.position, turn_rate);
                }
            }
        }
        self.position += self.velocity;
    }
}

/// Rotate `velocity` toward `direction` by at most `turn_rate` in heading,
/// keeping speed and climbing or diving straight at the target.
fn steer_towards(velocity: SimVector, direction: SimVector, turn_rate: SimAngle) -> SimVector {
    let speed = velocity.length();
    let distance = direction.length();
    if speed == SimScalar::ZERO || distance == SimScalar::ZERO {
        return velocity;
    }
    let heading = velocity.heading().turn_towards(direction.heading(), turn_rate);
    let climb = speed * direction.y / distance;
    let horizontal = (speed * speed - climb * climb).max(SimScalar::ZERO).sqrt();
    SimVector::from_heading(heading).scaled(horizontal) + SimVector::new(SimScalar::ZERO, climb, SimScalar::ZERO)
}

/// Tangent of the lower launch angle that puts a projectile of speed `v`
/// through a point `x` ahead and `y` above the muzzle under gravity `g`.
///
/// Solves `g x² t² - 2 v² x t + (g x² + 2 v² y) = 0` for `t = tan θ`.
/// Returns `None` if the point is out of range.
#[must_use]
pub fn ballistic_launch_tangent(v: SimScalar, g: SimScalar, x: SimScalar, y: SimScalar) -> Option<SimScalar> {
    if x <= SimScalar::ZERO {
        return None;
    }
    let v2 = v.squared();
    let x_wide = x.widen();
    let a = g.wide_mul(x) * x_wide;
    let b = v2 * x_wide;
    let c = a + (v2 * y.widen()).mul_int(2);
    // With b halved: t = (b ± sqrt(b² - a c)) / a.
    let discriminant = b * b - a * c;
    if discriminant.is_negative() {
        return None;
    }
    if a == WideScalar::ZERO {
        return Some(y / x);
    }
    Some(((b - discriminant.sqrt()) / a).saturate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_weapon(physics_type: WeaponPhysicsType) -> WeaponDefinition {
        WeaponDefinition {
            name: "TEST".to_string(),
            physics_type,
            max_range: SimScalar::from_int(500),
            reload_time: 30,
            velocity: SimScalar::from_int(4),
            damage: BTreeMap::from([("DEFAULT".to_string(), 50), ("ARMORED".to_string(), 10)]),
            damage_radius: SimScalar::from_int(16),
            tolerance: SimAngle::new(1024),
            pitch_tolerance: SimAngle::new(1024),
            weapon_timer: Some(90),
            duration: None,
            ground_bounce: false,
            random_decay: None,
            explosion_animation: None,
            sound_start: None,
            energy_per_shot: SimScalar::ZERO,
            metal_per_shot: SimScalar::ZERO,
        }
    }

    #[test]
    fn test_ballistic_falls() {
        let weapon = create_test_weapon(WeaponPhysicsType::Ballistic);
        let mut p = Projectile::new(
            &weapon,
            PlayerId(0),
            None,
            SimVector::ZERO,
            SimVector::from_ints(1, 0, 0),
            None,
            GameTime(5),
        );
        assert_eq!(p.weapon_timer, Some(GameTime(95)));
        p.integrate(None);
        assert_eq!(p.velocity.y, -GRAVITY);
        assert_eq!(p.position.y, -GRAVITY);
        assert_eq!(p.previous_position, SimVector::ZERO);
        assert_eq!(p.damage_for("ARMORED"), 10);
        assert_eq!(p.damage_for("TANK"), 50);
    }

    #[test]
    fn test_tracking_turns_toward_target() {
        let weapon = create_test_weapon(WeaponPhysicsType::Tracking {
            turn_rate: SimAngle::new(2048),
        });
        let mut p = Projectile::new(
            &weapon,
            PlayerId(0),
            None,
            SimVector::ZERO,
            SimVector::from_ints(0, 0, 4),
            None,
            GameTime(0),
        );
        p.integrate(Some(SimVector::from_ints(100, 0, 0)));
        let heading = p.velocity.heading();
        assert!(heading.value() > 1900 && heading.value() < 2200, "heading {heading:?}");
        let speed = p.velocity.length();
        assert!((speed - SimScalar::from_int(4)).abs() < SimScalar::from_ratio(1, 50));
    }

    #[test]
    fn test_launch_tangent_flat_shot() {
        // v = 4, g = 0.1, x = 100: t = (1600 - sqrt(1600² - 1000²)) / 1000.
        let t = ballistic_launch_tangent(
            SimScalar::from_int(4),
            SimScalar::from_ratio(1, 10),
            SimScalar::from_int(100),
            SimScalar::ZERO,
        )
        .unwrap();
        let expected = SimScalar::from_ratio(351, 1000);
        assert!((t - expected).abs() < SimScalar::from_ratio(1, 100), "t {t}");
    }

    #[test]
    fn test_launch_tangent_long_shot_does_not_overflow() {
        // v = 20, g = 0.1, x = 2000: b² alone is far past 32 bits.
        // t = (800000 - sqrt(800000² - 400000²)) / 400000 = 2 - sqrt(3).
        let t = ballistic_launch_tangent(
            SimScalar::from_int(20),
            SimScalar::from_ratio(1, 10),
            SimScalar::from_int(2000),
            SimScalar::ZERO,
        )
        .unwrap();
        let expected = SimScalar::from_ratio(268, 1000);
        assert!((t - expected).abs() < SimScalar::from_ratio(1, 100), "t {t}");
    }

    #[test]
    fn test_launch_tangent_out_of_range() {
        assert!(ballistic_launch_tangent(
            SimScalar::from_int(2),
            SimScalar::from_ratio(1, 10),
            SimScalar::from_int(100),
            SimScalar::ZERO,
        )
        .is_none());
    }
}
