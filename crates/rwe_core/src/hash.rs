//! Structural state hash for desync detection.
//!
//! Structs fold their fields in order (`h * 31 + field`). Containers sum
//! their element hashes with wrapping arithmetic so the result does not
//! depend on iteration order. Small enums and other leaf values that derive
//! [`Hash`] go through [`LeafHasher`], an FNV-1a hasher whose output is the
//! same on every platform.

use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::feature::MapFeature;
use crate::ids::{GameTime, PlayerId};
use crate::math::{SimAngle, SimScalar, SimVector};
use crate::player::{GamePlayerInfo, ResourceAccount};
use crate::projectile::Projectile;
use crate::unit::UnitState;
use crate::vector_map::OpaqueId;

/// A 32-bit state hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GameHash(pub u32);

impl Add for GameHash {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for GameHash {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::fmt::Display for GameHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Values that contribute to the state hash.
pub trait SimHash {
    /// This value's hash.
    fn sim_hash(&self) -> u32;
}

/// Fold `value` into `hash`.
#[must_use]
pub const fn combine(hash: u32, value: u32) -> u32 {
    hash.wrapping_mul(31).wrapping_add(value)
}

/// Ordered fold over struct fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldHasher(u32);

impl FieldHasher {
    /// Empty fold.
    #[must_use]
    pub const fn new() -> Self {
        Self(17)
    }

    /// Fold in one field.
    #[must_use]
    pub fn field<T: SimHash + ?Sized>(self, value: &T) -> Self {
        Self(combine(self.0, value.sim_hash()))
    }

    /// Fold in a leaf value through its [`Hash`] impl.
    #[must_use]
    pub fn leaf<T: Hash + ?Sized>(self, value: &T) -> Self {
        Self(combine(self.0, leaf_hash(value)))
    }

    /// The folded hash.
    #[must_use]
    pub const fn finish(self) -> u32 {
        self.0
    }
}

/// Platform-independent FNV-1a hasher for leaf values.
#[derive(Debug, Clone, Copy)]
pub struct LeafHasher(u64);

impl Default for LeafHasher {
    fn default() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }
}

impl Hasher for LeafHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
    }

    fn write_u16(&mut self, i: u16) {
        self.write(&i.to_le_bytes());
    }

    fn write_u32(&mut self, i: u32) {
        self.write(&i.to_le_bytes());
    }

    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }

    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64);
    }

    fn write_i16(&mut self, i: i16) {
        self.write_u16(i as u16);
    }

    fn write_i32(&mut self, i: i32) {
        self.write_u32(i as u32);
    }

    fn write_i64(&mut self, i: i64) {
        self.write_u64(i as u64);
    }

    fn write_isize(&mut self, i: isize) {
        self.write_u64(i as u64);
    }
}

/// Hash a leaf value to 32 bits.
#[must_use]
pub fn leaf_hash<T: Hash + ?Sized>(value: &T) -> u32 {
    let mut hasher = LeafHasher::default();
    value.hash(&mut hasher);
    let wide = hasher.finish();
    (wide ^ (wide >> 32)) as u32
}

macro_rules! sim_hash_as_u32 {
    ($($t:ty),*) => {
        $(impl SimHash for $t {
            fn sim_hash(&self) -> u32 {
                *self as u32
            }
        })*
    };
}

sim_hash_as_u32!(u8, u16, u32, i8, i16, i32, bool);

impl SimHash for u64 {
    fn sim_hash(&self) -> u32 {
        (*self ^ (*self >> 32)) as u32
    }
}

impl SimHash for usize {
    fn sim_hash(&self) -> u32 {
        (*self as u64).sim_hash()
    }
}

impl SimHash for str {
    fn sim_hash(&self) -> u32 {
        self.bytes().fold(0, |h, b| combine(h, u32::from(b)))
    }
}

impl SimHash for String {
    fn sim_hash(&self) -> u32 {
        self.as_str().sim_hash()
    }
}

impl SimHash for SimScalar {
    fn sim_hash(&self) -> u32 {
        self.to_bits().sim_hash()
    }
}

impl SimHash for SimAngle {
    fn sim_hash(&self) -> u32 {
        u32::from(self.value())
    }
}

impl SimHash for SimVector {
    fn sim_hash(&self) -> u32 {
        FieldHasher::new().field(&self.x).field(&self.y).field(&self.z).finish()
    }
}

impl<Tag> SimHash for OpaqueId<Tag> {
    fn sim_hash(&self) -> u32 {
        self.value()
    }
}

impl SimHash for PlayerId {
    fn sim_hash(&self) -> u32 {
        self.0
    }
}

impl SimHash for GameTime {
    fn sim_hash(&self) -> u32 {
        self.0
    }
}

impl<T: SimHash> SimHash for Option<T> {
    fn sim_hash(&self) -> u32 {
        self.as_ref().map_or(0, |v| combine(1, v.sim_hash()))
    }
}

impl<T: SimHash> SimHash for [T] {
    fn sim_hash(&self) -> u32 {
        self.iter().fold(0u32, |h, v| h.wrapping_add(v.sim_hash()))
    }
}

impl<T: SimHash> SimHash for Vec<T> {
    fn sim_hash(&self) -> u32 {
        self.as_slice().sim_hash()
    }
}

impl<T: SimHash> SimHash for VecDeque<T> {
    fn sim_hash(&self) -> u32 {
        self.iter().fold(0u32, |h, v| h.wrapping_add(v.sim_hash()))
    }
}

impl<K: SimHash, V: SimHash> SimHash for BTreeMap<K, V> {
    fn sim_hash(&self) -> u32 {
        self.iter()
            .fold(0u32, |h, (k, v)| h.wrapping_add(combine(k.sim_hash(), v.sim_hash())))
    }
}

impl<A: SimHash, B: SimHash> SimHash for (A, B) {
    fn sim_hash(&self) -> u32 {
        combine(self.0.sim_hash(), self.1.sim_hash())
    }
}

impl SimHash for ResourceAccount {
    fn sim_hash(&self) -> u32 {
        FieldHasher::new()
            .field(&self.current)
            .field(&self.max)
            .field(&self.desired_consumption)
            .field(&self.previous_desired_consumption)
            .field(&self.actual_consumption)
            .field(&self.previous_actual_consumption)
            .field(&self.production)
            .field(&self.previous_production)
            .field(&self.stalled)
            .finish()
    }
}

impl SimHash for GamePlayerInfo {
    fn sim_hash(&self) -> u32 {
        FieldHasher::new()
            .leaf(&self.controller)
            .leaf(&self.status)
            .field(&self.side)
            .field(&self.color_index)
            .field(&self.energy)
            .field(&self.metal)
            .finish()
    }
}

impl SimHash for UnitState {
    fn sim_hash(&self) -> u32 {
        let statics = self
            .cob_environment
            .as_ref()
            .map_or(0, |env| env.statics().iter().fold(0, |h, s| combine(h, s.sim_hash())));
        FieldHasher::new()
            .field(&self.unit_type)
            .field(&self.owner)
            .field(&self.position)
            .field(&self.rotation)
            .leaf(&self.physics)
            .field(&self.in_collision)
            .field(&self.hit_points)
            .leaf(&self.life_state)
            .field(&self.build_time_completed)
            .leaf(&self.orders)
            .leaf(&self.behaviour_state)
            .leaf(&self.navigation_state)
            .field(&self.in_build_stance)
            .field(&self.yard_open)
            .field(&self.activated)
            .field(&self.is_sufficiently_powered)
            .leaf(&self.energy)
            .leaf(&self.metal)
            .leaf(&self.weapons)
            .leaf(&self.fire_orders)
            .leaf(&self.mesh)
            .field(&statics)
            .finish()
    }
}

impl SimHash for Projectile {
    fn sim_hash(&self) -> u32 {
        FieldHasher::new()
            .field(&self.weapon_type)
            .field(&self.owner)
            .field(&self.position)
            .field(&self.velocity)
            .field(&self.damage_radius)
            .field(&self.damage)
            .leaf(&self.physics)
            .field(&self.weapon_timer)
            .field(&self.has_bounced)
            .field(&self.is_dead)
            .finish()
    }
}

impl SimHash for MapFeature {
    fn sim_hash(&self) -> u32 {
        FieldHasher::new()
            .field(&self.feature_type)
            .field(&self.position)
            .field(&self.hit_points)
            .field(&self.metal)
            .field(&self.energy)
            .finish()
    }
}
