//! Seek and arrive steering for ground units.

use crate::math::{SimScalar, SimVector};
use crate::unit::{SteeringInfo, UnitState};

/// Radius of the circle a unit drives at full speed and full turn rate.
///
/// One full turn takes `65536 / turn_rate` ticks, covering
/// `max_speed * 65536 / turn_rate` world units; the radius is that over 2π.
fn turn_radius(unit: &UnitState) -> SimScalar {
    let turn_rate = i32::from(unit.turn_rate.value()).max(1);
    unit.max_speed.mul_int(10_430).div_int(turn_rate)
}

/// Head for `destination` at a speed scaled by how well the unit already
/// faces it.
///
/// Inside the turn radius a badly aligned unit stops and turns on the spot
/// instead of orbiting the destination.
#[must_use]
pub fn seek(unit: &UnitState, destination: SimVector) -> SteeringInfo {
    let delta = (destination - unit.position).xz();
    let facing = unit.facing();
    let direction = delta.normalized_or(facing);
    let alignment = facing.dot(direction).max(SimScalar::ZERO);

    let radius = turn_radius(unit);
    let factor = if delta.length_squared() < radius.squared() {
        // Squaring biases toward zero unless nearly aligned.
        alignment * alignment
    } else {
        alignment
    };

    SteeringInfo {
        target_angle: delta.heading(),
        target_speed: unit.max_speed * factor,
    }
}

/// Like [`seek`], but brakes so the unit can stop at `destination`.
///
/// The target speed never exceeds `sqrt(2 b d)`, the speed from which the
/// brake rate `b` stops the unit within the remaining distance `d`.
#[must_use]
pub fn arrive(unit: &UnitState, destination: SimVector) -> SteeringInfo {
    let mut steering = seek(unit, destination);
    if unit.brake_rate > SimScalar::ZERO {
        let distance = (destination - unit.position).xz().length();
        let stopping_speed = (unit.brake_rate * distance).mul_int(2).sqrt();
        steering.target_speed = steering.target_speed.min(stopping_speed);
    }
    steering
}

/// Stand still, keeping the current heading.
#[must_use]
pub fn stop(unit: &UnitState) -> SteeringInfo {
    SteeringInfo {
        target_angle: unit.rotation,
        target_speed: SimScalar::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MovementClass, UnitDefinition};
    use crate::ids::PlayerId;
    use crate::math::SimAngle;

    fn create_test_unit() -> UnitState {
        let definition: UnitDefinition = ron::from_str(
            r#"UnitDefinition(
                unit_name: "ARMFLASH",
                object_name: "ARMFLASH",
                footprint_x: 2,
                footprint_z: 2,
                max_velocity: 131072,
                brake_rate: 32768,
                turn_rate: 1024,
            )"#,
        )
        .expect("test definition should parse");
        let class = MovementClass {
            name: "TANK2".to_string(),
            footprint_x: 2,
            footprint_z: 2,
            max_slope: 20,
            max_water_slope: 20,
            min_water_depth: 0,
            max_water_depth: 10,
        };
        UnitState::new(&definition, None, None, class, PlayerId(0), SimVector::ZERO)
    }

    #[test]
    fn test_seek_full_speed_when_aligned() {
        let unit = create_test_unit();
        let steering = seek(&unit, SimVector::from_ints(0, 0, 1000));
        assert_eq!(steering.target_angle, SimAngle::ZERO);
        assert_eq!(steering.target_speed, unit.max_speed);
    }

    #[test]
    fn test_seek_turns_on_the_spot_when_close_and_sideways() {
        let unit = create_test_unit();
        let steering = seek(&unit, SimVector::from_ints(20, 0, 0));
        assert_eq!(steering.target_angle, SimAngle::QUARTER_TURN);
        assert!(steering.target_speed < SimScalar::from_ratio(1, 100));
    }

    #[test]
    fn test_arrive_brakes_near_destination() {
        let unit = create_test_unit();
        let far = arrive(&unit, SimVector::from_ints(0, 0, 1000));
        let near = arrive(&unit, SimVector::from_ints(0, 0, 1));
        assert_eq!(far.target_speed, unit.max_speed);
        // sqrt(2 * 0.5 * 1) = 1
        assert!((near.target_speed - SimScalar::ONE).abs() < SimScalar::from_ratio(1, 100));
    }
}
