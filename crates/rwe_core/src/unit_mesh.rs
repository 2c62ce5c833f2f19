//! Script-driven piece animation.
//!
//! Every piece has an independent move and rotate controller per axis. A
//! controller advances one step per tick and snaps onto its target once the
//! remaining distance is within one step.

use serde::{Deserialize, Serialize};

use crate::data::UnitModelDefinition;
use crate::math::{angle_between, SimAngle, SimScalar, SimVector};

/// A piece axis as addressed by scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis.
    X,
    /// Y axis.
    Y,
    /// Z axis.
    Z,
}

impl Axis {
    /// Axis from its script encoding, `None` for out-of-range values.
    #[must_use]
    pub const fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Linear motion toward a target offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveOperation {
    /// Target offset.
    pub target: SimScalar,
    /// Distance per tick.
    pub speed: SimScalar,
}

/// Rotation state of an axis that is currently animating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotateOperation {
    /// Turning toward a fixed angle.
    Turn {
        /// Target angle.
        target: SimAngle,
        /// Angle units per tick.
        speed: SimScalar,
    },
    /// Spinning indefinitely.
    Spin {
        /// Current angular velocity, angle units per tick.
        current_speed: SimScalar,
        /// Velocity to accelerate toward.
        target_speed: SimScalar,
        /// Change in velocity per tick; zero means instant.
        acceleration: SimScalar,
    },
    /// Spinning down to a stop.
    StopSpin {
        /// Current angular velocity.
        current_speed: SimScalar,
        /// Change in velocity per tick; zero means instant.
        deceleration: SimScalar,
    },
}

/// Offset and rotation of one piece axis plus its running animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AxisState {
    /// Offset from the rest pose along this axis.
    pub offset: SimScalar,
    /// Rotation about this axis.
    pub rotation: SimAngle,
    /// Running linear motion.
    pub move_operation: Option<MoveOperation>,
    /// Running rotation.
    pub rotate_operation: Option<RotateOperation>,
}

/// Animation state of one piece.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitPiece {
    /// Piece name.
    pub name: String,
    /// Offset from the unit origin in the rest pose.
    pub rest_offset: SimVector,
    /// Rendered or not.
    pub visible: bool,
    /// Lit by the renderer.
    pub shaded: bool,
    /// Per-axis state, indexed X, Y, Z.
    pub axes: [AxisState; 3],
}

/// The animated pieces of a unit, indexed like its script's piece list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitMesh {
    pieces: Vec<UnitPiece>,
}

fn step_towards(current: SimScalar, target: SimScalar, step: SimScalar) -> SimScalar {
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}

impl UnitMesh {
    /// Build the mesh for a script's piece list, taking rest offsets from the
    /// model where names match.
    #[must_use]
    pub fn new(piece_names: &[String], model: Option<&UnitModelDefinition>) -> Self {
        let pieces = piece_names
            .iter()
            .map(|name| {
                let rest_offset = model
                    .and_then(|m| m.piece_index(name).map(|i| m.piece_rest_offset(i)))
                    .unwrap_or(SimVector::ZERO);
                UnitPiece {
                    name: name.clone(),
                    rest_offset,
                    visible: true,
                    shaded: true,
                    axes: [AxisState::default(); 3],
                }
            })
            .collect();
        Self { pieces }
    }

    /// All pieces.
    #[must_use]
    pub fn pieces(&self) -> &[UnitPiece] {
        &self.pieces
    }

    /// A piece by index.
    #[must_use]
    pub fn piece(&self, index: usize) -> Option<&UnitPiece> {
        self.pieces.get(index)
    }

    fn axis_mut(&mut self, piece: usize, axis: Axis) -> Option<&mut AxisState> {
        self.pieces.get_mut(piece).map(|p| &mut p.axes[axis.index()])
    }

    /// Start a linear move, or jump straight there when `speed` is `None`.
    pub fn move_piece(&mut self, piece: usize, axis: Axis, target: SimScalar, speed: Option<SimScalar>) {
        if let Some(state) = self.axis_mut(piece, axis) {
            match speed {
                Some(speed) if speed > SimScalar::ZERO && state.offset != target => {
                    state.move_operation = Some(MoveOperation { target, speed });
                }
                _ => {
                    state.offset = target;
                    state.move_operation = None;
                }
            }
        }
    }

    /// Start a turn, or snap when `speed` is `None`.
    pub fn turn_piece(&mut self, piece: usize, axis: Axis, target: SimAngle, speed: Option<SimScalar>) {
        if let Some(state) = self.axis_mut(piece, axis) {
            match speed {
                Some(speed) if speed > SimScalar::ZERO && state.rotation != target => {
                    state.rotate_operation = Some(RotateOperation::Turn { target, speed });
                }
                _ => {
                    state.rotation = target;
                    state.rotate_operation = None;
                }
            }
        }
    }

    /// Start or retarget a spin. An in-progress spin keeps its velocity.
    pub fn spin_piece(&mut self, piece: usize, axis: Axis, target_speed: SimScalar, acceleration: SimScalar) {
        if let Some(state) = self.axis_mut(piece, axis) {
            let current_speed = match state.rotate_operation {
                Some(RotateOperation::Spin { current_speed, .. } | RotateOperation::StopSpin { current_speed, .. }) => {
                    current_speed
                }
                _ => SimScalar::ZERO,
            };
            state.rotate_operation = Some(RotateOperation::Spin {
                current_speed,
                target_speed,
                acceleration,
            });
        }
    }

    /// Spin down to a stop.
    pub fn stop_spin_piece(&mut self, piece: usize, axis: Axis, deceleration: SimScalar) {
        if let Some(state) = self.axis_mut(piece, axis) {
            if let Some(
                RotateOperation::Spin { current_speed, .. } | RotateOperation::StopSpin { current_speed, .. },
            ) = state.rotate_operation
            {
                state.rotate_operation = if deceleration == SimScalar::ZERO {
                    None
                } else {
                    Some(RotateOperation::StopSpin {
                        current_speed,
                        deceleration,
                    })
                };
            }
        }
    }

    /// Show or hide a piece.
    pub fn set_visible(&mut self, piece: usize, visible: bool) {
        if let Some(p) = self.pieces.get_mut(piece) {
            p.visible = visible;
        }
    }

    /// Toggle renderer shading of a piece.
    pub fn set_shaded(&mut self, piece: usize, shaded: bool) {
        if let Some(p) = self.pieces.get_mut(piece) {
            p.shaded = shaded;
        }
    }

    /// True while a linear move is running on the piece axis.
    #[must_use]
    pub fn is_moving(&self, piece: usize, axis: Axis) -> bool {
        self.pieces
            .get(piece)
            .is_some_and(|p| p.axes[axis.index()].move_operation.is_some())
    }

    /// True while a turn or spin-down is running on the piece axis.
    #[must_use]
    pub fn is_turning(&self, piece: usize, axis: Axis) -> bool {
        self.pieces.get(piece).is_some_and(|p| {
            matches!(
                p.axes[axis.index()].rotate_operation,
                Some(RotateOperation::Turn { .. } | RotateOperation::StopSpin { .. })
            )
        })
    }

    /// Piece offset from the unit origin in unit-local space, ignoring
    /// rotations of parent pieces.
    #[must_use]
    pub fn piece_local_offset(&self, piece: usize) -> SimVector {
        self.pieces.get(piece).map_or(SimVector::ZERO, |p| {
            p.rest_offset
                + SimVector::new(p.axes[0].offset, p.axes[1].offset, p.axes[2].offset)
        })
    }

    /// Advance every animation by one tick.
    pub fn update(&mut self) {
        for piece in &mut self.pieces {
            for state in &mut piece.axes {
                update_axis(state);
            }
        }
    }
}

fn update_axis(state: &mut AxisState) {
    if let Some(op) = state.move_operation {
        let remaining = (op.target - state.offset).abs();
        if remaining <= op.speed {
            state.offset = op.target;
            state.move_operation = None;
        } else {
            state.offset = step_towards(state.offset, op.target, op.speed);
        }
    }

    state.rotate_operation = match state.rotate_operation {
        None => None,
        Some(RotateOperation::Turn { target, speed }) => {
            let remaining = i32::from(angle_between(state.rotation, target));
            let step = speed.round_to_int().max(1);
            if remaining.abs() <= step {
                state.rotation = target;
                None
            } else {
                state.rotation += SimAngle::from_signed(step * remaining.signum());
                Some(RotateOperation::Turn { target, speed })
            }
        }
        Some(RotateOperation::Spin {
            current_speed,
            target_speed,
            acceleration,
        }) => {
            let current_speed = if acceleration == SimScalar::ZERO {
                target_speed
            } else {
                step_towards(current_speed, target_speed, acceleration)
            };
            state.rotation += SimAngle::from_signed(current_speed.round_to_int());
            Some(RotateOperation::Spin {
                current_speed,
                target_speed,
                acceleration,
            })
        }
        Some(RotateOperation::StopSpin {
            current_speed,
            deceleration,
        }) => {
            let current_speed = step_towards(current_speed, SimScalar::ZERO, deceleration);
            state.rotation += SimAngle::from_signed(current_speed.round_to_int());
            (current_speed != SimScalar::ZERO).then_some(RotateOperation::StopSpin {
                current_speed,
                deceleration,
            })
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> UnitMesh {
        UnitMesh::new(&["base".to_string(), "turret".to_string()], None)
    }

    #[test]
    fn test_move_snaps_within_one_step() {
        let mut m = mesh();
        m.move_piece(1, Axis::Y, SimScalar::from_int(10), Some(SimScalar::from_int(4)));
        assert!(m.is_moving(1, Axis::Y));
        m.update();
        m.update();
        assert_eq!(m.pieces()[1].axes[1].offset, SimScalar::from_int(8));
        assert!(m.is_moving(1, Axis::Y));
        m.update();
        assert_eq!(m.pieces()[1].axes[1].offset, SimScalar::from_int(10));
        assert!(!m.is_moving(1, Axis::Y));
    }

    #[test]
    fn test_move_without_speed_is_immediate() {
        let mut m = mesh();
        m.move_piece(0, Axis::X, SimScalar::from_int(-3), None);
        assert!(!m.is_moving(0, Axis::X));
        assert_eq!(m.piece_local_offset(0), SimVector::from_ints(-3, 0, 0));
    }

    #[test]
    fn test_turn_takes_shortest_arc() {
        let mut m = mesh();
        m.turn_piece(0, Axis::Y, SimAngle::new(65_000), Some(SimScalar::from_int(300)));
        m.update();
        assert_eq!(m.pieces()[0].axes[1].rotation, SimAngle::from_signed(-300));
        m.update();
        assert_eq!(m.pieces()[0].axes[1].rotation, SimAngle::new(65_000));
        assert!(!m.is_turning(0, Axis::Y));
    }

    #[test]
    fn test_spin_accelerates_then_stops() {
        let mut m = mesh();
        m.spin_piece(0, Axis::Z, SimScalar::from_int(100), SimScalar::from_int(50));
        m.update();
        m.update();
        m.update();
        assert_eq!(m.pieces()[0].axes[2].rotation, SimAngle::new(250));
        assert!(!m.is_turning(0, Axis::Z));
        m.stop_spin_piece(0, Axis::Z, SimScalar::from_int(50));
        assert!(m.is_turning(0, Axis::Z));
        m.update();
        m.update();
        assert!(m.pieces()[0].axes[2].rotate_operation.is_none());
    }
}
