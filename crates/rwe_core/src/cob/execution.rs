//! The instruction interpreter.
//!
//! [`execute`] runs a thread until it needs the host: a piece command, a
//! query, a set-query, a block, a sleep, a new thread, a signal or the end
//! of the thread. The host services the status and calls [`execute`] again.

use crate::constants::TICK_RATE;
use crate::ids::GameTime;
use crate::math::{atan2, SimAngle, SimScalar};
use crate::unit_mesh::Axis;

use super::script::{CobOpCode, CobScript};
use super::thread::{CallFrame, CobThread};
use super::CobError;

/// Instructions a thread may execute before it must reach a host status.
pub const MAX_INSTRUCTIONS_PER_SLICE: usize = 100_000;

/// Unit values readable through `GET` and writable through `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CobValueId {
    /// Unit is switched on.
    Activation,
    /// Standing move orders.
    StandingMoveOrders,
    /// Standing fire orders.
    StandingFireOrders,
    /// Health as a percentage.
    Health,
    /// Ready to build.
    InBuildStance,
    /// Busy flag.
    Busy,
    /// Packed world XZ of a piece.
    PieceXz,
    /// World Y of a piece.
    PieceY,
    /// Packed world XZ of a unit.
    UnitXz,
    /// World Y of a unit.
    UnitY,
    /// Height of a unit's model.
    UnitHeight,
    /// Heading to packed coordinates relative to this unit's facing.
    XzAtan,
    /// Distance to packed coordinates.
    XzHypot,
    /// `atan2` of two script values.
    Atan,
    /// Hypotenuse of two script values.
    Hypot,
    /// Terrain height at packed coordinates.
    GroundHeight,
    /// Percentage of construction left.
    BuildPercentLeft,
    /// Yard is open.
    YardOpen,
    /// Ask nearby units to move away.
    BuggerOff,
    /// Armored flag.
    Armored,
    /// Experience level.
    VeteranLevel,
    /// This unit's id.
    MyId,
    /// Owner of another unit.
    UnitTeam,
    /// Percentage of construction left on another unit.
    UnitBuildPercentLeft,
    /// Another unit is allied.
    UnitAllied,
    /// Anything else.
    Unknown(i32),
}

impl CobValueId {
    /// Decode a value id.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Activation,
            2 => Self::StandingMoveOrders,
            3 => Self::StandingFireOrders,
            4 => Self::Health,
            5 => Self::InBuildStance,
            6 => Self::Busy,
            7 => Self::PieceXz,
            8 => Self::PieceY,
            9 => Self::UnitXz,
            10 => Self::UnitY,
            11 => Self::UnitHeight,
            12 => Self::XzAtan,
            13 => Self::XzHypot,
            14 => Self::Atan,
            15 => Self::Hypot,
            16 => Self::GroundHeight,
            17 => Self::BuildPercentLeft,
            18 => Self::YardOpen,
            19 => Self::BuggerOff,
            20 => Self::Armored,
            32 => Self::VeteranLevel,
            71 => Self::MyId,
            72 => Self::UnitTeam,
            73 => Self::UnitBuildPercentLeft,
            74 => Self::UnitAllied,
            other => Self::Unknown(other),
        }
    }

    /// Encode a value id.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Activation => 1,
            Self::StandingMoveOrders => 2,
            Self::StandingFireOrders => 3,
            Self::Health => 4,
            Self::InBuildStance => 5,
            Self::Busy => 6,
            Self::PieceXz => 7,
            Self::PieceY => 8,
            Self::UnitXz => 9,
            Self::UnitY => 10,
            Self::UnitHeight => 11,
            Self::XzAtan => 12,
            Self::XzHypot => 13,
            Self::Atan => 14,
            Self::Hypot => 15,
            Self::GroundHeight => 16,
            Self::BuildPercentLeft => 17,
            Self::YardOpen => 18,
            Self::BuggerOff => 19,
            Self::Armored => 20,
            Self::VeteranLevel => 32,
            Self::MyId => 71,
            Self::UnitTeam => 72,
            Self::UnitBuildPercentLeft => 73,
            Self::UnitAllied => 74,
            Self::Unknown(code) => code,
        }
    }
}

/// A value the host must compute and push onto the thread's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CobQuery {
    /// Uniform random integer in `[low, high]` from the scene RNG.
    Random {
        /// Inclusive lower bound.
        low: i32,
        /// Inclusive upper bound.
        high: i32,
    },
    /// A unit value with up to four arguments.
    Value {
        /// Which value.
        id: CobValueId,
        /// Arguments, unused ones zero.
        args: [i32; 4],
    },
}

/// Piece animation or effect requested by a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceCommandKind {
    /// Move along an axis; `None` speed means immediately.
    Move {
        /// Axis.
        axis: Axis,
        /// Target offset in world units.
        position: SimScalar,
        /// World units per tick.
        speed: Option<SimScalar>,
    },
    /// Turn about an axis; `None` speed means immediately.
    Turn {
        /// Axis.
        axis: Axis,
        /// Target angle.
        angle: SimAngle,
        /// Angle units per tick.
        speed: Option<SimScalar>,
    },
    /// Spin about an axis.
    Spin {
        /// Axis.
        axis: Axis,
        /// Angle units per tick.
        target_speed: SimScalar,
        /// Change in speed per tick.
        acceleration: SimScalar,
    },
    /// Stop spinning.
    StopSpin {
        /// Axis.
        axis: Axis,
        /// Change in speed per tick.
        deceleration: SimScalar,
    },
    /// Make visible.
    Show,
    /// Make invisible.
    Hide,
    /// Enable or disable shading.
    Shade(bool),
    /// Emit a particle effect from the piece.
    EmitSfx {
        /// Effect type.
        sfx_type: i32,
    },
    /// Blow the piece off.
    Explode {
        /// Explosion flags.
        explode_type: i32,
    },
}

/// A piece command addressed to one piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceCommand {
    /// Piece index in the script's piece list.
    pub piece: usize,
    /// What to do.
    pub kind: PieceCommandKind,
}

/// Why [`execute`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CobStatus {
    /// Apply to the unit mesh, then resume.
    PieceCommand(PieceCommand),
    /// Push the answer, then resume.
    Query(CobQuery),
    /// Apply the value, then resume.
    SetValue {
        /// Which value.
        id: CobValueId,
        /// New value.
        value: i32,
    },
    /// Suspend until the piece axis stops moving.
    WaitForMove {
        /// Piece index.
        piece: usize,
        /// Axis.
        axis: Axis,
    },
    /// Suspend until the piece axis stops turning.
    WaitForTurn {
        /// Piece index.
        piece: usize,
        /// Axis.
        axis: Axis,
    },
    /// Suspend until `wake_time`.
    Sleep {
        /// First tick on which the thread may run again.
        wake_time: GameTime,
    },
    /// Create a new thread, then resume.
    StartScript {
        /// Function index.
        function: usize,
        /// Arguments.
        args: Vec<i32>,
    },
    /// Kill other threads whose mask intersects this signal, then resume.
    Signal(u32),
    /// The thread has returned from its root function.
    Finished,
}

/// Script position to world offset. Script space mirrors the X axis.
#[must_use]
pub fn cob_position_to_world(axis: Axis, value: i32) -> SimScalar {
    let v = SimScalar::from_bits(value);
    if axis == Axis::X {
        -v
    } else {
        v
    }
}

/// World offset to script position.
#[must_use]
pub fn world_position_to_cob(axis: Axis, value: SimScalar) -> i32 {
    let v = if axis == Axis::X { -value } else { value };
    v.to_bits()
}

/// Script angle to world angle. Script space reverses rotation about Z.
#[must_use]
pub fn cob_angle_to_world(axis: Axis, value: i32) -> SimAngle {
    let a = SimAngle::from_signed(value);
    if axis == Axis::Z {
        -a
    } else {
        a
    }
}

/// Script linear speed (per second) to world units per tick.
#[must_use]
pub fn cob_linear_speed(value: i32) -> SimScalar {
    SimScalar::from_bits(value).div_int(TICK_RATE as i32)
}

/// Script angular speed (per second) to angle units per tick.
#[must_use]
pub fn cob_angular_speed(value: i32) -> SimScalar {
    SimScalar::from_int(value).div_int(TICK_RATE as i32)
}

/// Pack a world XZ position into one script integer.
#[must_use]
pub fn pack_xz(x: SimScalar, z: SimScalar) -> i32 {
    let cob_x = (-x).trunc_to_int();
    let cob_z = z.trunc_to_int();
    (cob_x << 16) | (cob_z & 0xffff)
}

/// Unpack script coordinates into world X and Z.
#[must_use]
pub fn unpack_xz(packed: i32) -> (SimScalar, SimScalar) {
    let cob_x = packed >> 16;
    let cob_z = i32::from(packed as i16);
    (SimScalar::from_int(-cob_x), SimScalar::from_int(cob_z))
}

/// Convert a world scalar to the script's 16.16 representation.
#[must_use]
pub fn to_cob_scalar(value: SimScalar) -> i32 {
    value.to_bits()
}

fn ticks_for_millis(millis: i32) -> u32 {
    let ticks = i64::from(millis.max(0)) * i64::from(TICK_RATE) / 1000;
    ticks as u32
}

fn operand(script: &CobScript, pc: usize) -> Result<u32, CobError> {
    script
        .instructions
        .get(pc)
        .copied()
        .ok_or(CobError::ProgramCounterOutOfRange(pc))
}

fn piece_operand(script: &CobScript, value: u32) -> Result<usize, CobError> {
    let piece = value as usize;
    if piece >= script.pieces.len() {
        return Err(CobError::BadPieceIndex(piece));
    }
    Ok(piece)
}

fn axis_operand(value: u32) -> Result<Axis, CobError> {
    Axis::from_index(value).ok_or(CobError::BadAxis(value))
}

fn binary(thread: &mut CobThread, f: impl FnOnce(i32, i32) -> i32) -> Result<(), CobError> {
    let right = thread.pop()?;
    let left = thread.pop()?;
    thread.push(f(left, right));
    Ok(())
}

fn piece_status(piece: usize, kind: PieceCommandKind) -> CobStatus {
    CobStatus::PieceCommand(PieceCommand { piece, kind })
}

/// Run `thread` until it needs the host.
pub fn execute(
    thread: &mut CobThread,
    script: &CobScript,
    statics: &mut [i32],
    game_time: GameTime,
) -> Result<CobStatus, CobError> {
    for _ in 0..MAX_INSTRUCTIONS_PER_SLICE {
        if thread.is_finished() {
            return Ok(CobStatus::Finished);
        }
        let pc = thread.frame()?.pc;
        let opcode = CobOpCode::try_from(operand(script, pc)?)?;
        let operand_count = opcode.operand_count();
        let op1 = if operand_count >= 1 { operand(script, pc + 1)? } else { 0 };
        let op2 = if operand_count >= 2 { operand(script, pc + 2)? } else { 0 };
        thread.frame()?.pc = pc + 1 + operand_count;

        match opcode {
            CobOpCode::Move => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let speed = thread.pop()?;
                let position = thread.pop()?;
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::Move {
                        axis,
                        position: cob_position_to_world(axis, position),
                        speed: Some(cob_linear_speed(speed)),
                    },
                ));
            }
            CobOpCode::MoveNow => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let position = thread.pop()?;
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::Move {
                        axis,
                        position: cob_position_to_world(axis, position),
                        speed: None,
                    },
                ));
            }
            CobOpCode::Turn => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let speed = thread.pop()?;
                let angle = thread.pop()?;
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::Turn {
                        axis,
                        angle: cob_angle_to_world(axis, angle),
                        speed: Some(cob_angular_speed(speed.abs())),
                    },
                ));
            }
            CobOpCode::TurnNow => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let angle = thread.pop()?;
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::Turn {
                        axis,
                        angle: cob_angle_to_world(axis, angle),
                        speed: None,
                    },
                ));
            }
            CobOpCode::Spin => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let target_speed = thread.pop()?;
                let acceleration = thread.pop()?;
                let target_speed = cob_angular_speed(target_speed);
                let target_speed = if axis == Axis::Z { -target_speed } else { target_speed };
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::Spin {
                        axis,
                        target_speed,
                        acceleration: cob_angular_speed(acceleration.abs()),
                    },
                ));
            }
            CobOpCode::StopSpin => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                let deceleration = thread.pop()?;
                return Ok(piece_status(
                    piece,
                    PieceCommandKind::StopSpin {
                        axis,
                        deceleration: cob_angular_speed(deceleration.abs()),
                    },
                ));
            }
            CobOpCode::Show => {
                return Ok(piece_status(piece_operand(script, op1)?, PieceCommandKind::Show));
            }
            CobOpCode::Hide => {
                return Ok(piece_status(piece_operand(script, op1)?, PieceCommandKind::Hide));
            }
            CobOpCode::Shade => {
                return Ok(piece_status(piece_operand(script, op1)?, PieceCommandKind::Shade(true)));
            }
            CobOpCode::DontShade => {
                return Ok(piece_status(piece_operand(script, op1)?, PieceCommandKind::Shade(false)));
            }
            CobOpCode::Cache | CobOpCode::DontCache | CobOpCode::DontShadow => {
                piece_operand(script, op1)?;
            }
            CobOpCode::EmitSfx => {
                let piece = piece_operand(script, op1)?;
                let sfx_type = thread.pop()?;
                return Ok(piece_status(piece, PieceCommandKind::EmitSfx { sfx_type }));
            }
            CobOpCode::Explode => {
                let piece = piece_operand(script, op1)?;
                let explode_type = thread.pop()?;
                return Ok(piece_status(piece, PieceCommandKind::Explode { explode_type }));
            }
            CobOpCode::PlaySound => {
                thread.pop()?;
            }
            CobOpCode::AttachUnit => {
                thread.pop_args(3)?;
            }
            CobOpCode::DropUnit => {
                thread.pop()?;
            }
            CobOpCode::WaitForTurn => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                return Ok(CobStatus::WaitForTurn { piece, axis });
            }
            CobOpCode::WaitForMove => {
                let piece = piece_operand(script, op1)?;
                let axis = axis_operand(op2)?;
                return Ok(CobStatus::WaitForMove { piece, axis });
            }
            CobOpCode::Sleep => {
                let millis = thread.pop()?;
                return Ok(CobStatus::Sleep {
                    wake_time: game_time.plus(ticks_for_millis(millis)),
                });
            }
            CobOpCode::PushConstant => thread.push(op1 as i32),
            CobOpCode::PushLocalVar => {
                let value = thread.local(op1 as usize)?;
                thread.push(value);
            }
            CobOpCode::PopLocalVar => {
                let value = thread.pop()?;
                thread.set_local(op1 as usize, value)?;
            }
            CobOpCode::PushStatic => {
                let value = *statics
                    .get(op1 as usize)
                    .ok_or(CobError::BadStaticIndex(op1 as usize))?;
                thread.push(value);
            }
            CobOpCode::PopStatic => {
                let value = thread.pop()?;
                let slot = statics
                    .get_mut(op1 as usize)
                    .ok_or(CobError::BadStaticIndex(op1 as usize))?;
                *slot = value;
            }
            CobOpCode::CreateLocalVar => thread.create_local()?,
            CobOpCode::PopStack => {
                thread.pop()?;
            }
            CobOpCode::Add => binary(thread, i32::wrapping_add)?,
            CobOpCode::Sub => binary(thread, i32::wrapping_sub)?,
            CobOpCode::Mul => binary(thread, i32::wrapping_mul)?,
            CobOpCode::Div => {
                let right = thread.pop()?;
                let left = thread.pop()?;
                if right == 0 {
                    return Err(CobError::DivisionByZero);
                }
                thread.push(left.wrapping_div(right));
            }
            CobOpCode::BitwiseAnd => binary(thread, |a, b| a & b)?,
            CobOpCode::BitwiseOr => binary(thread, |a, b| a | b)?,
            CobOpCode::BitwiseXor => binary(thread, |a, b| a ^ b)?,
            CobOpCode::BitwiseNot => {
                let value = thread.pop()?;
                thread.push(!value);
            }
            CobOpCode::SetLess => binary(thread, |a, b| i32::from(a < b))?,
            CobOpCode::SetLessOrEqual => binary(thread, |a, b| i32::from(a <= b))?,
            CobOpCode::SetGreater => binary(thread, |a, b| i32::from(a > b))?,
            CobOpCode::SetGreaterOrEqual => binary(thread, |a, b| i32::from(a >= b))?,
            CobOpCode::SetEqual => binary(thread, |a, b| i32::from(a == b))?,
            CobOpCode::SetNotEqual => binary(thread, |a, b| i32::from(a != b))?,
            CobOpCode::LogicalAnd => binary(thread, |a, b| i32::from(a != 0 && b != 0))?,
            CobOpCode::LogicalOr => binary(thread, |a, b| i32::from(a != 0 || b != 0))?,
            CobOpCode::LogicalXor => binary(thread, |a, b| i32::from((a != 0) != (b != 0)))?,
            CobOpCode::LogicalNot => {
                let value = thread.pop()?;
                thread.push(i32::from(value == 0));
            }
            CobOpCode::Rand => {
                let high = thread.pop()?;
                let low = thread.pop()?;
                return Ok(CobStatus::Query(CobQuery::Random { low, high }));
            }
            CobOpCode::GetUnitValue => {
                let id = CobValueId::from_code(thread.pop()?);
                return Ok(CobStatus::Query(CobQuery::Value { id, args: [0; 4] }));
            }
            CobOpCode::Get => {
                let args = thread.pop_args(4)?;
                let id = CobValueId::from_code(thread.pop()?);
                let args = [args[0], args[1], args[2], args[3]];
                match id {
                    CobValueId::Atan => {
                        let angle = atan2(
                            SimScalar::from_bits(args[0]),
                            SimScalar::from_bits(args[1]),
                        );
                        thread.push(i32::from(angle.signed()));
                    }
                    CobValueId::Hypot => {
                        let a = SimScalar::from_bits(args[0]);
                        let b = SimScalar::from_bits(args[1]);
                        thread.push(to_cob_scalar((a.squared() + b.squared()).sqrt().saturate()));
                    }
                    _ => return Ok(CobStatus::Query(CobQuery::Value { id, args })),
                }
            }
            CobOpCode::Set => {
                let value = thread.pop()?;
                let id = CobValueId::from_code(thread.pop()?);
                return Ok(CobStatus::SetValue { id, value });
            }
            CobOpCode::StartScript => {
                let function = op1 as usize;
                if function >= script.functions.len() {
                    return Err(CobError::BadFunctionIndex(function));
                }
                let args = thread.pop_args(op2 as usize)?;
                return Ok(CobStatus::StartScript { function, args });
            }
            CobOpCode::CallScript => {
                let function = op1 as usize;
                let address = script
                    .functions
                    .get(function)
                    .ok_or(CobError::BadFunctionIndex(function))?
                    .address as usize;
                let args = thread.pop_args(op2 as usize)?;
                thread.push_frame(CallFrame::new(function, address, args));
            }
            CobOpCode::Return => {
                let value = thread.pop().unwrap_or(0);
                if let Some(frame) = thread.pop_frame() {
                    if thread.is_finished() {
                        thread.return_value = value;
                        thread.return_locals = frame.locals;
                        return Ok(CobStatus::Finished);
                    }
                }
            }
            CobOpCode::Jump => thread.frame()?.pc = op1 as usize,
            CobOpCode::JumpNotEqual => {
                if thread.pop()? == 0 {
                    thread.frame()?.pc = op1 as usize;
                }
            }
            CobOpCode::Signal => {
                let signal = thread.pop()?;
                return Ok(CobStatus::Signal(signal as u32));
            }
            CobOpCode::SetSignalMask => {
                thread.signal_mask = thread.pop()? as u32;
            }
        }
    }
    Err(CobError::InstructionLimit)
}
