//! Unit scripting virtual machine.
//!
//! Every unit owns a [`CobEnvironment`]: its script, static variables and a
//! pool of cooperative threads. Threads run until they hit an instruction
//! that needs the host (see [`CobStatus`]), and the host is passed into each
//! scheduling pass through the [`CobHost`] trait rather than stored.

mod environment;
mod execution;
mod script;
mod thread;

use thiserror::Error;

pub use environment::{CobEnvironment, CobHost, ThreadId, ThreadStatus};
pub use execution::{
    cob_angle_to_world, cob_angular_speed, cob_linear_speed, cob_position_to_world, execute,
    pack_xz, to_cob_scalar, unpack_xz, world_position_to_cob, CobQuery, CobStatus, CobValueId,
    PieceCommand, PieceCommandKind, MAX_INSTRUCTIONS_PER_SLICE,
};
pub use script::{CobFunction, CobOpCode, CobScript};
pub use thread::{CallFrame, CobThread};

/// Script runtime and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CobError {
    /// Instruction word is not a known opcode.
    #[error("unknown opcode {0:#010x}")]
    UnknownOpcode(u32),

    /// Pop from an empty operand stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// Local variable index outside the current frame.
    #[error("bad local variable index {0}")]
    BadLocalIndex(usize),

    /// Static variable index outside the script's statics.
    #[error("bad static variable index {0}")]
    BadStaticIndex(usize),

    /// Function index outside the function table.
    #[error("bad function index {0}")]
    BadFunctionIndex(usize),

    /// Piece index outside the piece table.
    #[error("bad piece index {0}")]
    BadPieceIndex(usize),

    /// Axis operand other than 0, 1 or 2.
    #[error("bad axis {0}")]
    BadAxis(u32),

    /// Program counter left the instruction array.
    #[error("program counter {0} out of range")]
    ProgramCounterOutOfRange(usize),

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Thread ran too long without yielding to the host.
    #[error("instruction limit exceeded")]
    InstructionLimit,
}
