//! Parsed unit scripts and the instruction set.

use serde::{Deserialize, Serialize};

use super::CobError;

/// A named entry point into a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CobFunction {
    /// Function name, e.g. `Create` or `AimPrimary`.
    pub name: String,
    /// Index of the first instruction.
    pub address: u32,
}

/// A unit script as delivered by the asset layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CobScript {
    /// Instruction words. Opcodes are followed by their inline operands.
    pub instructions: Vec<u32>,
    /// Entry points.
    pub functions: Vec<CobFunction>,
    /// Piece names, indexed by the piece operands of piece instructions.
    pub pieces: Vec<String>,
    /// Number of static variables shared by all threads of a unit.
    pub static_variable_count: u32,
}

impl CobScript {
    /// Index of a function by name, case-insensitive.
    #[must_use]
    pub fn find_function(&self, name: &str) -> Option<usize> {
        self.functions
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Walk every function's instructions and check opcodes, operand indices
    /// and jump targets.
    pub fn validate(&self) -> Result<(), CobError> {
        for function in &self.functions {
            let start = function.address as usize;
            if start >= self.instructions.len() {
                return Err(CobError::ProgramCounterOutOfRange(start));
            }
        }
        let mut pc = 0;
        while pc < self.instructions.len() {
            let opcode = CobOpCode::try_from(self.instructions[pc])?;
            let operands = opcode.operand_count();
            if pc + operands >= self.instructions.len() && operands > 0 {
                return Err(CobError::ProgramCounterOutOfRange(pc + operands));
            }
            match opcode {
                CobOpCode::Jump | CobOpCode::JumpNotEqual => {
                    let target = self.instructions[pc + 1] as usize;
                    if target >= self.instructions.len() {
                        return Err(CobError::ProgramCounterOutOfRange(target));
                    }
                }
                CobOpCode::CallScript | CobOpCode::StartScript => {
                    let function = self.instructions[pc + 1] as usize;
                    if function >= self.functions.len() {
                        return Err(CobError::BadFunctionIndex(function));
                    }
                }
                CobOpCode::PushStatic | CobOpCode::PopStatic => {
                    let index = self.instructions[pc + 1] as usize;
                    if index >= self.static_variable_count as usize {
                        return Err(CobError::BadStaticIndex(index));
                    }
                }
                _ if opcode.has_piece_operand() => {
                    let piece = self.instructions[pc + 1] as usize;
                    if piece >= self.pieces.len() {
                        return Err(CobError::BadPieceIndex(piece));
                    }
                }
                _ => {}
            }
            pc += 1 + operands;
        }
        Ok(())
    }
}

macro_rules! opcodes {
    ($($name:ident = $value:literal, $operands:literal;)*) => {
        /// Script instruction opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(missing_docs)]
        pub enum CobOpCode {
            $($name,)*
        }

        impl CobOpCode {
            /// Instruction word for this opcode.
            #[must_use]
            pub const fn code(self) -> u32 {
                match self {
                    $(Self::$name => $value,)*
                }
            }

            /// Number of inline operand words following the opcode.
            #[must_use]
            pub const fn operand_count(self) -> usize {
                match self {
                    $(Self::$name => $operands,)*
                }
            }
        }

        impl TryFrom<u32> for CobOpCode {
            type Error = CobError;

            fn try_from(value: u32) -> Result<Self, CobError> {
                match value {
                    $($value => Ok(Self::$name),)*
                    other => Err(CobError::UnknownOpcode(other)),
                }
            }
        }
    };
}

opcodes! {
    Move = 0x1000_1000, 2;
    Turn = 0x1000_2000, 2;
    Spin = 0x1000_3000, 2;
    StopSpin = 0x1000_4000, 2;
    Show = 0x1000_5000, 1;
    Hide = 0x1000_6000, 1;
    Cache = 0x1000_7000, 1;
    DontCache = 0x1000_8000, 1;
    MoveNow = 0x1000_B000, 2;
    TurnNow = 0x1000_C000, 2;
    Shade = 0x1000_D000, 1;
    DontShade = 0x1000_E000, 1;
    EmitSfx = 0x1000_F000, 1;
    DontShadow = 0x1001_0000, 1;
    WaitForTurn = 0x1001_1000, 2;
    WaitForMove = 0x1001_2000, 2;
    Sleep = 0x1001_3000, 0;
    PushConstant = 0x1002_1001, 1;
    PushLocalVar = 0x1002_1002, 1;
    PushStatic = 0x1002_1004, 1;
    CreateLocalVar = 0x1002_2000, 0;
    PopLocalVar = 0x1002_3002, 1;
    PopStatic = 0x1002_3004, 1;
    PopStack = 0x1002_4000, 0;
    Add = 0x1003_1000, 0;
    Sub = 0x1003_2000, 0;
    Mul = 0x1003_3000, 0;
    Div = 0x1003_4000, 0;
    BitwiseAnd = 0x1003_5000, 0;
    BitwiseOr = 0x1003_6000, 0;
    BitwiseXor = 0x1003_7000, 0;
    BitwiseNot = 0x1003_8000, 0;
    Rand = 0x1004_1000, 0;
    GetUnitValue = 0x1004_2000, 0;
    Get = 0x1004_3000, 0;
    SetLess = 0x1005_1000, 0;
    SetLessOrEqual = 0x1005_2000, 0;
    SetGreater = 0x1005_3000, 0;
    SetGreaterOrEqual = 0x1005_4000, 0;
    SetEqual = 0x1005_5000, 0;
    SetNotEqual = 0x1005_6000, 0;
    LogicalAnd = 0x1005_7000, 0;
    LogicalOr = 0x1005_8000, 0;
    LogicalXor = 0x1005_9000, 0;
    LogicalNot = 0x1005_A000, 0;
    StartScript = 0x1006_1000, 2;
    CallScript = 0x1006_2000, 2;
    Jump = 0x1006_4000, 1;
    Return = 0x1006_5000, 0;
    JumpNotEqual = 0x1006_6000, 1;
    Signal = 0x1006_7000, 0;
    SetSignalMask = 0x1006_8000, 0;
    Explode = 0x1007_1000, 1;
    PlaySound = 0x1007_2000, 1;
    Set = 0x1008_2000, 0;
    AttachUnit = 0x1008_3000, 0;
    DropUnit = 0x1008_4000, 0;
}

impl CobOpCode {
    /// True if the first operand is a piece index.
    #[must_use]
    pub const fn has_piece_operand(self) -> bool {
        matches!(
            self,
            Self::Move
                | Self::Turn
                | Self::Spin
                | Self::StopSpin
                | Self::Show
                | Self::Hide
                | Self::Cache
                | Self::DontCache
                | Self::MoveNow
                | Self::TurnNow
                | Self::Shade
                | Self::DontShade
                | Self::EmitSfx
                | Self::DontShadow
                | Self::WaitForTurn
                | Self::WaitForMove
                | Self::Explode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(instructions: Vec<u32>) -> CobScript {
        CobScript {
            instructions,
            functions: vec![CobFunction {
                name: "Create".to_string(),
                address: 0,
            }],
            pieces: vec!["base".to_string()],
            static_variable_count: 1,
        }
    }

    #[test]
    fn test_opcode_round_trip_through_words() {
        for op in [CobOpCode::Move, CobOpCode::Sleep, CobOpCode::DropUnit] {
            assert_eq!(CobOpCode::try_from(op.code()).ok(), Some(op));
        }
        assert!(matches!(
            CobOpCode::try_from(0xdead_beef),
            Err(CobError::UnknownOpcode(0xdead_beef))
        ));
    }

    #[test]
    fn test_validate_accepts_well_formed_script() {
        let s = script(vec![
            CobOpCode::PushConstant.code(),
            5,
            CobOpCode::PopStatic.code(),
            0,
            CobOpCode::Show.code(),
            0,
            CobOpCode::Return.code(),
        ]);
        assert!(s.validate().is_ok());
        assert_eq!(s.find_function("create"), Some(0));
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let bad_static = script(vec![CobOpCode::PopStatic.code(), 3]);
        assert!(matches!(bad_static.validate(), Err(CobError::BadStaticIndex(3))));

        let bad_piece = script(vec![CobOpCode::Hide.code(), 2]);
        assert!(matches!(bad_piece.validate(), Err(CobError::BadPieceIndex(2))));

        let bad_jump = script(vec![CobOpCode::Jump.code(), 99]);
        assert!(matches!(
            bad_jump.validate(),
            Err(CobError::ProgramCounterOutOfRange(99))
        ));
    }
}
