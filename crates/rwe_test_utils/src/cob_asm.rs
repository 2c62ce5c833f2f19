//! A tiny assembler for unit scripts.
//!
//! Tests need scripts with a handful of functions; writing instruction
//! words by hand is error prone once jumps and calls are involved. The
//! builder resolves function names and labels when the script is built.
//!
//! ```ignore
//! let script = ScriptBuilder::new()
//!     .piece("base")
//!     .statics(1)
//!     .function("Create", |f| {
//!         f.sleep(100);
//!         f.set_static(0, 7);
//!         f.return_value(0);
//!     })
//!     .build();
//! ```

use rwe_core::cob::{CobFunction, CobOpCode, CobScript};

/// A forward jump waiting for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch(usize);

/// Builds a [`CobScript`] function by function.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    instructions: Vec<u32>,
    functions: Vec<CobFunction>,
    pieces: Vec<String>,
    statics: u32,
    calls: Vec<(usize, String)>,
}

impl ScriptBuilder {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a piece name. Pieces are indexed in declaration order.
    #[must_use]
    pub fn piece(mut self, name: &str) -> Self {
        self.pieces.push(name.to_string());
        self
    }

    /// Number of static variables.
    #[must_use]
    pub fn statics(mut self, count: u32) -> Self {
        self.statics = count;
        self
    }

    /// Append a function whose body is emitted by `body`.
    #[must_use]
    pub fn function(mut self, name: &str, body: impl FnOnce(&mut FunctionBuilder<'_>)) -> Self {
        let address = self.instructions.len() as u32;
        self.functions.push(CobFunction {
            name: name.to_string(),
            address,
        });
        let mut function = FunctionBuilder { script: &mut self };
        body(&mut function);
        self
    }

    /// A function that immediately returns `value`.
    #[must_use]
    pub fn returning(self, name: &str, value: i32) -> Self {
        self.function(name, |f| f.return_value(value))
    }

    /// A function that stores `piece` into its first argument, the shape of
    /// the `Query*` entry points.
    #[must_use]
    pub fn query_piece(self, name: &str, piece: i32) -> Self {
        self.function(name, |f| {
            f.push(piece);
            f.op1(CobOpCode::PopLocalVar, 0);
            f.return_value(0);
        })
    }

    /// Resolve calls and produce the script.
    ///
    /// # Panics
    ///
    /// Panics if a call names a function that was never declared, or if
    /// the assembled script fails validation. Both are bugs in the test.
    #[must_use]
    pub fn build(mut self) -> CobScript {
        for (at, name) in std::mem::take(&mut self.calls) {
            let index = self
                .functions
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(&name))
                .unwrap_or_else(|| panic!("call to undeclared script function {name}"));
            self.instructions[at] = index as u32;
        }
        let script = CobScript {
            instructions: self.instructions,
            functions: self.functions,
            pieces: self.pieces,
            static_variable_count: self.statics,
        };
        if let Err(error) = script.validate() {
            panic!("assembled script is invalid: {error}");
        }
        script
    }
}

/// Emits the body of one function.
#[derive(Debug)]
pub struct FunctionBuilder<'a> {
    script: &'a mut ScriptBuilder,
}

impl FunctionBuilder<'_> {
    /// Address of the next instruction.
    #[must_use]
    pub fn here(&self) -> u32 {
        self.script.instructions.len() as u32
    }

    /// Emit an opcode with no inline operands.
    pub fn op(&mut self, code: CobOpCode) {
        self.script.instructions.push(code.code());
    }

    /// Emit an opcode with one inline operand.
    pub fn op1(&mut self, code: CobOpCode, a: u32) {
        self.script.instructions.extend([code.code(), a]);
    }

    /// Emit an opcode with two inline operands.
    pub fn op2(&mut self, code: CobOpCode, a: u32, b: u32) {
        self.script.instructions.extend([code.code(), a, b]);
    }

    /// Push a constant.
    pub fn push(&mut self, value: i32) {
        self.op1(CobOpCode::PushConstant, value as u32);
    }

    /// Sleep for `millis` milliseconds.
    pub fn sleep(&mut self, millis: i32) {
        self.push(millis);
        self.op(CobOpCode::Sleep);
    }

    /// Store a constant in a static variable.
    pub fn set_static(&mut self, index: u32, value: i32) {
        self.push(value);
        self.op1(CobOpCode::PopStatic, index);
    }

    /// Add a constant to a static variable.
    pub fn add_static(&mut self, index: u32, value: i32) {
        self.op1(CobOpCode::PushStatic, index);
        self.push(value);
        self.op(CobOpCode::Add);
        self.op1(CobOpCode::PopStatic, index);
    }

    /// Call `name` synchronously with `arg_count` arguments already pushed.
    pub fn call(&mut self, name: &str, arg_count: u32) {
        self.op2(CobOpCode::CallScript, 0, arg_count);
        let at = self.script.instructions.len() - 2;
        self.script.calls.push((at, name.to_string()));
    }

    /// Start `name` as a new thread with `arg_count` arguments already
    /// pushed.
    pub fn start(&mut self, name: &str, arg_count: u32) {
        self.op2(CobOpCode::StartScript, 0, arg_count);
        let at = self.script.instructions.len() - 2;
        self.script.calls.push((at, name.to_string()));
    }

    /// Unconditional jump to an address already emitted.
    pub fn jump(&mut self, target: u32) {
        self.op1(CobOpCode::Jump, target);
    }

    /// Jump whose target is set later with [`FunctionBuilder::patch`].
    pub fn jump_forward(&mut self) -> Patch {
        self.op1(CobOpCode::Jump, 0);
        Patch(self.script.instructions.len() - 1)
    }

    /// Pop a value and jump forward if it is zero.
    pub fn jump_if_zero_forward(&mut self) -> Patch {
        self.op1(CobOpCode::JumpNotEqual, 0);
        Patch(self.script.instructions.len() - 1)
    }

    /// Point a forward jump at the next instruction.
    pub fn patch(&mut self, patch: Patch) {
        let here = self.here();
        self.script.instructions[patch.0] = here;
    }

    /// Return a constant.
    pub fn return_value(&mut self, value: i32) {
        self.push(value);
        self.op(CobOpCode::Return);
    }
}
