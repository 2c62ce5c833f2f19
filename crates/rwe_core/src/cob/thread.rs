//! Script threads: an operand stack plus a call stack of activation records.

use super::CobError;

/// One activation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Index of the function being executed.
    pub function: usize,
    /// Index of the next instruction word.
    pub pc: usize,
    /// Local variables, parameters first.
    pub locals: Vec<i32>,
    /// Number of leading locals that were passed as arguments.
    pub param_count: usize,
    /// Number of `CREATE-LOCAL-VAR` instructions seen so far in this frame.
    pub declared: usize,
}

impl CallFrame {
    /// Fresh frame at the start of `function`.
    #[must_use]
    pub fn new(function: usize, address: usize, args: Vec<i32>) -> Self {
        Self {
            function,
            pc: address,
            param_count: args.len(),
            locals: args,
            declared: 0,
        }
    }
}

/// A cooperative script thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CobThread {
    /// Name of the function the thread started in.
    pub name: String,
    /// Signal mask; a signal whose bits intersect it kills the thread.
    pub signal_mask: u32,
    stack: Vec<i32>,
    call_stack: Vec<CallFrame>,
    /// Value of the final `RETURN`.
    pub return_value: i32,
    /// Locals of the root frame at the final `RETURN`.
    pub return_locals: Vec<i32>,
}

impl CobThread {
    /// Thread about to execute `function` with `args`.
    #[must_use]
    pub fn new(name: &str, function: usize, address: usize, args: Vec<i32>, signal_mask: u32) -> Self {
        Self {
            name: name.to_string(),
            signal_mask,
            stack: Vec::new(),
            call_stack: vec![CallFrame::new(function, address, args)],
            return_value: 0,
            return_locals: Vec::new(),
        }
    }

    /// Push onto the operand stack.
    pub fn push(&mut self, value: i32) {
        self.stack.push(value);
    }

    /// Pop from the operand stack.
    pub fn pop(&mut self) -> Result<i32, CobError> {
        self.stack.pop().ok_or(CobError::StackUnderflow)
    }

    /// Pop `count` values, returned in push order.
    pub fn pop_args(&mut self, count: usize) -> Result<Vec<i32>, CobError> {
        if self.stack.len() < count {
            return Err(CobError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Operand stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Current activation record.
    pub fn frame(&mut self) -> Result<&mut CallFrame, CobError> {
        self.call_stack.last_mut().ok_or(CobError::StackUnderflow)
    }

    /// Call depth.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Enter a called function.
    pub fn push_frame(&mut self, frame: CallFrame) {
        self.call_stack.push(frame);
    }

    /// Leave the current function.
    pub fn pop_frame(&mut self) -> Option<CallFrame> {
        self.call_stack.pop()
    }

    /// True once the root frame has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.call_stack.is_empty()
    }

    /// Read a local of the current frame.
    pub fn local(&mut self, index: usize) -> Result<i32, CobError> {
        self.frame()?
            .locals
            .get(index)
            .copied()
            .ok_or(CobError::BadLocalIndex(index))
    }

    /// Write a local of the current frame.
    pub fn set_local(&mut self, index: usize, value: i32) -> Result<(), CobError> {
        let slot = self
            .frame()?
            .locals
            .get_mut(index)
            .ok_or(CobError::BadLocalIndex(index))?;
        *slot = value;
        Ok(())
    }

    /// Declare a local. The first declarations of a frame name its
    /// parameters, which already exist; later ones append a zero.
    pub fn create_local(&mut self) -> Result<(), CobError> {
        let frame = self.frame()?;
        if frame.declared >= frame.param_count {
            frame.locals.push(0);
        }
        frame.declared += 1;
        Ok(())
    }
}
