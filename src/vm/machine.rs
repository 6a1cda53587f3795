//! Stack machine for loaded bytecode.
//!
//! - One operand stack shared by all frames; each frame owns the region
//!   above its `stack_base`.
//! - Locals are a flat slot array per frame, parameters first.
//! - Mnemonics are decoded once in `Vm::new`; an unknown mnemonic only
//!   fails when it is reached.

use tracing::trace;

use crate::runtime::{Runtime, RuntimeError, Value};

use super::bytecode::{Instruction, VmProgram};
use super::opcodes::Opcode;
use super::VmError;

pub const MAX_STACK: usize = 1024;
pub const MAX_FRAMES: usize = 256;

/// State visible to an adapter before each instruction executes.
pub struct VmStep<'a> {
    pub function: &'a str,
    pub pc: usize,
    pub op: Opcode,
    /// Operand stack of the current frame, bottom first.
    pub stack: &'a [Value],
    pub locals: &'a [Value],
    /// Function names of the active frames, outermost first.
    pub frames: &'a [String],
}

/// Everything the VM needs from its embedder.
pub trait ExecutionAdapter {
    /// Handle `CALL_SYS`. Permission and argument checks happen here.
    fn call_capability(&mut self, target: &str, args: Vec<Value>) -> Result<Value, RuntimeError>;

    /// Whether `on_step` wants to be called. Building a step view is not
    /// free, so the VM asks first.
    fn wants_steps(&self) -> bool {
        false
    }

    fn on_step(&mut self, _step: &VmStep<'_>) {}
}

/// Routes `CALL_SYS` through a `Runtime`, so the VM sees the same
/// capability table, permissions and recorder as the interpreter.
pub struct RuntimeAdapter<'r> {
    runtime: &'r mut Runtime,
}

impl<'r> RuntimeAdapter<'r> {
    pub fn new(runtime: &'r mut Runtime) -> Self {
        Self { runtime }
    }
}

impl ExecutionAdapter for RuntimeAdapter<'_> {
    fn call_capability(&mut self, target: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.runtime.call_capability(target, args)
    }

    fn wants_steps(&self) -> bool {
        self.runtime.recorder.is_some()
    }

    fn on_step(&mut self, step: &VmStep<'_>) {
        let runtime = &mut *self.runtime;
        if let Some(recorder) = runtime.recorder.as_mut() {
            recorder.record_vm_step(step, &runtime.env);
        }
    }
}

struct Frame {
    function: usize,
    pc: usize,
    locals: Vec<Value>,
    stack_base: usize,
}

pub struct Vm<'p> {
    program: &'p VmProgram,
    decoded: Vec<Vec<Option<Opcode>>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p VmProgram) -> Self {
        let decoded = program
            .functions
            .iter()
            .map(|f| {
                f.instructions
                    .iter()
                    .map(|inst| Opcode::from_mnemonic(&inst.op))
                    .collect()
            })
            .collect();
        Self {
            program,
            decoded,
            stack: Vec::with_capacity(64),
            frames: Vec::with_capacity(16),
        }
    }

    /// Run `entry` with `args` to completion.
    pub fn run<A: ExecutionAdapter>(
        &mut self,
        entry: &str,
        args: Vec<Value>,
        adapter: &mut A,
    ) -> Result<Value, RuntimeError> {
        let program = self.program;
        let Some(index) = program.function_index(entry) else {
            return Err(VmError::InvalidProgram {
                message: format!("Unknown entry function '{}'.", entry),
                function: entry.to_string(),
            }
            .into());
        };
        let expected = program.functions[index].params.len();
        if args.len() != expected {
            return Err(VmError::InvalidProgram {
                message: format!(
                    "Entry '{}' expects {} arguments, got {}.",
                    entry,
                    expected,
                    args.len()
                ),
                function: entry.to_string(),
            }
            .into());
        }

        self.stack.clear();
        self.frames.clear();
        self.push_frame(index, args)?;
        self.execute(adapter)
    }

    fn execute<A: ExecutionAdapter>(&mut self, adapter: &mut A) -> Result<Value, RuntimeError> {
        let program = self.program;
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Value::Void);
            };
            let function = &program.functions[frame.function];
            let pc = frame.pc;

            // Falling off the end is an implicit `return void`.
            if pc >= function.instructions.len() {
                self.truncate_frame_stack();
                match self.return_value(Value::Void)? {
                    Some(result) => return Ok(result),
                    None => continue,
                }
            }
            frame.pc += 1;

            let inst = &function.instructions[pc];
            let Some(op) = self.decoded[frame.function][pc] else {
                return Err(VmError::InvalidOpcode {
                    op: inst.op.clone(),
                    function: function.name.clone(),
                    pc,
                }
                .into());
            };

            if adapter.wants_steps() {
                self.report_step(adapter, pc, op);
            }
            trace!(function = %function.name, pc, op = %op, "vm step");

            if let Some(result) = self.dispatch(op, inst, &function.name, adapter)? {
                return Ok(result);
            }
        }
    }

    /// Execute one instruction. `Some` means the program finished.
    fn dispatch<A: ExecutionAdapter>(
        &mut self,
        op: Opcode,
        inst: &Instruction,
        function: &str,
        adapter: &mut A,
    ) -> Result<Option<Value>, RuntimeError> {
        let program = self.program;
        match op {
            Opcode::Nop => {}
            Opcode::Const => {
                let value = usize::try_from(inst.a)
                    .ok()
                    .and_then(|i| program.constants.get(i))
                    .cloned()
                    .ok_or_else(|| VmError::InvalidProgram {
                        message: format!("Constant index {} out of range.", inst.a),
                        function: function.to_string(),
                    })?;
                self.push(value, function)?;
            }
            Opcode::PushInt => self.push(Value::Int(inst.a), function)?,
            Opcode::PushBool => self.push(Value::Bool(inst.a != 0), function)?,
            Opcode::PushVoid => self.push(Value::Void, function)?,
            Opcode::Pop => {
                self.pop(function)?;
            }
            Opcode::Dup => {
                let top = self.peek(function)?.clone();
                self.push(top, function)?;
            }
            Opcode::LoadLocal => {
                let slot = self.slot(inst.a, function)?;
                let value = self.current_frame().locals[slot].clone();
                self.push(value, function)?;
            }
            Opcode::StoreLocal => {
                let slot = self.slot(inst.a, function)?;
                let value = self.pop(function)?;
                self.current_frame_mut().locals[slot] = value;
            }

            Opcode::Jump => self.jump(inst.a, function)?,
            Opcode::JumpIfFalse => match self.pop(function)? {
                Value::Bool(false) => self.jump(inst.a, function)?,
                Value::Bool(true) => {}
                other => {
                    return Err(VmError::TypeMismatch {
                        message: format!("JUMP_IF_FALSE expects bool, got {}", other.kind().name()),
                        function: function.to_string(),
                    }
                    .into())
                }
            },
            Opcode::JumpIfErr => {
                if self.peek(function)?.is_err() {
                    self.jump(inst.a, function)?;
                }
            }

            Opcode::Call => {
                let args = self.pop_args(inst.a, function)?;
                let Some(index) = program.function_index(&inst.s) else {
                    return Err(VmError::InvalidProgram {
                        message: format!("Unknown function '{}'.", inst.s),
                        function: function.to_string(),
                    }
                    .into());
                };
                if args.len() != program.functions[index].params.len() {
                    self.push(Value::Unknown, function)?;
                } else {
                    self.push_frame(index, args)?;
                }
            }
            Opcode::CallSys => {
                let args = self.pop_args(inst.a, function)?;
                let result = adapter.call_capability(&inst.s, args)?;
                self.push(result, function)?;
            }
            Opcode::Return => {
                let value = self.pop_or_void();
                self.truncate_frame_stack();
                return self.return_value(value);
            }
            Opcode::Halt => return Ok(Some(self.pop_or_void())),

            operator => {
                let Some(shared) = operator.operator() else {
                    return Err(VmError::InvalidOpcode {
                        op: inst.op.clone(),
                        function: function.to_string(),
                        pc: self.current_frame().pc.saturating_sub(1),
                    }
                    .into());
                };
                let args = self.pop_n(shared.arity(), function)?;
                self.push(shared.apply(&args), function)?;
            }
        }
        Ok(None)
    }

    // ── Frames ──────────────────────────────────────────────────────────

    fn push_frame(&mut self, function: usize, args: Vec<Value>) -> Result<(), VmError> {
        let callee = &self.program.functions[function];
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::FrameOverflow {
                function: callee.name.clone(),
            });
        }
        let mut locals = args;
        locals.resize(callee.slot_count(), Value::Void);
        self.frames.push(Frame {
            function,
            pc: 0,
            locals,
            stack_base: self.stack.len(),
        });
        Ok(())
    }

    /// Pop the current frame. Returns the result when it was the last one,
    /// otherwise pushes `value` for the caller.
    fn return_value(&mut self, value: Value) -> Result<Option<Value>, RuntimeError> {
        self.frames.pop();
        let Some(caller) = self.frames.last() else {
            return Ok(Some(value));
        };
        let name = self.program.functions[caller.function].name.clone();
        self.push(value, &name)?;
        Ok(None)
    }

    fn truncate_frame_stack(&mut self) {
        if let Some(frame) = self.frames.last() {
            self.stack.truncate(frame.stack_base);
        }
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.stack_base)
    }

    fn slot(&self, index: i32, function: &str) -> Result<usize, VmError> {
        usize::try_from(index)
            .ok()
            .filter(|slot| *slot < self.current_frame().locals.len())
            .ok_or_else(|| VmError::LocalOutOfRange {
                index,
                function: function.to_string(),
            })
    }

    fn jump(&mut self, target: i32, function: &str) -> Result<(), VmError> {
        let len = self.program.functions[self.current_frame().function]
            .instructions
            .len();
        match usize::try_from(target) {
            Ok(pc) if pc <= len => {
                self.current_frame_mut().pc = pc;
                Ok(())
            }
            _ => Err(VmError::InvalidProgram {
                message: format!("Jump target {} out of range.", target),
                function: function.to_string(),
            }),
        }
    }

    // ── Operand stack ───────────────────────────────────────────────────

    fn push(&mut self, value: Value, function: &str) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK {
            return Err(VmError::StackOverflow {
                function: function.to_string(),
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, function: &str) -> Result<Value, VmError> {
        if self.stack.len() <= self.frame_base() {
            return Err(VmError::StackUnderflow {
                function: function.to_string(),
            });
        }
        self.stack.pop().ok_or_else(|| VmError::StackUnderflow {
            function: function.to_string(),
        })
    }

    fn peek(&self, function: &str) -> Result<&Value, VmError> {
        if self.stack.len() <= self.frame_base() {
            return Err(VmError::StackUnderflow {
                function: function.to_string(),
            });
        }
        self.stack.last().ok_or_else(|| VmError::StackUnderflow {
            function: function.to_string(),
        })
    }

    fn pop_or_void(&mut self) -> Value {
        if self.stack.len() > self.frame_base() {
            self.stack.pop().unwrap_or(Value::Void)
        } else {
            Value::Void
        }
    }

    /// Pop `count` values, returned in push order.
    fn pop_n(&mut self, count: usize, function: &str) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < self.frame_base() + count {
            return Err(VmError::StackUnderflow {
                function: function.to_string(),
            });
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    fn pop_args(&mut self, argc: i32, function: &str) -> Result<Vec<Value>, VmError> {
        let count = usize::try_from(argc).map_err(|_| VmError::InvalidProgram {
            message: format!("Negative argument count {}.", argc),
            function: function.to_string(),
        })?;
        self.pop_n(count, function)
    }

    fn report_step<A: ExecutionAdapter>(&self, adapter: &mut A, pc: usize, op: Opcode) {
        let frame = self.current_frame();
        let frames: Vec<String> = self
            .frames
            .iter()
            .map(|f| self.program.functions[f.function].name.clone())
            .collect();
        adapter.on_step(&VmStep {
            function: &self.program.functions[frame.function].name,
            pc,
            op,
            stack: &self.stack[frame.stack_base..],
            locals: &frame.locals,
            frames: &frames,
        });
    }
}
