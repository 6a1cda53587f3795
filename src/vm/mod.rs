//! Bytecode model, loader, compiler and stack VM.
//!
//! A compiled module is itself a Node tree (`Bytecode#..`), so it is
//! parsed, formatted and patched like any program. The VM routes every
//! `CALL_SYS` through the same capability table the interpreter uses.

pub mod bytecode;
pub mod compiler;
pub mod machine;
pub mod opcodes;

use thiserror::Error;

use crate::ast::{err_node, AttrValue, Node};
use crate::runtime::{Runtime, RuntimeError, Value};

pub use bytecode::{Instruction, VmFunction, VmProgram};
pub use compiler::{compile, compile_program, CompileError};
pub use machine::{ExecutionAdapter, RuntimeAdapter, Vm, VmStep};
pub use opcodes::Opcode;

#[derive(Debug, Error)]
pub enum VmError {
    /// Malformed bytecode container.
    #[error("{message}")]
    Load { message: String, node_id: String },

    #[error("invalid opcode '{op}' at {function}:{pc}")]
    InvalidOpcode { op: String, function: String, pc: usize },

    #[error("stack overflow in {function}")]
    StackOverflow { function: String },

    #[error("stack underflow in {function}")]
    StackUnderflow { function: String },

    #[error("call depth exceeded calling {function}")]
    FrameOverflow { function: String },

    #[error("local {index} out of range in {function}")]
    LocalOutOfRange { index: i32, function: String },

    #[error("{message} in {function}")]
    TypeMismatch { message: String, function: String },

    #[error("{message}")]
    InvalidProgram { message: String, function: String },
}

impl VmError {
    pub(crate) fn load(message: impl Into<String>, node: &Node) -> Self {
        VmError::Load {
            message: message.into(),
            node_id: node.id.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            VmError::Load { .. } => "VM001",
            VmError::InvalidOpcode { .. } => "AIVM001",
            VmError::StackOverflow { .. } => "AIVM002",
            VmError::StackUnderflow { .. } => "AIVM003",
            VmError::FrameOverflow { .. } => "AIVM004",
            VmError::LocalOutOfRange { .. } => "AIVM006",
            VmError::TypeMismatch { .. } => "AIVM007",
            VmError::InvalidProgram { .. } => "AIVM008",
        }
    }

    pub fn to_err_node(&self) -> Node {
        err_node("err0", self.code(), &self.to_string(), self.node_id())
    }

    /// Offending node id for load errors, the executing function otherwise.
    pub fn node_id(&self) -> &str {
        match self {
            VmError::Load { node_id, .. } => node_id,
            VmError::InvalidOpcode { function, .. }
            | VmError::StackOverflow { function }
            | VmError::StackUnderflow { function }
            | VmError::FrameOverflow { function }
            | VmError::LocalOutOfRange { function, .. }
            | VmError::TypeMismatch { function, .. }
            | VmError::InvalidProgram { function, .. } => function,
        }
    }
}

/// Load `bytecode`, then run `entry` with the children of `args` as
/// arguments. `Lit` children become scalars; other children are passed as
/// node values.
pub fn run_bytecode(
    bytecode: &Node,
    entry: &str,
    args: &Node,
    runtime: &mut Runtime,
) -> Result<Value, RuntimeError> {
    let program = VmProgram::load(bytecode)?;
    let values = args.children.iter().map(arg_value).collect();
    let mut adapter = RuntimeAdapter::new(runtime);
    Vm::new(&program).run(entry, values, &mut adapter)
}

fn arg_value(node: &Node) -> Value {
    if !node.is_kind("Lit") {
        return Value::node(node.clone());
    }
    match node.attr("value") {
        Some(AttrValue::String(s)) => Value::str(s.clone()),
        Some(AttrValue::Int(n)) => Value::Int(*n),
        Some(AttrValue::Bool(b)) => Value::Bool(*b),
        _ => Value::Unknown,
    }
}
