//! Bytecode compiler: Program tree → `VmProgram`.
//!
//! Top-level `Let{Fn}` definitions become functions; every other top-level
//! statement goes into `main`. Sequences keep Err short-circuiting with a
//! `JUMP_IF_ERR` after each statement but the last.

use std::collections::HashSet;

use thiserror::Error;

use crate::ast::{err_node, AttrValue, Node};
use crate::capability;
use crate::runtime::ops::Op;
use crate::runtime::{split_names, Value};

use super::bytecode::{Instruction, VmFunction, VmProgram};
use super::opcodes::Opcode;

/// Name of the function holding top-level statements.
pub const MAIN: &str = "main";

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub node_id: String,
}

impl CompileError {
    fn new(message: impl Into<String>, node: &Node) -> Self {
        Self {
            message: message.into(),
            node_id: node.id.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        "VMC001"
    }

    pub fn to_err_node(&self) -> Node {
        err_node("err0", self.code(), &self.message, &self.node_id)
    }
}

type CompileResult<T> = Result<T, CompileError>;

/// Compile a `Program` and emit it as a `Bytecode` node.
pub fn compile(root: &Node) -> CompileResult<Node> {
    compile_program(root).map(|program| program.to_node())
}

pub fn compile_program(root: &Node) -> CompileResult<VmProgram> {
    if !root.is_kind("Program") {
        return Err(CompileError::new("Expected Program node.", root));
    }

    // Collect every function name first so calls may precede definitions.
    let mut names = HashSet::new();
    for stmt in &root.children {
        if let Some((name, _)) = function_definition(stmt) {
            if name == MAIN {
                return Err(CompileError::new(
                    "'main' is reserved for top-level statements.",
                    stmt,
                ));
            }
            names.insert(name.to_string());
        }
    }

    let mut constants = Vec::new();
    let mut functions = Vec::new();
    let mut statements = Vec::new();
    for stmt in &root.children {
        match function_definition(stmt) {
            Some((name, fn_node)) => {
                functions.push(compile_function(name, fn_node, &names, &mut constants)?)
            }
            None => statements.push(stmt),
        }
    }

    let mut main = FunctionCompiler::new(&names, &mut constants, Vec::new());
    main.compile_sequence(&statements)?;
    main.emit(Opcode::Return, 0, "");
    functions.insert(0, main.finish(MAIN));

    Ok(VmProgram::new(constants, functions))
}

/// `Let#..(name=f) { Fn#.. }` at top level.
fn function_definition(stmt: &Node) -> Option<(&str, &Node)> {
    if !stmt.is_kind("Let") {
        return None;
    }
    match stmt.children.as_slice() {
        [child] if child.is_kind("Fn") => stmt.ident_attr("name").map(|name| (name, child)),
        _ => None,
    }
}

fn compile_function(
    name: &str,
    node: &Node,
    names: &HashSet<String>,
    constants: &mut Vec<Value>,
) -> CompileResult<VmFunction> {
    let params = node
        .attr("params")
        .and_then(AttrValue::as_text)
        .map(split_names)
        .unwrap_or_default();
    let [body] = node.children.as_slice() else {
        return Err(CompileError::new("Fn body must be a single Block.", node));
    };
    if !body.is_kind("Block") {
        return Err(CompileError::new("Fn body must be a single Block.", node));
    }

    let mut fc = FunctionCompiler::new(names, constants, params);
    let stmts: Vec<&Node> = body.children.iter().collect();
    fc.compile_sequence(&stmts)?;
    fc.emit(Opcode::Return, 0, "");
    Ok(fc.finish(name))
}

// ── Per-function compiler state ──────────────────────────────────────────

struct FunctionCompiler<'a> {
    names: &'a HashSet<String>,
    constants: &'a mut Vec<Value>,
    params: Vec<String>,
    locals: Vec<String>,
    instructions: Vec<Instruction>,
}

impl<'a> FunctionCompiler<'a> {
    fn new(names: &'a HashSet<String>, constants: &'a mut Vec<Value>, params: Vec<String>) -> Self {
        Self {
            names,
            constants,
            locals: params.clone(),
            params,
            instructions: Vec::new(),
        }
    }

    fn finish(self, name: &str) -> VmFunction {
        VmFunction {
            name: name.to_string(),
            params: self.params,
            locals: self.locals,
            instructions: self.instructions,
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn emit(&mut self, op: Opcode, a: i32, s: &str) -> usize {
        self.instructions.push(Instruction::new(op.mnemonic(), a, s));
        self.instructions.len() - 1
    }

    fn offset(&self) -> i32 {
        to_i32(self.instructions.len())
    }

    /// Point the jump at `index` to the current end of the stream.
    fn patch_jump(&mut self, index: usize) {
        let target = self.offset();
        self.instructions[index].a = target;
    }

    fn resolve_local(&mut self, name: &str) -> i32 {
        match self.locals.iter().position(|n| n == name) {
            Some(pos) => to_i32(pos),
            None => {
                self.locals.push(name.to_string());
                to_i32(self.locals.len() - 1)
            }
        }
    }

    fn add_constant(&mut self, value: Value) -> i32 {
        match self.constants.iter().position(|c| *c == value) {
            Some(pos) => to_i32(pos),
            None => {
                self.constants.push(value);
                to_i32(self.constants.len() - 1)
            }
        }
    }

    // ── Sequences & statements ───────────────────────────────────────

    /// Leaves exactly one value: the last statement's, or the first Err.
    fn compile_sequence(&mut self, stmts: &[&Node]) -> CompileResult<()> {
        if stmts.is_empty() {
            self.emit(Opcode::PushVoid, 0, "");
            return Ok(());
        }
        let mut exits = Vec::new();
        for (i, stmt) in stmts.iter().enumerate() {
            self.compile_node(stmt)?;
            if i + 1 < stmts.len() {
                exits.push(self.emit(Opcode::JumpIfErr, 0, ""));
                self.emit(Opcode::Pop, 0, "");
            }
        }
        for exit in exits {
            self.patch_jump(exit);
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &Node) -> CompileResult<()> {
        match node.kind.as_str() {
            "Program" | "Block" => {
                let stmts: Vec<&Node> = node.children.iter().collect();
                self.compile_sequence(&stmts)
            }
            "Let" => self.compile_let(node),
            "Var" => self.compile_var(node),
            "Lit" => self.compile_lit(node),
            "Call" => self.compile_call(node),
            "If" => self.compile_if(node),
            "Return" => {
                match node.children.first() {
                    Some(child) => self.compile_node(child)?,
                    None => {
                        self.emit(Opcode::PushVoid, 0, "");
                    }
                }
                self.emit(Opcode::Return, 0, "");
                Ok(())
            }
            "Fn" => Err(CompileError::new(
                "Nested Fn is not supported by the bytecode compiler.",
                node,
            )),
            "Import" | "Export" => Err(CompileError::new(
                format!("{} is not supported by the bytecode compiler.", node.kind),
                node,
            )),
            kind => match Op::from_kind(kind) {
                Some(op) => self.compile_operator(op, node),
                None => Err(CompileError::new(
                    format!("Unsupported node kind '{}'.", kind),
                    node,
                )),
            },
        }
    }

    fn compile_let(&mut self, node: &Node) -> CompileResult<()> {
        let Some(name) = node.ident_attr("name") else {
            return Err(CompileError::new("Let missing name.", node));
        };
        let [child] = node.children.as_slice() else {
            return Err(CompileError::new("Let expects one child.", node));
        };
        self.compile_node(child)?;
        let slot = self.resolve_local(name);
        self.emit(Opcode::StoreLocal, slot, "");
        self.emit(Opcode::PushVoid, 0, "");
        Ok(())
    }

    fn compile_var(&mut self, node: &Node) -> CompileResult<()> {
        let Some(name) = node.ident_attr("name") else {
            return Err(CompileError::new("Var missing name.", node));
        };
        if let Some(pos) = self.locals.iter().position(|n| n == name) {
            self.emit(Opcode::LoadLocal, to_i32(pos), "");
            return Ok(());
        }
        if self.names.contains(name) {
            return Err(CompileError::new(
                format!("Function '{}' cannot be used as a value.", name),
                node,
            ));
        }
        Err(CompileError::new(
            format!("Unbound variable '{}'.", name),
            node,
        ))
    }

    fn compile_lit(&mut self, node: &Node) -> CompileResult<()> {
        match node.attr("value") {
            Some(AttrValue::String(s)) => {
                let index = self.add_constant(Value::str(s.clone()));
                self.emit(Opcode::Const, index, "");
            }
            Some(AttrValue::Int(n)) => {
                self.emit(Opcode::PushInt, *n, "");
            }
            Some(AttrValue::Bool(b)) => {
                self.emit(Opcode::PushBool, i32::from(*b), "");
            }
            _ => return Err(CompileError::new("Lit value must be a string, int or bool.", node)),
        }
        Ok(())
    }

    fn compile_call(&mut self, node: &Node) -> CompileResult<()> {
        let Some(target) = node.ident_attr("target") else {
            return Err(CompileError::new("Call missing target.", node));
        };
        let op = if capability::lookup(target).is_some() {
            Opcode::CallSys
        } else if self.names.contains(target) {
            Opcode::Call
        } else {
            return Err(CompileError::new(
                format!("Unknown call target '{}'.", target),
                node,
            ));
        };
        for arg in &node.children {
            self.compile_node(arg)?;
        }
        self.emit(op, to_i32(node.children.len()), target);
        Ok(())
    }

    fn compile_if(&mut self, node: &Node) -> CompileResult<()> {
        let (cond, then, otherwise) = match node.children.as_slice() {
            [cond, then] => (cond, then, None),
            [cond, then, otherwise] => (cond, then, Some(otherwise)),
            _ => return Err(CompileError::new("If expects 2 or 3 children.", node)),
        };
        self.compile_node(cond)?;
        let to_else = self.emit(Opcode::JumpIfFalse, 0, "");
        self.compile_node(then)?;
        let to_end = self.emit(Opcode::Jump, 0, "");
        self.patch_jump(to_else);
        match otherwise {
            Some(branch) => self.compile_node(branch)?,
            None => {
                self.emit(Opcode::PushVoid, 0, "");
            }
        }
        self.patch_jump(to_end);
        Ok(())
    }

    fn compile_operator(&mut self, op: Op, node: &Node) -> CompileResult<()> {
        if node.children.len() != op.arity() {
            return Err(CompileError::new(
                format!("{} expects {} operands.", op.kind(), op.arity()),
                node,
            ));
        }
        for operand in &node.children {
            self.compile_node(operand)?;
        }
        self.emit(Opcode::for_operator(op), 0, "");
        Ok(())
    }
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
