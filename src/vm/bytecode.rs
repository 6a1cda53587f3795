//! Bytecode container: the `Bytecode` node format, its strict loader and
//! its emitter.
//!
//! ```text
//! Bytecode#bc(flags=0 format="AiBC1" magic="AIBC" version=1) {
//!   Const#c0(kind=string value="hi")
//!   Func#f0(locals="x" name=main params="") {
//!     Inst#f0_0(a=0 b=0 op=CONST s="") ...
//!   }
//! }
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{AttrValue, Node};
use crate::format::format;
use crate::parser;
use crate::runtime::{split_names, Value};

use super::VmError;

pub const MAGIC: &str = "AIBC";
pub const FORMAT: &str = "AiBC1";
pub const VERSION: i32 = 1;

/// One instruction. Operands are generic so new opcodes need no new shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: String,
    pub a: i32,
    pub b: i32,
    pub s: String,
}

impl Instruction {
    pub fn new(op: &str, a: i32, s: &str) -> Self {
        Self {
            op: op.to_string(),
            a,
            b: 0,
            s: s.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VmFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Slot names. Parameters occupy the first slots.
    pub locals: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl VmFunction {
    /// Number of local slots a frame needs.
    pub fn slot_count(&self) -> usize {
        self.locals.len().max(self.params.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct VmProgram {
    pub constants: Vec<Value>,
    pub functions: Vec<VmFunction>,
    index: HashMap<String, usize>,
}

impl VmProgram {
    pub fn new(constants: Vec<Value>, functions: Vec<VmFunction>) -> Self {
        let index = functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            constants,
            functions,
            index,
        }
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn function(&self, name: &str) -> Option<&VmFunction> {
        self.function_index(name).map(|i| &self.functions[i])
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Read a `Bytecode` node. Any deviation from the container format is
    /// a `VM001` error carrying the offending node's id.
    pub fn load(node: &Node) -> Result<Self, VmError> {
        if !node.is_kind("Bytecode") {
            return Err(VmError::load("Expected Bytecode node.", node));
        }
        require_string(node, "magic", MAGIC, "Unsupported bytecode magic.")?;
        require_string(node, "format", FORMAT, "Unsupported bytecode format.")?;
        if node.attr("version") != Some(&AttrValue::Int(VERSION)) {
            return Err(VmError::load("Unsupported bytecode version.", node));
        }
        if node.attr("flags").and_then(AttrValue::as_int).is_none() {
            return Err(VmError::load("Invalid bytecode flags.", node));
        }

        let mut constants = Vec::new();
        let mut functions = Vec::new();
        for child in &node.children {
            match child.kind.as_str() {
                "Const" => constants.push(load_constant(child)?),
                "Func" => functions.push(load_function(child)?),
                _ => return Err(VmError::load("Unsupported Bytecode section.", child)),
            }
        }
        debug!(
            constants = constants.len(),
            functions = functions.len(),
            "bytecode loaded"
        );
        Ok(Self::new(constants, functions))
    }

    // ── Emitting ────────────────────────────────────────────────────────

    pub fn to_node(&self) -> Node {
        let mut root = Node::new("Bytecode", "bc")
            .with_attr("magic", AttrValue::string(MAGIC))
            .with_attr("format", AttrValue::string(FORMAT))
            .with_attr("version", AttrValue::Int(VERSION))
            .with_attr("flags", AttrValue::Int(0));

        for (i, constant) in self.constants.iter().enumerate() {
            root.children.push(constant_node(&format!("c{}", i), constant));
        }
        for (i, function) in self.functions.iter().enumerate() {
            let id = format!("f{}", i);
            let insts = function
                .instructions
                .iter()
                .enumerate()
                .map(|(j, inst)| {
                    Node::new("Inst", format!("{}_{}", id, j))
                        .with_attr("op", AttrValue::ident(inst.op.clone()))
                        .with_attr("a", AttrValue::Int(inst.a))
                        .with_attr("b", AttrValue::Int(inst.b))
                        .with_attr("s", AttrValue::string(inst.s.clone()))
                })
                .collect();
            root.children.push(
                Node::new("Func", id)
                    .with_attr("name", AttrValue::ident(function.name.clone()))
                    .with_attr("params", AttrValue::string(function.params.join(",")))
                    .with_attr("locals", AttrValue::string(function.locals.join(",")))
                    .with_children(insts),
            );
        }
        root
    }
}

fn require_string(node: &Node, key: &str, expected: &str, message: &str) -> Result<(), VmError> {
    match node.attr(key) {
        Some(AttrValue::String(s)) if s == expected => Ok(()),
        _ => Err(VmError::load(message, node)),
    }
}

fn load_constant(node: &Node) -> Result<Value, VmError> {
    let Some(kind) = node.ident_attr("kind") else {
        return Err(VmError::load("Invalid Const node.", node));
    };
    let value = node.attr("value");
    match (kind, value) {
        ("string", Some(AttrValue::String(s))) => Ok(Value::str(s.clone())),
        ("int", Some(AttrValue::Int(n))) => Ok(Value::Int(*n)),
        ("bool", Some(AttrValue::Bool(b))) => Ok(Value::Bool(*b)),
        ("node", Some(AttrValue::String(text))) => decode_node_constant(text, node),
        ("null", _) => Ok(Value::Void),
        _ => Err(VmError::load("Unsupported constant kind.", node)),
    }
}

/// Node constants are stored as their formatted text.
fn decode_node_constant(text: &str, node: &Node) -> Result<Value, VmError> {
    let parsed = parser::parse(text);
    match (parsed.root, parsed.diagnostics.is_empty()) {
        (Some(root), true) => Ok(Value::node(root)),
        _ => Err(VmError::load("Invalid node constant.", node)),
    }
}

fn load_function(node: &Node) -> Result<VmFunction, VmError> {
    let Some(name) = node.ident_attr("name") else {
        return Err(VmError::load("Func missing name.", node));
    };
    let csv = |key: &str| match node.attr(key) {
        Some(AttrValue::String(text)) => split_names(text),
        _ => Vec::new(),
    };

    let mut instructions = Vec::with_capacity(node.children.len());
    for inst in &node.children {
        if !inst.is_kind("Inst") {
            return Err(VmError::load("Func contains non-instruction child.", inst));
        }
        let Some(op) = inst.ident_attr("op") else {
            return Err(VmError::load("Instruction missing op.", inst));
        };
        instructions.push(Instruction {
            op: op.to_string(),
            a: inst.attr("a").and_then(AttrValue::as_int).unwrap_or(0),
            b: inst.attr("b").and_then(AttrValue::as_int).unwrap_or(0),
            s: match inst.attr("s") {
                Some(AttrValue::String(s)) => s.clone(),
                _ => String::new(),
            },
        });
    }

    Ok(VmFunction {
        name: name.to_string(),
        params: csv("params"),
        locals: csv("locals"),
        instructions,
    })
}

fn constant_node(id: &str, value: &Value) -> Node {
    let node = Node::new("Const", id);
    match value {
        Value::Str(s) => node
            .with_attr("kind", AttrValue::ident("string"))
            .with_attr("value", AttrValue::string(s.clone())),
        Value::Int(n) => node
            .with_attr("kind", AttrValue::ident("int"))
            .with_attr("value", AttrValue::Int(*n)),
        Value::Bool(b) => node
            .with_attr("kind", AttrValue::ident("bool"))
            .with_attr("value", AttrValue::Bool(*b)),
        Value::Node(n) => node
            .with_attr("kind", AttrValue::ident("node"))
            .with_attr("value", AttrValue::string(format(n))),
        Value::Void | Value::Function(_) | Value::Unknown => {
            node.with_attr("kind", AttrValue::ident("null"))
        }
    }
}
