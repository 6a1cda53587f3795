use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Node, ValueKind};
use crate::format::{escape_string, format};

/// Name → value bindings. Environments are copied, never shared.
pub type Env = HashMap<String, Value>;

/// Dynamic runtime value. `Unknown` means "could not be determined" and is
/// not an error.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i32),
    Bool(bool),
    Void,
    Node(Rc<Node>),
    Function(Rc<Function>),
    Unknown,
}

/// A closure: parameters, a `Block` body and the bindings captured when the
/// `Fn` was evaluated.
#[derive(Debug)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Node,
    pub captured: Env,
    /// Set when the closure is bound by `Let`, so the body can call itself.
    pub name: Option<String>,
}

impl Value {
    pub fn node(node: Node) -> Self {
        Value::Node(Rc::new(node))
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::String,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Void => ValueKind::Void,
            Value::Node(_) => ValueKind::Node,
            Value::Function(_) => ValueKind::Function,
            Value::Unknown => ValueKind::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// A `Node` value whose kind is `Err`.
    pub fn is_err(&self) -> bool {
        matches!(self, Value::Node(node) if node.is_err())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Compact rendering used in debug snapshots and syscall records.
    pub fn render(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", escape_string(s)),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Void => "void".to_string(),
            Value::Node(n) => format!("{}#{}", n.kind, n.id),
            Value::Function(_) => "fn".to_string(),
            Value::Unknown => "unknown".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::Unknown, Value::Unknown) => true,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Node(n) => write!(f, "{}", format(n)),
            other => write!(f, "{}", other.render()),
        }
    }
}

/// Split a `params`/`locals` list: comma separated, trimmed, empties dropped.
pub fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
