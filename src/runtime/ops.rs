//! Operator semantics shared by the tree-walking interpreter and the VM.
//!
//! Every operator is total: an operand of the wrong kind (including
//! Unknown) yields `Value::Unknown` instead of failing.

use crate::ast::{err_node, AttrValue, Node};
use crate::format::escape_string;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Add,
    ToString,
    StrConcat,
    StrEscape,
    NodeKind,
    NodeId,
    AttrCount,
    AttrKey,
    AttrValueKind,
    AttrValueString,
    AttrValueInt,
    AttrValueBool,
    ChildCount,
    ChildAt,
    MakeBlock,
    AppendChild,
    MakeErr,
    MakeLitString,
}

impl Op {
    pub const ALL: [Op; 19] = [
        Op::Eq,
        Op::Add,
        Op::ToString,
        Op::StrConcat,
        Op::StrEscape,
        Op::NodeKind,
        Op::NodeId,
        Op::AttrCount,
        Op::AttrKey,
        Op::AttrValueKind,
        Op::AttrValueString,
        Op::AttrValueInt,
        Op::AttrValueBool,
        Op::ChildCount,
        Op::ChildAt,
        Op::MakeBlock,
        Op::AppendChild,
        Op::MakeErr,
        Op::MakeLitString,
    ];

    /// Node kind that evaluates this operator.
    pub fn kind(self) -> &'static str {
        match self {
            Op::Eq => "Eq",
            Op::Add => "Add",
            Op::ToString => "ToString",
            Op::StrConcat => "StrConcat",
            Op::StrEscape => "StrEscape",
            Op::NodeKind => "NodeKind",
            Op::NodeId => "NodeId",
            Op::AttrCount => "AttrCount",
            Op::AttrKey => "AttrKey",
            Op::AttrValueKind => "AttrValueKind",
            Op::AttrValueString => "AttrValueString",
            Op::AttrValueInt => "AttrValueInt",
            Op::AttrValueBool => "AttrValueBool",
            Op::ChildCount => "ChildCount",
            Op::ChildAt => "ChildAt",
            Op::MakeBlock => "MakeBlock",
            Op::AppendChild => "AppendChild",
            Op::MakeErr => "MakeErr",
            Op::MakeLitString => "MakeLitString",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Op> {
        Op::ALL.into_iter().find(|op| op.kind() == kind)
    }

    /// Operand count; also the exact child count of the node form.
    pub fn arity(self) -> usize {
        match self {
            Op::ToString
            | Op::StrEscape
            | Op::NodeKind
            | Op::NodeId
            | Op::AttrCount
            | Op::ChildCount
            | Op::MakeBlock => 1,
            Op::MakeErr => 4,
            _ => 2,
        }
    }

    /// Apply to operands in source order. A wrong operand count is Unknown.
    pub fn apply(self, args: &[Value]) -> Value {
        if args.len() != self.arity() {
            return Value::Unknown;
        }
        match self {
            Op::Eq => eq(&args[0], &args[1]),
            Op::Add => add(&args[0], &args[1]),
            Op::ToString => to_string(&args[0]),
            Op::StrConcat => str_concat(&args[0], &args[1]),
            Op::StrEscape => match &args[0] {
                Value::Str(s) => Value::Str(escape_string(s)),
                _ => Value::Unknown,
            },
            Op::NodeKind => with_node(&args[0], |n| Value::str(n.kind.clone())),
            Op::NodeId => with_node(&args[0], |n| Value::str(n.id.clone())),
            Op::AttrCount => with_node(&args[0], |n| Value::Int(count(n.attrs.len()))),
            Op::ChildCount => with_node(&args[0], |n| Value::Int(count(n.children.len()))),
            Op::AttrKey => with_attr(&args[0], &args[1], |key, _| Value::str(key.clone())),
            Op::AttrValueKind => with_attr(&args[0], &args[1], |_, v| Value::str(v.kind_name())),
            Op::AttrValueString => with_attr(&args[0], &args[1], |_, v| match v.as_text() {
                Some(text) => Value::str(text),
                None => Value::Unknown,
            }),
            Op::AttrValueInt => with_attr(&args[0], &args[1], |_, v| match v.as_int() {
                Some(n) => Value::Int(n),
                None => Value::Unknown,
            }),
            Op::AttrValueBool => with_attr(&args[0], &args[1], |_, v| match v.as_bool() {
                Some(b) => Value::Bool(b),
                None => Value::Unknown,
            }),
            Op::ChildAt => match (&args[0], &args[1]) {
                (Value::Node(node), Value::Int(index)) => match node.child_at(*index) {
                    Some(child) => Value::node(child.clone()),
                    None => Value::Unknown,
                },
                _ => Value::Unknown,
            },
            Op::MakeBlock => match &args[0] {
                Value::Str(id) => Value::node(Node::new("Block", id.clone())),
                _ => Value::Unknown,
            },
            Op::AppendChild => match (&args[0], &args[1]) {
                (Value::Node(parent), Value::Node(child)) => {
                    let mut copy = parent.as_ref().clone();
                    copy.children.push(child.as_ref().clone());
                    Value::node(copy)
                }
                _ => Value::Unknown,
            },
            Op::MakeErr => match (&args[0], &args[1], &args[2], &args[3]) {
                (Value::Str(id), Value::Str(code), Value::Str(message), Value::Str(node_id)) => {
                    Value::node(err_node(id, code, message, node_id))
                }
                _ => Value::Unknown,
            },
            Op::MakeLitString => match (&args[0], &args[1]) {
                (Value::Str(id), Value::Str(value)) => Value::node(
                    Node::new("Lit", id.clone()).with_attr("value", AttrValue::string(value.clone())),
                ),
                _ => Value::Unknown,
            },
        }
    }
}

/// Unknown on either side is Unknown. Differing kinds compare unequal.
pub fn eq(left: &Value, right: &Value) -> Value {
    if left.is_unknown() || right.is_unknown() {
        return Value::Unknown;
    }
    Value::Bool(left == right)
}

/// 32-bit wrapping addition.
pub fn add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        _ => Value::Unknown,
    }
}

pub fn to_string(value: &Value) -> Value {
    match value {
        Value::Int(n) => Value::Str(n.to_string()),
        Value::Bool(b) => Value::Str(b.to_string()),
        _ => Value::Unknown,
    }
}

pub fn str_concat(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
        _ => Value::Unknown,
    }
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

fn with_node(value: &Value, f: impl FnOnce(&Node) -> Value) -> Value {
    match value {
        Value::Node(node) => f(node),
        _ => Value::Unknown,
    }
}

/// Attribute at an index in sorted key order.
fn with_attr(target: &Value, index: &Value, f: impl FnOnce(&String, &AttrValue) -> Value) -> Value {
    match (target, index) {
        (Value::Node(node), Value::Int(i)) => match node.attr_at(*i) {
            Some((key, value)) => f(key, value),
            None => Value::Unknown,
        },
        _ => Value::Unknown,
    }
}
