//! AOS node model: the one tagged tree used for programs, bytecode,
//! diagnostics and structured data.
//!
//! Attributes live in a `BTreeMap` so every consumer (formatter, attribute
//! introspection, debug snapshots) sees them in ordinal key order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Source positions ─────────────────────────────────────────────────────

/// A point in source text: char offset (0-based), line and column (1-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self { offset, line, column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span used for nodes synthesized at runtime.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

// ── Attribute values ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    String(String),
    Int(i32),
    Bool(bool),
    /// Unquoted bare word, e.g. a call target or a parameter list.
    Identifier(String),
}

impl AttrValue {
    pub fn ident(text: impl Into<String>) -> Self {
        AttrValue::Identifier(text.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        AttrValue::String(text.into())
    }

    /// Lower-case kind name as exposed by `AttrValueKind`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::String(_) => "string",
            AttrValue::Int(_) => "int",
            AttrValue::Bool(_) => "bool",
            AttrValue::Identifier(_) => "identifier",
        }
    }

    /// Text of a string or identifier attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) | AttrValue::Identifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            AttrValue::Identifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// ── Nodes ────────────────────────────────────────────────────────────────

/// A tagged tree element. Children order is significant; attribute order
/// is always the sorted key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: String,
    pub id: String,
    pub attrs: BTreeMap<String, AttrValue>,
    pub children: Vec<Node>,
    #[serde(skip)]
    pub span: Span,
}

impl Node {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
            span: Span::zero(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Identifier-valued attribute. String values do not qualify.
    pub fn ident_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_identifier)
    }

    pub fn text_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_text)
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// `Err` nodes are the error-as-value channel.
    pub fn is_err(&self) -> bool {
        self.kind == "Err"
    }

    /// Attribute entry at `index` in sorted key order.
    pub fn attr_at(&self, index: i32) -> Option<(&String, &AttrValue)> {
        if index < 0 {
            return None;
        }
        self.attrs.iter().nth(index as usize)
    }

    pub fn child_at(&self, index: i32) -> Option<&Node> {
        if index < 0 {
            return None;
        }
        self.children.get(index as usize)
    }

    /// Depth-first search by id, the node itself first.
    pub fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Parent of the first descendant with `id`, plus its child index.
    pub fn find_parent_mut(&mut self, id: &str) -> Option<(&mut Node, usize)> {
        if let Some(index) = self.children.iter().position(|c| c.id == id) {
            return Some((self, index));
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_parent_mut(id))
    }

    /// Pre-order walk over the whole tree.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format::format(self))
    }
}

// ── Value kinds ──────────────────────────────────────────────────────────

/// Static kind of a runtime value, shared by the validator, the capability
/// contracts and the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int,
    Bool,
    Void,
    Node,
    Function,
    Unknown,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::Void => "void",
            ValueKind::Node => "node",
            ValueKind::Function => "function",
            ValueKind::Unknown => "unknown",
        }
    }

    /// Unknown is compatible with everything.
    pub fn is_compatible(self, expected: ValueKind) -> bool {
        self == expected || self == ValueKind::Unknown
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────

/// Non-fatal finding from tokenizing, parsing, validation or patching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub node_id: Option<String>,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            node_id: None,
            span: None,
        }
    }

    pub fn at_node(code: &str, message: impl Into<String>, node: &Node) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            node_id: Some(node.id.clone()),
            span: Some(node.span),
        }
    }

    pub fn at_span(code: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            node_id: None,
            span: Some(span),
        }
    }

    /// `Err#<id>(code=.. message=".." nodeId="..")`
    pub fn to_err_node(&self, id: &str) -> Node {
        err_node(id, &self.code, &self.message, self.node_id.as_deref().unwrap_or(""))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.span, &self.node_id) {
            (Some(span), _) if span.start.line > 0 => {
                write!(f, "{} {}: {}", self.code, span, self.message)
            }
            (_, Some(id)) => write!(f, "{} [{}]: {}", self.code, id, self.message),
            _ => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Build an `Err` node. The code becomes an identifier when it is a bare word.
pub fn err_node(id: &str, code: &str, message: &str, node_id: &str) -> Node {
    let code_attr = if crate::format::is_bare_identifier(code) {
        AttrValue::ident(code)
    } else {
        AttrValue::string(code)
    };
    Node::new("Err", id)
        .with_attr("code", code_attr)
        .with_attr("message", AttrValue::string(message))
        .with_attr("nodeId", AttrValue::string(node_id))
}
