//! Structural well-formedness: known kinds, required attributes and
//! child-count bounds, driven by one per-kind table.

use crate::ast::{Diagnostic, Node};
use crate::runtime::ops::Op;

/// Required attributes and child-count bounds of one node kind.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub attrs: &'static [&'static str],
    pub min_children: usize,
    /// `None` means unbounded.
    pub max_children: Option<usize>,
}

const fn shape(attrs: &'static [&'static str], min: usize, max: Option<usize>) -> Shape {
    Shape {
        attrs,
        min_children: min,
        max_children: max,
    }
}

/// Shape of `kind`, or `None` for a kind the language does not define.
pub fn shape_of(kind: &str) -> Option<Shape> {
    let found = match kind {
        "Program" | "Block" => shape(&[], 0, None),
        "Let" => shape(&["name"], 1, Some(1)),
        "Var" => shape(&["name"], 0, Some(0)),
        "Lit" => shape(&["value"], 0, Some(0)),
        "Call" => shape(&["target"], 0, None),
        "Fn" => shape(&["params"], 1, Some(1)),
        "If" => shape(&[], 2, Some(3)),
        "Return" => shape(&[], 0, Some(1)),
        "Import" => shape(&["path"], 0, Some(0)),
        "Export" => shape(&["name"], 0, Some(1)),
        other => {
            let op = Op::from_kind(other)?;
            shape(&[], op.arity(), Some(op.arity()))
        }
    };
    Some(found)
}

/// Report missing attributes (`VAL002`) and child-count violations
/// (`VAL003`) of a known kind.
pub fn check_shape(node: &Node, shape: &Shape, out: &mut Vec<Diagnostic>) {
    for attr in shape.attrs {
        if !node.attrs.contains_key(*attr) {
            out.push(Diagnostic::at_node(
                "VAL002",
                format!("Missing attribute '{}'.", attr),
                node,
            ));
        }
    }

    let count = node.children.len();
    let too_many = shape.max_children.is_some_and(|max| count > max);
    if count < shape.min_children || too_many {
        let message = match shape.max_children {
            Some(max) => format!("{} expects {}-{} children.", node.kind, shape.min_children, max),
            None => format!("{} expects at least {} children.", node.kind, shape.min_children),
        };
        out.push(Diagnostic::at_node("VAL003", message, node));
    }
}

/// Whole-tree structural pass.
pub fn check_structure(root: &Node) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    root.walk(&mut |node| match shape_of(&node.kind) {
        Some(shape) => check_shape(node, &shape, &mut out),
        None => out.push(Diagnostic::at_node(
            "VAL999",
            format!("Unknown node kind '{}'.", node.kind),
            node,
        )),
    });
    out
}
