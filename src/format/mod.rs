//! Canonical Node → text serialization, the inverse of `parser::parse`.
//!
//! Output is a fixed point after one pass: `format(parse(format(n)))`
//! equals `format(n)`.

use crate::ast::{AttrValue, Node};
use crate::lexer::tokens::{is_identifier_part, is_identifier_start};
use crate::runtime::Value;

pub fn format(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: &Node, out: &mut String) {
    out.push_str(&node.kind);
    out.push('#');
    out.push_str(&node.id);

    if !node.attrs.is_empty() {
        out.push('(');
        for (i, (key, value)) in node.attrs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            write_attr_value(value, out);
        }
        out.push(')');
    }

    if !node.children.is_empty() {
        out.push_str(" {");
        for child in &node.children {
            out.push(' ');
            write_node(child, out);
        }
        out.push_str(" }");
    }
}

fn write_attr_value(value: &AttrValue, out: &mut String) {
    match value {
        AttrValue::String(s) => {
            out.push('"');
            out.push_str(&escape_string(s));
            out.push('"');
        }
        AttrValue::Int(n) => out.push_str(&n.to_string()),
        AttrValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        AttrValue::Identifier(s) if is_bare_identifier(s) => out.push_str(s),
        // Would not re-lex as one value; quote it.
        AttrValue::Identifier(s) => {
            out.push('"');
            out.push_str(&escape_string(s));
            out.push('"');
        }
    }
}

/// Escape `"`, `\`, newline, carriage return and tab.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// True when `text` re-lexes as a single identifier value, including
/// dotted and comma-joined forms such as `sys.fs_stat` or `a,b`.
pub fn is_bare_identifier(text: &str) -> bool {
    // These would re-lex as Bool.
    if text.is_empty() || text == "true" || text == "false" {
        return false;
    }
    let mut segments = text.split(['.', ',']);
    let first_ok = match segments.next() {
        Some(first) => {
            first.chars().next().map_or(false, is_identifier_start)
                && first.chars().all(is_identifier_part)
        }
        None => false,
    };
    first_ok
        && segments.all(|seg| {
            seg.chars()
                .next()
                .map_or(false, |c| is_identifier_start(c) || c == '-' || c.is_ascii_digit())
                && seg.chars().all(is_identifier_part)
        })
}

/// Render an evaluation result as an `Ok`/`Err` node.
pub fn result_node(value: &Value) -> Node {
    let ok = Node::new("Ok", "ok0").with_attr("type", AttrValue::ident(value.kind().name()));
    match value {
        Value::Str(s) => ok.with_attr("value", AttrValue::string(s.clone())),
        Value::Int(n) => ok.with_attr("value", AttrValue::Int(*n)),
        Value::Bool(b) => ok.with_attr("value", AttrValue::Bool(*b)),
        Value::Node(node) if node.is_err() => node.as_ref().clone(),
        Value::Node(node) => ok.with_child(node.as_ref().clone()),
        Value::Void | Value::Function(_) | Value::Unknown => ok,
    }
}

/// `format(result_node(value))`
pub fn format_value(value: &Value) -> String {
    format(&result_node(value))
}
