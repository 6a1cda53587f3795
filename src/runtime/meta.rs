//! Meta-operations: the `compiler.*` targets and `sys.vm_run`.
//!
//! These let a program parse, format, validate, compile and run other
//! programs. Failures come back as `Err` node values, never as fatal
//! errors, except that a nested `compiler.run` propagates its own fatal
//! aborts.

use tracing::debug;

use crate::ast::Node;
use crate::format::format;
use crate::{parser, verify, vm};

use super::{Env, Interpreter, Result, Runtime, Value};

pub fn invoke(runtime: &mut Runtime, target: &str, args: &[Value]) -> Result<Value> {
    debug!(callee = target, "meta operation");
    match (target, args) {
        ("compiler.parse", [Value::Str(text)]) => Ok(parse(text)),
        ("compiler.format", [Value::Node(node)]) => Ok(Value::Str(format(node))),
        ("compiler.validate", [Value::Node(node)]) => Ok(validate(node, runtime)),
        ("compiler.emitBytecode", [Value::Node(node)]) => Ok(match vm::compile(node) {
            Ok(bytecode) => Value::node(bytecode),
            Err(err) => Value::node(err.to_err_node()),
        }),
        ("compiler.run", [Value::Node(node)]) => {
            Interpreter::with_frame(runtime, Env::new()).evaluate(node)
        }
        ("sys.vm_run", [Value::Node(bytecode), Value::Str(entry), Value::Node(call_args)]) => {
            Ok(match vm::run_bytecode(bytecode, entry, call_args, runtime) {
                Ok(value) => value,
                Err(err) => Value::node(err.to_err_node()),
            })
        }
        _ => Ok(Value::Unknown),
    }
}

/// The parsed root, or an `Err` built from the first diagnostic.
fn parse(text: &str) -> Value {
    let parsed = parser::parse(text);
    match (parsed.diagnostics.first(), parsed.root) {
        (Some(diag), _) => Value::node(diag.to_err_node("err0")),
        (None, Some(root)) => Value::node(root),
        (None, None) => Value::Unknown,
    }
}

/// `Block#diagnostics` holding one `Err` per diagnostic.
fn validate(node: &Node, runtime: &Runtime) -> Value {
    let diagnostics = verify::validate(node, None, &runtime.permissions, true);
    let children = diagnostics
        .iter()
        .enumerate()
        .map(|(i, diag)| diag.to_err_node(&format!("diag{}", i)))
        .collect();
    Value::node(Node::new("Block", "diagnostics").with_children(children))
}
