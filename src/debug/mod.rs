//! Deterministic debug recorder.
//!
//! Records evaluation steps (tree-walking or bytecode), a state snapshot
//! per step, syscalls, lifecycle events and diagnostics. Every record is a
//! Node with a per-category counter id, and the run id is derived from a
//! caller seed, so two runs of the same program with the same seed and the
//! same replayed input produce identical artifacts.

use serde::Serialize;

use crate::ast::{AttrValue, Node};
use crate::capability::crypto::sha256_hex;
use crate::runtime::{Env, Value};
use crate::vm::VmStep;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRecorder {
    pub run_id: String,
    pub vm_trace: Vec<Node>,
    pub state_snapshots: Vec<Node>,
    pub syscalls: Vec<Node>,
    pub lifecycle_events: Vec<Node>,
    pub diagnostics: Vec<Node>,
    #[serde(skip)]
    counters: Counters,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    step: usize,
    snapshot: usize,
    syscall: usize,
    event: usize,
    diagnostic: usize,
}

/// Bump a counter and return the 1-based value.
fn next(counter: &mut usize) -> usize {
    *counter += 1;
    *counter
}

/// First 12 hex chars of SHA-256 over the seed.
pub fn run_id_for(seed: &str) -> String {
    let mut hex = sha256_hex(seed.as_bytes());
    hex.truncate(12);
    hex
}

impl DebugRecorder {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    pub fn from_seed(seed: &str) -> Self {
        Self::new(run_id_for(seed))
    }

    // ── Steps ───────────────────────────────────────────────────────────

    pub fn record_ast_step(&mut self, node: &Node, env: &Env, call_stack: &[String]) {
        let id = format!("dbg_step_{}", next(&mut self.counters.step));
        let function = call_stack.last().map(String::as_str).unwrap_or("");
        self.vm_trace.push(
            step_node(&id, "ast", &node.id, &node.kind, function, -1).with_span(node.span),
        );
        self.record_snapshot("ast", &node.id, env, call_stack, &[], &[]);
    }

    pub fn record_vm_step(&mut self, step: &VmStep<'_>, env: &Env) {
        let id = format!("dbg_step_{}", next(&mut self.counters.step));
        let pc = i32::try_from(step.pc).unwrap_or(i32::MAX);
        self.vm_trace.push(step_node(
            &id,
            "bytecode",
            step.function,
            step.op.mnemonic(),
            step.function,
            pc,
        ));
        let stack: Vec<String> = step.stack.iter().map(Value::render).collect();
        let locals: Vec<String> = step.locals.iter().map(Value::render).collect();
        self.record_snapshot("bytecode", step.function, env, step.frames, &stack, &locals);
    }

    fn record_snapshot(
        &mut self,
        vm: &str,
        step_node_id: &str,
        env: &Env,
        call_stack: &[String],
        stack: &[String],
        locals: &[String],
    ) {
        let id = format!("dbg_snap_{}", next(&mut self.counters.snapshot));
        let mut bindings: Vec<(&String, &Value)> = env.iter().collect();
        bindings.sort_by(|a, b| a.0.cmp(b.0));
        let env_items: Vec<String> = bindings
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value.render()))
            .collect();

        let snapshot = Node::new("Snapshot", id.clone())
            .with_attr("vm", AttrValue::string(vm))
            .with_attr("stepNodeId", AttrValue::string(step_node_id))
            .with_children(vec![
                string_list("env", &format!("{}_env", id), &env_items),
                string_list("callStack", &format!("{}_call", id), call_stack),
                string_list("stack", &format!("{}_stack", id), stack),
                string_list("locals", &format!("{}_locals", id), locals),
            ]);
        self.state_snapshots.push(snapshot);
    }

    // ── Syscalls, events, diagnostics ───────────────────────────────────

    /// `phase` is one of `ok`, `denied`, `rejected`, `failed`, `replay`.
    pub fn record_syscall(&mut self, target: &str, args: &[String], result: &str, phase: &str) {
        let id = format!("dbg_sys_{}", next(&mut self.counters.syscall));
        let children = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                Node::new("Arg", format!("{}_arg_{}", id, i))
                    .with_attr("value", AttrValue::string(arg.clone()))
            })
            .collect();
        self.syscalls.push(
            Node::new("Syscall", id)
                .with_attr("target", AttrValue::string(target))
                .with_attr("result", AttrValue::string(result))
                .with_attr("phase", AttrValue::string(phase))
                .with_children(children),
        );
    }

    pub fn record_event(&mut self, kind: &str, payload: &str) {
        let id = format!("dbg_evt_{}", next(&mut self.counters.event));
        self.lifecycle_events.push(
            Node::new("Event", id)
                .with_attr("kind", AttrValue::string(kind))
                .with_attr("payload", AttrValue::string(payload)),
        );
    }

    pub fn record_diagnostic(&mut self, code: &str, message: &str, node_id: &str) {
        let id = format!("dbg_diag_{}", next(&mut self.counters.diagnostic));
        self.diagnostics.push(
            Node::new("Diagnostic", id)
                .with_attr("code", AttrValue::string(code))
                .with_attr("message", AttrValue::string(message))
                .with_attr("nodeId", AttrValue::string(node_id)),
        );
    }

    // ── Artifacts ───────────────────────────────────────────────────────

    /// All records bundled under `DebugRun#<runId>`.
    pub fn to_node(&self) -> Node {
        Node::new("DebugRun", self.run_id.clone())
            .with_attr("runId", AttrValue::string(self.run_id.clone()))
            .with_children(vec![
                list_node("VmTrace", "trace", &self.vm_trace),
                list_node("StateSnapshots", "snapshots", &self.state_snapshots),
                list_node("Syscalls", "syscalls", &self.syscalls),
                list_node("LifecycleEvents", "events", &self.lifecycle_events),
                list_node("Diagnostics", "diagnostics", &self.diagnostics),
            ])
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn step_node(id: &str, vm: &str, node_id: &str, op: &str, function: &str, pc: i32) -> Node {
    Node::new("Step", id)
        .with_attr("vm", AttrValue::string(vm))
        .with_attr("nodeId", AttrValue::string(node_id))
        .with_attr("op", AttrValue::string(op))
        .with_attr("function", AttrValue::string(function))
        .with_attr("pc", AttrValue::Int(pc))
}

fn list_node(kind: &str, id: &str, children: &[Node]) -> Node {
    Node::new(kind, id).with_children(children.to_vec())
}

fn string_list(kind: &str, id: &str, values: &[String]) -> Node {
    let items = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            Node::new("Item", format!("{}_item_{}", id, i))
                .with_attr("value", AttrValue::string(value.clone()))
        })
        .collect();
    Node::new(kind, id).with_children(items)
}
