//! Tree-walking evaluator.
//!
//! The current environment is the innermost frame, or the runtime's global
//! environment when no frame is active. Function calls and module loads
//! push a frame; `Program`/`Block` evaluate in the frame they were entered
//! with.

use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::ast::{AttrValue, Node};
use crate::capability;
use crate::stack::ensure_sufficient_stack;

use super::modules::{self, Exports};
use super::ops::Op;
use super::{split_names, Env, Function, Runtime, RuntimeError, Value};

/// Non-value exits from evaluating a node.
enum Unwind {
    /// `Return` unwinding to the nearest call boundary.
    Return(Value),
    Fatal(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Fatal(err)
    }
}

type Flow = std::result::Result<Value, Unwind>;

pub struct Interpreter<'r> {
    runtime: &'r mut Runtime,
    frames: Vec<Env>,
}

impl<'r> Interpreter<'r> {
    /// Evaluate against the runtime's global environment.
    pub fn new(runtime: &'r mut Runtime) -> Self {
        Self {
            runtime,
            frames: Vec::new(),
        }
    }

    /// Evaluate inside `frame` so top-level `Let`s do not touch globals.
    pub fn with_frame(runtime: &'r mut Runtime, frame: Env) -> Self {
        Self {
            runtime,
            frames: vec![frame],
        }
    }

    /// Evaluate `node`. A top-level `Return` ends evaluation with its value.
    pub fn evaluate(&mut self, node: &Node) -> super::Result<Value> {
        match self.eval(node) {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Fatal(err)) => Err(err),
        }
    }

    /// Bindings of the innermost frame after evaluation.
    pub fn into_frame(mut self) -> Option<Env> {
        self.frames.pop()
    }

    fn env(&self) -> &Env {
        self.frames.last().unwrap_or(&self.runtime.env)
    }

    fn env_mut(&mut self) -> &mut Env {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.runtime.env,
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.env().get(name)
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    fn eval(&mut self, node: &Node) -> Flow {
        if self.runtime.depth >= self.runtime.max_depth {
            return Err(RuntimeError::DepthExceeded {
                limit: self.runtime.max_depth,
                node_id: node.id.clone(),
            }
            .into());
        }
        self.note_step(node);

        self.runtime.depth += 1;
        let result = ensure_sufficient_stack(|| self.eval_node(node));
        self.runtime.depth -= 1;

        match result {
            Ok(Value::Unknown) if self.runtime.strict => Err(RuntimeError::StrictUnknown {
                node_id: node.id.clone(),
            }
            .into()),
            other => other,
        }
    }

    fn note_step(&mut self, node: &Node) {
        let runtime = &mut *self.runtime;
        if runtime.trace {
            let id = format!("trace{}", runtime.trace_steps.len());
            runtime.trace_steps.push(
                Node::new("Step", id)
                    .with_attr("kind", AttrValue::string(node.kind.clone()))
                    .with_attr("nodeId", AttrValue::string(node.id.clone()))
                    .with_span(node.span),
            );
        }
        if let Some(recorder) = runtime.recorder.as_mut() {
            let env = self.frames.last().unwrap_or(&runtime.env);
            recorder.record_ast_step(node, env, &runtime.call_stack);
        }
    }

    fn eval_node(&mut self, node: &Node) -> Flow {
        match node.kind.as_str() {
            "Program" | "Block" => self.eval_sequence(&node.children),
            "Let" => self.eval_let(node),
            "Var" => Ok(node
                .ident_attr("name")
                .and_then(|name| self.lookup(name))
                .cloned()
                .unwrap_or(Value::Unknown)),
            "Lit" => Ok(match node.attr("value") {
                Some(AttrValue::String(s)) => Value::str(s.clone()),
                Some(AttrValue::Int(n)) => Value::Int(*n),
                Some(AttrValue::Bool(b)) => Value::Bool(*b),
                _ => Value::Unknown,
            }),
            "Call" => self.eval_call(node),
            "Fn" => Ok(self.make_function(node, None)),
            "If" => self.eval_if(node),
            "Return" => {
                let value = match node.children.first() {
                    Some(child) => self.eval(child)?,
                    None => Value::Void,
                };
                Err(Unwind::Return(value))
            }
            "Import" => self.eval_import(node),
            "Export" => self.eval_export(node),
            kind => match Op::from_kind(kind) {
                Some(op) => self.eval_op(op, node),
                None => Ok(Value::Unknown),
            },
        }
    }

    /// Children in order; an `Err` node value stops the sequence.
    fn eval_sequence(&mut self, children: &[Node]) -> Flow {
        let mut last = Value::Void;
        for child in children {
            last = self.eval(child)?;
            if last.is_err() {
                return Ok(last);
            }
        }
        Ok(last)
    }

    fn eval_let(&mut self, node: &Node) -> Flow {
        let Some(name) = node.ident_attr("name") else {
            return Ok(Value::Unknown);
        };
        if self.runtime.read_only.contains(name) {
            return Err(RuntimeError::ReadOnlyBinding {
                name: name.to_string(),
                node_id: node.id.clone(),
            }
            .into());
        }
        let [child] = node.children.as_slice() else {
            return Ok(Value::Unknown);
        };
        let value = self.eval_bound(child, name)?;
        self.env_mut().insert(name.to_string(), value);
        Ok(Value::Void)
    }

    /// Evaluate a value about to be bound to `name`; a `Fn` learns its name
    /// so the body can call itself.
    fn eval_bound(&mut self, child: &Node, name: &str) -> Flow {
        if child.is_kind("Fn") {
            self.note_step(child);
            let function = self.make_function(child, Some(name));
            if function.is_unknown() && self.runtime.strict {
                return Err(RuntimeError::StrictUnknown {
                    node_id: child.id.clone(),
                }
                .into());
            }
            return Ok(function);
        }
        self.eval(child)
    }

    fn eval_if(&mut self, node: &Node) -> Flow {
        if !(2..=3).contains(&node.children.len()) {
            return Ok(Value::Unknown);
        }
        match self.eval(&node.children[0])? {
            Value::Bool(true) => self.eval(&node.children[1]),
            Value::Bool(false) => match node.children.get(2) {
                Some(otherwise) => self.eval(otherwise),
                None => Ok(Value::Void),
            },
            _ => Ok(Value::Unknown),
        }
    }

    fn eval_op(&mut self, op: Op, node: &Node) -> Flow {
        if node.children.len() != op.arity() {
            return Ok(Value::Unknown);
        }
        let args = self.eval_args(&node.children)?;
        Ok(op.apply(&args))
    }

    fn eval_args(&mut self, children: &[Node]) -> std::result::Result<Vec<Value>, Unwind> {
        children.iter().map(|child| self.eval(child)).collect()
    }

    // ── Calls and closures ──────────────────────────────────────────────

    fn eval_call(&mut self, node: &Node) -> Flow {
        let Some(target) = node.ident_attr("target") else {
            return Ok(Value::Unknown);
        };

        if let Some(contract) = capability::lookup(target) {
            if !self.runtime.has_permission(contract.permission) {
                self.runtime.deny(contract);
                return Ok(Value::Unknown);
            }
            let args = self.eval_args(&node.children)?;
            return Ok(self.runtime.call_capability(target, args)?);
        }

        let function = match self.lookup(target).or_else(|| self.runtime.env.get(target)) {
            Some(Value::Function(function)) => Rc::clone(function),
            _ => return Ok(Value::Unknown),
        };
        let args = self.eval_args(&node.children)?;
        self.call_function(&function, args)
    }

    fn make_function(&self, node: &Node, name: Option<&str>) -> Value {
        let params = match node.attr("params").and_then(AttrValue::as_text) {
            Some(text) => split_names(text),
            None => return Value::Unknown,
        };
        let body = match node.children.as_slice() {
            [body] if body.is_kind("Block") => body.clone(),
            _ => return Value::Unknown,
        };
        Value::Function(Rc::new(Function {
            params,
            body,
            captured: self.env().clone(),
            name: name.map(str::to_string),
        }))
    }

    /// Callee environment: globals, then the closure itself, then captured
    /// bindings, then parameters.
    fn call_function(&mut self, function: &Rc<Function>, args: Vec<Value>) -> Flow {
        if function.params.len() != args.len() {
            return Ok(Value::Unknown);
        }
        let mut env = self.runtime.env.clone();
        if let Some(name) = &function.name {
            env.insert(name.clone(), Value::Function(Rc::clone(function)));
        }
        env.extend(function.captured.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(function.params.iter().cloned().zip(args));

        self.frames.push(env);
        self.runtime
            .call_stack
            .push(function.name.clone().unwrap_or_else(|| "<fn>".to_string()));
        let result = self.eval(&function.body);
        self.runtime.call_stack.pop();
        self.frames.pop();

        match result {
            Err(Unwind::Return(value)) => Ok(value),
            other => other,
        }
    }

    // ── Modules ─────────────────────────────────────────────────────────

    fn eval_import(&mut self, node: &Node) -> Flow {
        let Some(path) = node.text_attr("path") else {
            return Ok(Value::Unknown);
        };
        let resolved = modules::resolve(&self.runtime.base_dir, path);
        let cached = self.runtime.modules.cache.get(&resolved).cloned();
        let exports = match cached {
            Some(exports) => exports,
            None => match self.load_module(&resolved, node)? {
                Ok(exports) => exports,
                Err(err) => return Ok(Value::node(err)),
            },
        };

        let namespace = modules::namespace_for(&resolved, node.text_attr("as"));
        let env = self.env_mut();
        for (name, value) in exports {
            env.insert(format!("{}.{}", namespace, name), value);
        }
        Ok(Value::Void)
    }

    /// Evaluate a module once. The inner result is the module's exports, or
    /// an `Err` node when it could not be read, parsed or evaluated.
    fn load_module(
        &mut self,
        path: &Path,
        import: &Node,
    ) -> std::result::Result<std::result::Result<Exports, Node>, Unwind> {
        if self.runtime.modules.loading.contains(path) {
            return Err(RuntimeError::ImportCycle {
                path: path.display().to_string(),
            }
            .into());
        }
        let program = match modules::load_source(path, &import.id) {
            Ok(program) => program,
            Err(err) => return Ok(Err(err)),
        };

        self.runtime.modules.loading.insert(path.to_path_buf());
        self.runtime.modules.export_scopes.push(Exports::new());
        let module_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(PathBuf::new);
        let saved_dir = mem::replace(&mut self.runtime.base_dir, module_dir);
        self.frames.push(self.runtime.env.clone());

        let result = self.eval(&program);

        self.frames.pop();
        self.runtime.base_dir = saved_dir;
        let exports = self.runtime.modules.export_scopes.pop().unwrap_or_default();
        self.runtime.modules.loading.remove(path);

        match result {
            Ok(Value::Node(node)) if node.is_err() => return Ok(Err(node.as_ref().clone())),
            Ok(_) | Err(Unwind::Return(_)) => {}
            Err(fatal) => return Err(fatal),
        }
        debug!(path = %path.display(), exports = exports.len(), "module loaded");
        self.runtime.modules.cache.insert(path.to_path_buf(), exports.clone());
        Ok(Ok(exports))
    }

    fn eval_export(&mut self, node: &Node) -> Flow {
        let Some(name) = node.text_attr("name") else {
            return Ok(Value::Unknown);
        };
        let value = match node.children.as_slice() {
            [] => self.lookup(name).cloned().unwrap_or(Value::Unknown),
            [child] => self.eval_bound(child, name)?,
            _ => return Ok(Value::Unknown),
        };
        if let Some(scope) = self.runtime.modules.export_scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
        Ok(Value::Void)
    }
}
