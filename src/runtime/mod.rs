//! Runtime state and the tree-walking evaluator.
//!
//! A `Runtime` owns everything one program run needs: global bindings,
//! the permission set, module state, tracing, the optional debug recorder
//! and the syscall host. It is threaded by `&mut` through every
//! evaluation; nothing here is global.

pub mod config;
pub mod error;
pub mod interpreter;
pub mod meta;
pub mod modules;
pub mod nodes;
pub mod ops;
pub mod value;

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::warn;

use crate::ast::Node;
use crate::capability::host::{StdHost, SyscallHost};
use crate::capability::replay::EventReplay;
use crate::capability::{self, dispatch, Contract};
use crate::debug::DebugRecorder;

pub use config::{RuntimeConfig, DEFAULT_MAX_DEPTH};
pub use error::{Result, RuntimeError};
pub use interpreter::Interpreter;
pub use value::{split_names, Env, Function, Value};

use modules::ModuleState;

pub struct Runtime {
    pub env: Env,
    pub permissions: HashSet<String>,
    /// Names `Let` may not rebind.
    pub read_only: HashSet<String>,
    /// Directory relative `Import` paths resolve against.
    pub base_dir: PathBuf,
    pub strict: bool,
    pub max_depth: usize,
    pub trace: bool,
    pub trace_steps: Vec<Node>,
    pub call_stack: Vec<String>,
    pub recorder: Option<DebugRecorder>,
    pub replay: Option<EventReplay>,
    pub host: Box<dyn SyscallHost>,
    pub(crate) modules: ModuleState,
    pub(crate) depth: usize,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_host(Box::new(StdHost::new()))
    }

    pub fn with_host(host: Box<dyn SyscallHost>) -> Self {
        Self::from_config(RuntimeConfig::default(), host)
    }

    pub fn from_config(config: RuntimeConfig, host: Box<dyn SyscallHost>) -> Self {
        Self {
            env: Env::new(),
            permissions: config.permissions,
            read_only: HashSet::new(),
            base_dir: config.base_dir,
            strict: config.strict,
            max_depth: config.max_depth,
            trace: config.trace,
            trace_steps: Vec::new(),
            call_stack: Vec::new(),
            recorder: config.debug_seed.as_deref().map(DebugRecorder::from_seed),
            replay: None,
            host,
            modules: ModuleState::default(),
            depth: 0,
        }
    }

    pub fn grant(&mut self, permission: &str) {
        self.permissions.insert(permission.to_string());
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Forget cached modules and loading state between independent runs.
    pub fn reset_modules(&mut self) {
        self.modules = ModuleState::default();
    }

    /// Record a denied call. The caller returns Unknown without evaluating
    /// arguments.
    pub(crate) fn deny(&mut self, contract: &Contract) {
        warn!(callee = contract.target, permission = contract.permission, "capability denied");
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_syscall(contract.target, &[], "unknown", "denied");
        }
    }

    /// Invoke a capability-table target with evaluated arguments.
    ///
    /// Unknown targets, missing permissions and ill-typed arguments yield
    /// Unknown. Host failures are fatal.
    pub fn call_capability(&mut self, target: &str, args: Vec<Value>) -> Result<Value> {
        let Some(contract) = capability::lookup(target) else {
            return Ok(Value::Unknown);
        };
        if !self.has_permission(contract.permission) {
            self.deny(contract);
            return Ok(Value::Unknown);
        }
        // Unknown passes the static check but never reaches the host.
        let kinds: Vec<_> = args.iter().map(Value::kind).collect();
        if args.iter().any(Value::is_unknown) || !contract.check(&kinds).is_empty() {
            self.record_syscall(target, &args, &Value::Unknown, "rejected");
            return Ok(Value::Unknown);
        }

        if contract.is_meta() {
            let result = meta::invoke(self, target, &args)?;
            self.record_syscall(target, &args, &result, "ok");
            return Ok(result);
        }

        let replayed = target == "sys.ui_pollEvent" && self.replay.is_some();
        let outcome = dispatch::invoke(self.host.as_mut(), self.replay.as_mut(), target, &args);
        match outcome {
            Ok(result) => {
                let phase = if replayed { "replay" } else { "ok" };
                self.record_syscall(target, &args, &result, phase);
                Ok(result)
            }
            Err(source) => {
                warn!(callee = target, error = %source, "host call failed");
                self.record_syscall(target, &args, &Value::Unknown, "failed");
                Err(RuntimeError::Host {
                    target: target.to_string(),
                    source,
                })
            }
        }
    }

    fn record_syscall(&mut self, target: &str, args: &[Value], result: &Value, phase: &str) {
        if let Some(recorder) = self.recorder.as_mut() {
            let rendered: Vec<String> = args.iter().map(Value::render).collect();
            recorder.record_syscall(target, &rendered, &result.render(), phase);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a `Program` against the runtime's global environment.
pub fn evaluate_program(program: &Node, runtime: &mut Runtime) -> Result<Value> {
    Interpreter::new(runtime).evaluate(program)
}

/// Evaluate a single expression node against the global environment.
pub fn evaluate_expression(expr: &Node, runtime: &mut Runtime) -> Result<Value> {
    Interpreter::new(runtime).evaluate(expr)
}
