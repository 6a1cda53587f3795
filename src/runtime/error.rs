//! Fatal evaluation errors.
//!
//! These abort the run immediately. They are distinct from diagnostics
//! (returned as data) and from `Err` node values (propagated by sequence
//! short-circuiting).

use thiserror::Error;

use crate::ast::{err_node, Node};
use crate::capability::host::HostError;
use crate::vm::VmError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot rebind read-only name '{name}'")]
    ReadOnlyBinding { name: String, node_id: String },

    #[error("maximum evaluation depth ({limit}) exceeded")]
    DepthExceeded { limit: usize, node_id: String },

    #[error("node '{node_id}' evaluated to unknown in strict mode")]
    StrictUnknown { node_id: String },

    #[error("import cycle detected at '{path}'")]
    ImportCycle { path: String },

    #[error("host call {target} failed: {source}")]
    Host {
        target: String,
        #[source]
        source: HostError,
    },

    #[error(transparent)]
    Vm(#[from] VmError),
}

impl RuntimeError {
    pub fn code(&self) -> &str {
        match self {
            RuntimeError::ReadOnlyBinding { .. } => "RUN001",
            RuntimeError::DepthExceeded { .. } => "RUN002",
            RuntimeError::StrictUnknown { .. } => "RUN003",
            RuntimeError::ImportCycle { .. } => "RUN004",
            RuntimeError::Host { .. } => "RUN005",
            RuntimeError::Vm(err) => err.code(),
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            RuntimeError::ReadOnlyBinding { node_id, .. }
            | RuntimeError::DepthExceeded { node_id, .. }
            | RuntimeError::StrictUnknown { node_id } => node_id,
            RuntimeError::Vm(err) => err.node_id(),
            RuntimeError::ImportCycle { .. } | RuntimeError::Host { .. } => "",
        }
    }

    /// Top-level `Err` node a driver reports for this failure.
    pub fn to_err_node(&self) -> Node {
        err_node("err0", self.code(), &self.to_string(), self.node_id())
    }
}
