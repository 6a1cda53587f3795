//! Static validation: a structural pass, then a flow pass computing value
//! kinds and checking capability contracts and permissions.

pub mod checker;
pub mod structure;

use std::collections::HashSet;

use crate::ast::{Diagnostic, Node};

pub use checker::{TypeEnv, Validator};

/// Validate `root` against `permissions`. `env_types` seeds the type
/// environment, e.g. with a REPL session's bindings.
pub fn validate(
    root: &Node,
    env_types: Option<&TypeEnv>,
    permissions: &HashSet<String>,
    run_structural: bool,
) -> Vec<Diagnostic> {
    Validator::new().validate(root, env_types, permissions, run_structural)
}
