//! Module state for `Import`/`Export`.
//!
//! Modules are keyed by canonical path. A path in the loading set is being
//! evaluated further up the stack, so importing it again is a cycle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::{err_node, Node};
use crate::parser;

/// Exported name → value, in name order.
pub type Exports = BTreeMap<String, super::Value>;

#[derive(Default)]
pub(crate) struct ModuleState {
    pub cache: HashMap<PathBuf, Exports>,
    pub loading: HashSet<PathBuf>,
    /// One scope per module being loaded; `Export` writes to the top.
    pub export_scopes: Vec<Exports>,
}

/// Resolve an import path against `base_dir`, canonicalizing when the file
/// exists so different spellings share one cache entry.
pub fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let joined = base_dir.join(path);
    joined.canonicalize().unwrap_or(joined)
}

/// Namespace bound by an import: the `as` attribute or the file stem.
pub fn namespace_for(path: &Path, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => alias.to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Read and parse a module. Failures come back as an `Err` node value.
pub fn load_source(path: &Path, import_id: &str) -> Result<Node, Node> {
    debug!(path = %path.display(), "loading module");
    let text = std::fs::read_to_string(path).map_err(|e| {
        err_node(
            "err0",
            "RUN010",
            &format!("cannot read module '{}': {}", path.display(), e),
            import_id,
        )
    })?;
    let parsed = parser::parse(&text);
    if let Some(diag) = parsed.diagnostics.first() {
        return Err(err_node(
            "err0",
            "RUN011",
            &format!("module '{}' failed to parse: {}", path.display(), diag),
            import_id,
        ));
    }
    match parsed.root {
        Some(root) if root.is_kind("Program") => Ok(root),
        Some(root) => Err(err_node(
            "err0",
            "RUN011",
            &format!("module '{}' must be a Program, found {}", path.display(), root.kind),
            import_id,
        )),
        None => Err(err_node(
            "err0",
            "RUN011",
            &format!("module '{}' is empty", path.display()),
            import_id,
        )),
    }
}
