use std::collections::HashSet;
use std::path::PathBuf;

/// Evaluation depth ceiling used when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// Knobs a driver sets before constructing a `Runtime`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub permissions: HashSet<String>,
    pub strict: bool,
    pub trace: bool,
    pub max_depth: usize,
    pub base_dir: PathBuf,
    /// Attaches a debug recorder when set.
    pub debug_seed: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            permissions: HashSet::from(["math".to_string()]),
            strict: false,
            trace: false,
            max_depth: DEFAULT_MAX_DEPTH,
            base_dir: PathBuf::from("."),
            debug_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Add permissions to the default `{"math"}` set.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }
}
