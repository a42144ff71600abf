//! Paths already reconciled during one refresh cycle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Paths handled by revalidation, so discovery does not treat them as new.
///
/// Lives for exactly one cycle and is never persisted.
#[derive(Debug, Default)]
pub struct VisitedSet {
    paths: HashSet<PathBuf>,
}

impl VisitedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as reconciled. Returns `false` if it already was.
    pub fn insert(&mut self, path: &Path) -> bool {
        self.paths.insert(path.to_path_buf())
    }

    /// Whether `path` was reconciled this cycle.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Number of reconciled paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing was reconciled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
