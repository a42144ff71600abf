//! Cache entry definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A single launcher file in the cache.
///
/// When `fingerprint` is non-empty it is the fingerprint the file had at the
/// moment the row was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute path of the launcher file (unique key)
    pub path: PathBuf,
    /// Name of the installed package that owns the file
    pub package: String,
    /// Whether the launcher is shown in application listings
    pub visible: bool,
    /// Content fingerprint at write time
    pub fingerprint: Fingerprint,
}

impl CacheEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        package: impl Into<String>,
        visible: bool,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            path: path.into(),
            package: package.into(),
            visible,
            fingerprint,
        }
    }
}
