//! Scanner module for launcher file discovery.
//!
//! This module provides functionality for:
//! - Depth-first directory walking using walkdir
//! - Launcher suffix filtering
//! - Symlink cycle protection
//!
//! # Example
//!
//! ```no_run
//! use launchcache::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/usr/share/applications"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(path) => println!("{}", path.display()),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod walker;

use std::path::PathBuf;

pub use walker::Walker;

/// File name suffix of freedesktop launcher files.
pub const DEFAULT_SUFFIX: &str = ".desktop";

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Only files whose name ends with this suffix are yielded.
    pub suffix: String,

    /// Follow symbolic links during traversal.
    /// Directory cycles are detected and skipped.
    pub follow_symlinks: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            follow_symlinks: true,
        }
    }
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(suffix: impl Into<String>, follow_symlinks: bool) -> Self {
        Self {
            suffix: suffix.into(),
            follow_symlinks,
        }
    }

    /// Whether a file name carries the launcher suffix.
    #[must_use]
    pub fn matches(&self, path: &std::path::Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(self.suffix.as_str()))
    }
}

/// Errors that can occur during directory scanning.
///
/// None of these stop a walk; only the affected subtree is skipped.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A symbolic link points back to one of its ancestors.
    #[error("Symlink loop at {path} (ancestor {ancestor})")]
    Loop {
        /// Path of the offending link
        path: PathBuf,
        /// Directory the link leads back to
        ancestor: PathBuf,
    },

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
