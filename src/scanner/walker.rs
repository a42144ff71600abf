//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for enumerating launcher files
//! under an applications directory. Traversal is depth-first with entries
//! sorted by file name, so the yielded order is the directory-tree order.
//!
//! # Features
//!
//! - Suffix filtering (`.desktop` by default)
//! - Configurable symlink following with cycle detection
//! - A directory reached twice through different links is walked once
//! - Unreadable directories are reported and skipped, siblings still walked
//! - Graceful shutdown via atomic flag

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::{ScanError, WalkerConfig};

/// Directory walker for launcher file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker will stop iteration
    /// as soon as possible.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the directory tree, yielding launcher file paths.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration; the failing subtree is skipped.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use launchcache::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} launchers", files.len());
    /// ```
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, ScanError>> + '_ {
        let mut entries = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter();
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();

        std::iter::from_fn(move || loop {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            let entry = match entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(self.handle_walk_error(e))),
            };

            if entry.file_type().is_dir() {
                match entry.path().canonicalize() {
                    Ok(canonical) => {
                        if !seen_dirs.insert(canonical) {
                            log::debug!(
                                "Skipping directory already walked: {}",
                                entry.path().display()
                            );
                            entries.skip_current_dir();
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to resolve {}: {}", entry.path().display(), e);
                        entries.skip_current_dir();
                    }
                }
                continue;
            }

            if !is_regular_file(&entry) {
                log::trace!("Ignoring special file: {}", entry.path().display());
                continue;
            }

            let path = entry.into_path();
            if !self.config.matches(&path) {
                log::trace!("Ignoring non-launcher file: {}", path.display());
                continue;
            }

            return Some(Ok(path));
        })
    }

    /// Convert a walkdir error into a [`ScanError`], logging it.
    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if let Some(ancestor) = error.loop_ancestor() {
            log::warn!(
                "Symlink loop detected at {} (points to {})",
                path.display(),
                ancestor.display()
            );
            return ScanError::Loop {
                ancestor: ancestor.to_path_buf(),
                path,
            };
        }

        match error.io_error().map(std::io::Error::kind) {
            Some(ErrorKind::PermissionDenied) => {
                log::warn!("Failed to open directory {}: permission denied", path.display());
                ScanError::PermissionDenied(path)
            }
            Some(ErrorKind::NotFound) => {
                log::warn!("Failed to open directory {}: not found", path.display());
                ScanError::NotFound(path)
            }
            _ => {
                log::warn!("Failed to open directory {}: {}", path.display(), error);
                ScanError::Io {
                    path,
                    source: std::io::Error::from(error),
                }
            }
        }
    }
}

/// Whether `entry` is, or links to, a regular file.
///
/// FIFOs and device nodes are never yielded: reading them can block forever.
fn is_regular_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_symlink() {
        return std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file());
    }
    file_type.is_file()
}
