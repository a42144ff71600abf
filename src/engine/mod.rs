//! Reconciliation of the launcher cache with the filesystem.
//!
//! # Overview
//!
//! A refresh cycle runs two phases, always in this order:
//!
//! 1. **Revalidate**: every cached row is checked against its file. Rows
//!    whose file vanished are deleted; rows whose content changed get their
//!    owner re-resolved and are rewritten. Every surviving path is recorded
//!    in a [`VisitedSet`].
//! 2. **Discover**: the applications directory is walked and every launcher
//!    not in the visited set is resolved and inserted.
//!
//! Independently, an install transaction can push launchers of freshly
//! installed packages straight into the cache (see
//! [`ReconciliationEngine::ingest_from_install`]); their owner is already
//! known, so no ownership query is made.
//!
//! # Failure Handling
//!
//! Only a missing store or a backend that cannot answer the phase's query
//! aborts a whole run ([`EngineError`]). Everything else skips the smallest
//! unit of work (one path, one subtree), is logged, counted in the stats,
//! and retried on the next cycle.

pub mod reconcile;
pub mod visited;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::Role;
use crate::cache::CacheError;
use crate::desktop::VisibilityError;
use crate::progress::ProgressCallback;
use crate::resolver::ResolveError;
use crate::scanner::WalkerConfig;

pub use reconcile::ReconciliationEngine;
pub use visited::VisitedSet;

/// Default directory scanned for launcher files.
pub const DEFAULT_APPLICATIONS_DIR: &str = "/usr/share/applications";

/// Errors that abort a whole refresh or ingest.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The engine has no cache store to work on.
    #[error("No cache database is available")]
    StoreUnavailable,

    /// The backend cannot answer the queries this run needs.
    #[error("Package backend does not support {0}")]
    Unsupported(Role),

    /// The store failed while being scanned.
    #[error(transparent)]
    Store(#[from] CacheError),
}

/// Why a single candidate path was skipped.
#[derive(thiserror::Error, Debug)]
pub enum CandidateError {
    /// The file disappeared or could not be read.
    #[error("{0} vanished or is unreadable")]
    Vanished(PathBuf),

    /// No single owning package could be determined.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The launcher could not be loaded to decide visibility.
    #[error(transparent)]
    Visibility(#[from] VisibilityError),

    /// Writing the row failed.
    #[error(transparent)]
    Store(#[from] CacheError),
}

/// Configuration for the reconciliation engine.
#[derive(Clone)]
pub struct EngineConfig {
    /// Root directory walked during discovery.
    pub applications_dir: PathBuf,
    /// Launcher suffix and symlink handling.
    pub walker: WalkerConfig,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("applications_dir", &self.applications_dir)
            .field("walker", &self.walker)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            applications_dir: PathBuf::from(DEFAULT_APPLICATIONS_DIR),
            walker: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl EngineConfig {
    /// Set the directory walked during discovery.
    #[must_use]
    pub fn with_applications_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.applications_dir = dir.into();
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from the revalidation phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevalidateStats {
    /// Rows examined
    pub checked: usize,
    /// Rows whose file content was unchanged
    pub unchanged: usize,
    /// Rows rewritten after a content change
    pub updated: usize,
    /// Rows deleted because the file is gone
    pub removed: usize,
    /// Changed rows left stale because they could not be re-resolved
    pub stale: usize,
    /// Rows skipped because they could not be decoded
    pub malformed: usize,
    /// Whether the phase was interrupted by shutdown
    pub interrupted: bool,
}

/// Statistics from the discovery phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverStats {
    /// Launchers on disk that were not revalidated this cycle
    pub candidates: usize,
    /// New rows written
    pub inserted: usize,
    /// Candidates skipped until the next cycle
    pub skipped: usize,
    /// Subtrees that could not be walked
    pub walk_errors: usize,
    /// Whether the phase was interrupted by shutdown
    pub interrupted: bool,
}

/// Statistics from one install ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Packages whose manifests were requested
    pub packages: usize,
    /// Launcher files found in the manifests
    pub launchers: usize,
    /// Rows written
    pub inserted: usize,
    /// Launchers skipped
    pub skipped: usize,
    /// Whether the manifest query ended with an error
    pub incomplete: bool,
}

/// Outcome of a full refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Revalidation phase statistics
    pub revalidate: RevalidateStats,
    /// Discovery phase statistics
    pub discover: DiscoverStats,
}

impl CycleReport {
    /// Whether the cycle stopped early on shutdown.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.revalidate.interrupted || self.discover.interrupted
    }

    /// Number of store writes the cycle made.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.revalidate.updated + self.revalidate.removed + self.discover.inserted
    }

    /// Number of units of work skipped and left for the next cycle.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.revalidate.stale
            + self.revalidate.malformed
            + self.discover.skipped
            + self.discover.walk_errors
    }
}
