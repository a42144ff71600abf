//! Blocking client for the package backend's event protocol.
//!
//! # Overview
//!
//! [`ResolverClient`] turns the backend's submit-then-stream protocol into
//! plain function calls:
//!
//! 1. **Submit**: a fresh channel is created and its sending half is handed
//!    to the backend along with the query.
//! 2. **Collect**: events are received in order until the terminal
//!    `Finished` event or until the per-query deadline passes.
//!
//! Queries are single-flight: every method takes `&mut self`, so a second
//! query cannot start while one is being collected. Each query owns its
//! channel, so events a backend sends after a timeout land in a dropped
//! receiver instead of being attributed to the next query. Dropping the
//! receiving side also raises the sink's cancellation flag, which tells the
//! backend to abandon the work.
//!
//! # Validation
//!
//! An ownership answer is accepted only if exactly one package matched.
//! Zero matches and several matches are both failures; the cache never
//! records partial or ambiguous ownership.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::backend::{
    BackendError, BackendEvent, EventSink, ExitStatus, Filter, PackageBackend, PackageId,
    PackageInfo, Role,
};

/// Default time to wait for a query's terminal event.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reasons an ownership or manifest query produced no usable answer.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// No installed package owns the path.
    #[error("No package owns {0}")]
    Empty(PathBuf),

    /// More than one package claims the path.
    #[error("{count} packages claim {path}")]
    Ambiguous {
        /// Path that was queried
        path: PathBuf,
        /// Number of matches received
        count: usize,
    },

    /// The backend finished the query with a non-success status.
    #[error("{role} query finished with status {status}")]
    Backend {
        /// Operation that failed
        role: Role,
        /// Terminal status reported by the backend
        status: ExitStatus,
    },

    /// The terminal event did not arrive in time.
    #[error("{role} query timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out
        role: Role,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// The backend dropped the query without a terminal event.
    #[error("{0} query abandoned by the backend")]
    Disconnected(Role),

    /// The query could not be submitted.
    #[error(transparent)]
    Submit(#[from] BackendError),
}

/// Files reported for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFiles {
    /// Package the manifest belongs to
    pub package_id: PackageId,
    /// Absolute paths installed by the package
    pub files: Vec<PathBuf>,
}

/// Result of a manifest query.
///
/// Manifests that arrived before a failure are still returned; `error`
/// says why the stream ended early.
#[derive(Debug, Default)]
pub struct FileManifest {
    /// Manifests received, in arrival order
    pub packages: Vec<PackageFiles>,
    /// Set when the query did not finish successfully
    pub error: Option<ResolveError>,
}

/// Single-flight client over a [`PackageBackend`].
pub struct ResolverClient {
    backend: Box<dyn PackageBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for ResolverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverClient")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResolverClient {
    /// Create a client with the default query timeout.
    #[must_use]
    pub fn new(backend: Box<dyn PackageBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set the per-query timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-query timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the backend implements `role`.
    #[must_use]
    pub fn supports(&self, role: Role) -> bool {
        self.backend.supports(role)
    }

    /// Resolve the single installed package that owns `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Empty`] or [`ResolveError::Ambiguous`] unless
    /// exactly one package matched, or the transport error that ended the
    /// query.
    pub fn resolve_owner(&mut self, path: &Path) -> Result<PackageInfo, ResolveError> {
        let mut matches = self.search_owners(&[path.to_path_buf()])?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(ResolveError::Empty(path.to_path_buf())),
            count => Err(ResolveError::Ambiguous {
                path: path.to_path_buf(),
                count,
            }),
        }
    }

    /// Run one ownership query and return every match in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the query fails, times out, or is
    /// abandoned; matches received before that are discarded.
    pub fn search_owners(&mut self, paths: &[PathBuf]) -> Result<Vec<PackageInfo>, ResolveError> {
        let (sink, pending) = channel();
        self.backend.search_files(Filter::Installed, paths, sink)?;

        let mut matches = Vec::new();
        let result = self.collect(Role::SearchFile, &pending.rx, |event| match event {
            BackendEvent::Package(info) => {
                log::trace!("search-file match: {}", info.id);
                matches.push(info);
            }
            BackendEvent::Files { package_id, .. } => {
                log::trace!("Ignoring file list for {package_id} during search-file");
            }
            BackendEvent::Finished(_) => {}
        });
        result.map(|()| matches)
    }

    /// List the files of `package_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Submit`] if the query could not be started.
    /// Later failures are reported in [`FileManifest::error`].
    pub fn list_files(&mut self, package_ids: &[PackageId]) -> Result<FileManifest, ResolveError> {
        let (sink, pending) = channel();
        self.backend.get_files(package_ids, sink)?;

        let mut manifest = FileManifest::default();
        let result = self.collect(Role::GetFiles, &pending.rx, |event| match event {
            BackendEvent::Files { package_id, files } => {
                manifest.packages.push(PackageFiles { package_id, files });
            }
            BackendEvent::Package(info) => {
                log::trace!("Ignoring package {} during get-files", info.id);
            }
            BackendEvent::Finished(_) => {}
        });
        manifest.error = result.err();
        Ok(manifest)
    }

    /// Drain `rx` until the terminal event, feeding every event to `on_event`.
    fn collect<F>(
        &self,
        role: Role,
        rx: &Receiver<BackendEvent>,
        mut on_event: F,
    ) -> Result<(), ResolveError>
    where
        F: FnMut(BackendEvent),
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            match rx.recv_deadline(deadline) {
                Ok(BackendEvent::Finished(status)) => {
                    return if status == ExitStatus::Success {
                        Ok(())
                    } else {
                        log::warn!("{} {} failed with exit code: {}", self.backend.name(), role, status);
                        Err(ResolveError::Backend { role, status })
                    };
                }
                Ok(event) => on_event(event),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "{} {} gave no answer within {:?}",
                        self.backend.name(),
                        role,
                        self.timeout
                    );
                    return Err(ResolveError::Timeout {
                        role,
                        timeout: self.timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("{} {} ended without finishing", self.backend.name(), role);
                    return Err(ResolveError::Disconnected(role));
                }
            }
        }
    }
}

/// Receiving side of one query. Dropping it cancels the query.
struct Pending {
    rx: Receiver<BackendEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn channel() -> (EventSink, Pending) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancelled = Arc::new(AtomicBool::new(false));
    let sink = EventSink::new(tx).with_cancel_flag(Arc::clone(&cancelled));
    (sink, Pending { rx, cancelled })
}
