//! The package-management subsystem, seen from the cache.
//!
//! A [`PackageBackend`] answers two kinds of query: which installed package
//! owns these files ([`PackageBackend::search_files`]) and which files does
//! this package ship ([`PackageBackend::get_files`]). Answers are not return
//! values. The backend pushes [`BackendEvent`]s into the [`EventSink`] it was
//! handed, possibly from another thread, and closes every query with exactly
//! one [`BackendEvent::Finished`].
//!
//! The blocking, timeout-guarded view of this protocol lives in
//! [`crate::resolver`].

pub mod native;
pub mod package;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

pub use native::{NativeBackend, PackageTool};
pub use package::{ExitStatus, Filter, InfoKind, PackageId, PackageIdError, PackageInfo, Role};

/// One message in a query's answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A package matched the query
    Package(PackageInfo),
    /// The file manifest of one package
    Files {
        /// Package the files belong to
        package_id: PackageId,
        /// Absolute paths installed by the package
        files: Vec<PathBuf>,
    },
    /// Terminal event; nothing follows it
    Finished(ExitStatus),
}

/// Write end of a query's answer stream.
///
/// Sends never block. Events sent after the querying side stopped listening
/// (for instance after a timeout) are dropped. Backends doing slow work should
/// poll [`EventSink::is_cancelled`] and stop once it is set.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<BackendEvent>,
    cancelled: Arc<AtomicBool>,
}

impl EventSink {
    /// Wrap the sending half of a query channel.
    #[must_use]
    pub fn new(tx: Sender<BackendEvent>) -> Self {
        Self {
            tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag with the querying side.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Whether the querying side has stopped waiting for this answer.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn send(&self, event: BackendEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("Dropping backend event, query no longer listening");
        }
    }

    /// Report a matching package.
    pub fn package(&self, info: PackageInfo) {
        self.send(BackendEvent::Package(info));
    }

    /// Report the files of a package.
    pub fn files(&self, package_id: PackageId, files: Vec<PathBuf>) {
        self.send(BackendEvent::Files { package_id, files });
    }

    /// Close the query with a terminal status.
    pub fn finished(self, status: ExitStatus) {
        self.send(BackendEvent::Finished(status));
    }
}

/// Errors raised when a query cannot even be submitted.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    /// The backend does not implement the requested operation.
    #[error("Backend does not support {0}")]
    Unsupported(Role),

    /// The backend could not start working on the query.
    #[error("Failed to submit {role} query: {reason}")]
    Submit {
        /// Operation that was being submitted
        role: Role,
        /// Why it failed
        reason: String,
    },
}

/// The external package-management subsystem.
pub trait PackageBackend: Send {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Whether the backend implements `role`.
    fn supports(&self, role: Role) -> bool;

    /// Find the packages owning `paths`, streaming matches into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the query could not be started. No events
    /// are expected on `sink` in that case.
    fn search_files(
        &mut self,
        filter: Filter,
        paths: &[PathBuf],
        sink: EventSink,
    ) -> Result<(), BackendError>;

    /// List the files of `package_ids`, streaming manifests into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the query could not be started.
    fn get_files(&mut self, package_ids: &[PackageId], sink: EventSink)
        -> Result<(), BackendError>;
}
