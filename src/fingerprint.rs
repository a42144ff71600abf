//! Content fingerprints for launcher files.
//!
//! # Overview
//!
//! A [`Fingerprint`] is the BLAKE3 digest of a file's full content, stored
//! as lower-case hex text. It only has to answer one question: did the bytes
//! of a cached launcher file change since the row was written?
//!
//! [`Fingerprinter::fingerprint`] folds every failure into `None`, which the
//! reconciliation engine treats as "file gone". Use
//! [`Fingerprinter::try_fingerprint`] when the difference between a missing
//! file and an unreadable one matters.
//!
//! # Example
//!
//! ```no_run
//! use launchcache::fingerprint::Fingerprinter;
//! use std::path::Path;
//!
//! let fingerprinter = Fingerprinter::new();
//! match fingerprinter.fingerprint(Path::new("/usr/share/applications/firefox.desktop")) {
//!     Some(fp) => println!("{fp}"),
//!     None => println!("file is gone"),
//! }
//! ```

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Hex-encoded content digest of a launcher file.
///
/// An empty fingerprint is legal in the store and means "no usable
/// fingerprint was recorded"; it never matches a computed one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an in-memory buffer.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Wrap a fingerprint previously read back from the store.
    #[must_use]
    pub fn from_stored(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The hex text as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the "nothing recorded" placeholder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur while fingerprinting a file.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path exists but is not a regular file (a FIFO or device node,
    /// for instance). Such files are never read.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Computes content fingerprints for files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Create a new fingerprinter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint a file, distinguishing "missing" from "unreadable".
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError`] if the file exists but cannot be read.
    pub fn try_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>, FingerprintError> {
        // Checked before opening: opening a FIFO for reading blocks.
        match fs::metadata(path) {
            Ok(meta) if !meta.is_file() => {
                return Err(FingerprintError::NotAFile(path.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) => return read_failure(path, e),
        }
        match fs::read(path) {
            Ok(data) => Ok(Some(Fingerprint::of_bytes(&data))),
            Err(e) => read_failure(path, e),
        }
    }

    /// Fingerprint a file, treating read failures like a missing file.
    ///
    /// Read failures are logged as warnings. A fingerprint is never
    /// invented for content that could not be read.
    #[must_use]
    pub fn fingerprint(&self, path: &Path) -> Option<Fingerprint> {
        match self.try_fingerprint(path) {
            Ok(fp) => fp,
            Err(e) => {
                log::warn!("Failed to fingerprint {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn read_failure(
    path: &Path,
    error: std::io::Error,
) -> Result<Option<Fingerprint>, FingerprintError> {
    match error.kind() {
        ErrorKind::NotFound => Ok(None),
        ErrorKind::PermissionDenied => {
            Err(FingerprintError::PermissionDenied(path.to_path_buf()))
        }
        _ => Err(FingerprintError::Io {
            path: path.to_path_buf(),
            source: error,
        }),
    }
}
