//! JSON output formatter for cache listings.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "launchers": [
//!     {
//!       "path": "/usr/share/applications/foo.desktop",
//!       "package": "foo",
//!       "visible": true,
//!       "fingerprint": "af1349b9..."
//!     }
//!   ],
//!   "summary": {
//!     "total": 1,
//!     "visible": 1,
//!     "packages": 1,
//!     "malformed": 0
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::io::Write;

use serde::Serialize;

use crate::cache::CacheEntry;

/// Summary counts in JSON format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JsonSummary {
    /// Number of launchers listed
    pub total: usize,
    /// Launchers that should appear in menus
    pub visible: usize,
    /// Distinct owning packages
    pub packages: usize,
    /// Rows that could not be decoded and were left out
    pub malformed: usize,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Cached launchers in storage order
    pub launchers: &'a [CacheEntry],
    /// Summary counts
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Create a new JSON output from cache rows.
    #[must_use]
    pub fn new(entries: &'a [CacheEntry], malformed: usize) -> Self {
        let packages: HashSet<&str> = entries.iter().map(|e| e.package.as_str()).collect();
        Self {
            launchers: entries,
            summary: JsonSummary {
                total: entries.len(),
                visible: entries.iter().filter(|e| e.visible).count(),
                packages: packages.len(),
                malformed,
            },
        }
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
