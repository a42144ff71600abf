//! Output formatters for cache listings.
//!
//! - Text: one tab-separated line per launcher, for humans and `cut`
//! - JSON: rows plus summary counts, for scripting

pub mod json;

use std::io::Write;

use crate::cache::CacheEntry;

pub use json::{JsonOutput, JsonOutputError, JsonSummary};

/// Write `entries` as `path<TAB>package<TAB>visible|hidden` lines.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_text<W: Write>(writer: &mut W, entries: &[CacheEntry]) -> std::io::Result<()> {
    for entry in entries {
        writeln!(
            writer,
            "{}\t{}\t{}",
            entry.path.display(),
            entry.package,
            if entry.visible { "visible" } else { "hidden" }
        )?;
    }
    Ok(())
}
