//! Persistent launcher cache.
//!
//! This module maps launcher file paths to the package that installed them,
//! together with a visibility flag and a content fingerprint.
//!
//! # Architecture
//!
//! The cache is split into two main components:
//!
//! * [`database`]: SQLite persistence behind the [`CacheStore`] trait.
//! * [`entry`]: The row model stored in the cache.
//!
//! # Write Semantics
//!
//! Every write replaces a whole row. [`CacheStore::upsert`] deletes any row
//! for the path and inserts the new one in a single transaction, so old and
//! new fields are never merged.

pub mod database;
pub mod entry;

use std::path::Path;

pub use database::{CacheDatabase, CacheError, CacheResult};
pub use entry::CacheEntry;

/// Storage operations the reconciliation engine relies on.
pub trait CacheStore {
    /// Look up the row for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be queried.
    fn get(&self, path: &Path) -> CacheResult<Option<CacheEntry>>;

    /// Replace any row for `entry.path` with `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    fn upsert(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Remove the row for `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    fn delete(&self, path: &Path) -> CacheResult<()>;

    /// Snapshot every row in the store.
    ///
    /// The outer error means the store could not be read at all. Inner
    /// errors are individual rows that could not be decoded; callers skip
    /// them and keep going.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the scan query cannot run.
    fn scan_all(&self) -> CacheResult<Vec<CacheResult<CacheEntry>>>;
}
