//! SQLite-backed launcher cache database.
//!
//! The on-disk layout is a single `cache` table:
//!
//! | column        | type    | meaning                         |
//! |---------------|---------|---------------------------------|
//! | `path`        | TEXT    | launcher file path (logical key) |
//! | `package`     | TEXT    | owning package name             |
//! | `visible`     | INTEGER | 0 or 1                          |
//! | `fingerprint` | TEXT    | hex content fingerprint         |
//!
//! Every statement is parameterised, deletes included.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{CacheEntry, CacheStore};
use crate::fingerprint::Fingerprint;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache (
    path TEXT,
    package TEXT,
    visible INTEGER,
    fingerprint TEXT
)";

/// Errors that can occur while using the cache database.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file could not be opened or initialised.
    #[error("Failed to open cache database {path}: {source}")]
    Open {
        /// Location of the database file
        path: PathBuf,
        /// The underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// A path cannot be stored because it is not valid UTF-8.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// A row in the table is missing a required column.
    #[error("Malformed cache row {rowid}: {reason}")]
    MalformedRow {
        /// SQLite rowid of the offending row
        rowid: i64,
        /// What was missing
        reason: &'static str,
    },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Persistent launcher cache stored in SQLite.
pub struct CacheDatabase {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for CacheDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CacheDatabase {
    /// Open the cache at `path`, creating the file and table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] if the file is not a usable SQLite
    /// database or the parent directory cannot be created.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create {}: {}", parent.display(), e);
            }
        }

        log::debug!("Trying to open cache database '{}'", path.display());
        let conn = Connection::open(path).map_err(|source| CacheError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn, Some(path.to_path_buf())).map_err(|e| match e {
            CacheError::Database(source) => CacheError::Open {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Open a throwaway cache that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> CacheResult<Self> {
        conn.execute(CREATE_TABLE, [])?;
        // The cache can always be rebuilt, so skip fsync on every write.
        conn.pragma_update(None, "synchronous", "OFF")?;
        Ok(Self { conn, path })
    }

    /// Location of the database file, `None` for in-memory caches.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of rows in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the count query fails.
    pub fn len(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the cache has no rows.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the count query fails.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Close the connection, flushing any pending state.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if SQLite refuses to close.
    pub fn close(self) -> CacheResult<()> {
        self.conn.close().map_err(|(_, e)| CacheError::Database(e))
    }
}

fn path_text(path: &Path) -> CacheResult<&str> {
    path.to_str()
        .ok_or_else(|| CacheError::NonUtf8Path(path.to_path_buf()))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheResult<CacheEntry>> {
    let rowid: i64 = row.get(0)?;
    let path: Option<String> = row.get(1)?;
    let package: Option<String> = row.get(2)?;
    let visible: Option<i64> = row.get(3)?;
    let fingerprint: Option<String> = row.get(4)?;

    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Ok(Err(CacheError::MalformedRow {
            rowid,
            reason: "missing path",
        }));
    };

    // A row without a fingerprint is still a row: it never matches a computed
    // fingerprint, so it is either deleted or re-resolved.
    Ok(Ok(CacheEntry {
        path: PathBuf::from(path),
        package: package.unwrap_or_default(),
        visible: visible.unwrap_or(0) != 0,
        fingerprint: fingerprint.map(Fingerprint::from_stored).unwrap_or_default(),
    }))
}

impl CacheStore for CacheDatabase {
    fn get(&self, path: &Path) -> CacheResult<Option<CacheEntry>> {
        let key = path_text(path)?;
        let row = self
            .conn
            .query_row(
                "SELECT rowid, path, package, visible, fingerprint FROM cache WHERE path = ?1 LIMIT 1",
                params![key],
                entry_from_row,
            )
            .optional()?;
        row.transpose()
    }

    fn upsert(&self, entry: &CacheEntry) -> CacheResult<()> {
        let key = path_text(&entry.path)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cache WHERE path = ?1", params![key])?;
        tx.execute(
            "INSERT INTO cache (path, package, visible, fingerprint) VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                entry.package,
                i64::from(entry.visible),
                entry.fingerprint.as_str()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> CacheResult<()> {
        let key = path_text(path)?;
        self.conn
            .execute("DELETE FROM cache WHERE path = ?1", params![key])?;
        Ok(())
    }

    fn scan_all(&self) -> CacheResult<Vec<CacheResult<CacheEntry>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT rowid, path, package, visible, fingerprint FROM cache ORDER BY rowid")?;
        let rows = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
