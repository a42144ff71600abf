//! Launcher visibility.
//!
//! The reconciliation engine only needs one bit out of a launcher file:
//! should it show up in user-facing application listings? That question is
//! answered by a [`VisibilityOracle`]. [`DesktopEntryOracle`] answers it by
//! reading the `[Desktop Entry]` group of a freedesktop desktop-entry file.
//!
//! A file the oracle cannot load is an error for that path only; the engine
//! never writes a cache row without a visibility value.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the group every launcher file must start with.
pub const DESKTOP_ENTRY_GROUP: &str = "Desktop Entry";

/// Errors produced while deciding visibility for a launcher file.
#[derive(thiserror::Error, Debug)]
pub enum VisibilityError {
    /// The file could not be read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path of the launcher file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with a `[Desktop Entry]` group.
    #[error("{0} has no [Desktop Entry] group")]
    MissingGroup(PathBuf),

    /// The entry describes something other than an application.
    #[error("{0} is not an application entry")]
    NotApplication(PathBuf),

    /// The file is not a valid key file.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        /// Path of the launcher file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },
}

/// Decides whether a launcher file should be shown to end users.
pub trait VisibilityOracle {
    /// Returns the visibility flag for the launcher at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VisibilityError`] if the file cannot be loaded as a launcher.
    fn is_visible(&self, path: &Path) -> Result<bool, VisibilityError>;
}

/// Visibility oracle backed by the freedesktop desktop-entry format.
///
/// An entry is hidden when it sets `NoDisplay=true` or `Hidden=true`, or
/// when its `OnlyShowIn`/`NotShowIn` lists exclude every current desktop.
#[derive(Debug, Clone, Default)]
pub struct DesktopEntryOracle {
    current_desktops: Vec<String>,
}

impl DesktopEntryOracle {
    /// Create an oracle for the desktops named in `XDG_CURRENT_DESKTOP`.
    #[must_use]
    pub fn from_env() -> Self {
        let desktops = std::env::var("XDG_CURRENT_DESKTOP").unwrap_or_default();
        Self::with_desktops(desktops.split(':').filter(|d| !d.is_empty()))
    }

    /// Create an oracle for an explicit list of current desktops.
    #[must_use]
    pub fn with_desktops<I, S>(desktops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            current_desktops: desktops.into_iter().map(Into::into).collect(),
        }
    }

    /// Decide visibility from already-loaded file content.
    ///
    /// # Errors
    ///
    /// Returns [`VisibilityError`] if `content` is not a loadable application entry.
    pub fn visibility_of(&self, path: &Path, content: &str) -> Result<bool, VisibilityError> {
        let entry = parse_desktop_group(path, content)?;

        if entry.get("Type").map(String::as_str) != Some("Application") {
            return Err(VisibilityError::NotApplication(path.to_path_buf()));
        }

        if parse_bool(path, &entry, "NoDisplay") || parse_bool(path, &entry, "Hidden") {
            return Ok(false);
        }

        let only_show_in = entry.get("OnlyShowIn").map(|v| split_list(v));
        let not_show_in = entry.get("NotShowIn").map(|v| split_list(v));

        for desktop in &self.current_desktops {
            if only_show_in
                .as_ref()
                .is_some_and(|list| list.contains(&desktop.as_str()))
            {
                return Ok(true);
            }
            if not_show_in
                .as_ref()
                .is_some_and(|list| list.contains(&desktop.as_str()))
            {
                return Ok(false);
            }
        }

        Ok(only_show_in.is_none())
    }
}

impl VisibilityOracle for DesktopEntryOracle {
    fn is_visible(&self, path: &Path) -> Result<bool, VisibilityError> {
        let content = fs::read_to_string(path).map_err(|source| VisibilityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.visibility_of(path, &content)
    }
}

/// Extract the key/value pairs of the leading `[Desktop Entry]` group.
///
/// Other groups are syntax-checked but their keys are dropped.
fn parse_desktop_group(
    path: &Path,
    content: &str,
) -> Result<HashMap<String, String>, VisibilityError> {
    let mut keys = HashMap::new();
    let mut current_group: Option<&str> = None;
    let mut seen_first_group = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| VisibilityError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "unterminated group header".to_string(),
            })?;
            if !seen_first_group && name != DESKTOP_ENTRY_GROUP {
                return Err(VisibilityError::MissingGroup(path.to_path_buf()));
            }
            seen_first_group = true;
            current_group = Some(name);
            continue;
        }

        let Some(group) = current_group else {
            return Err(VisibilityError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "key outside of any group".to_string(),
            });
        };

        let (key, value) = line.split_once('=').ok_or_else(|| VisibilityError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            reason: "expected key=value".to_string(),
        })?;

        if group == DESKTOP_ENTRY_GROUP {
            keys.insert(key.trim_end().to_string(), value.trim_start().to_string());
        }
    }

    if !seen_first_group {
        return Err(VisibilityError::MissingGroup(path.to_path_buf()));
    }
    Ok(keys)
}

/// Read a boolean key the way GLib's key-file loader does for visibility
/// keys: anything other than `true` or `1` counts as false.
fn parse_bool(path: &Path, keys: &HashMap<String, String>, key: &str) -> bool {
    match keys.get(key).map(String::as_str) {
        None | Some("false") | Some("0") => false,
        Some("true") | Some("1") => true,
        Some(other) => {
            log::debug!(
                "{}: treating invalid boolean {}='{}' as false",
                path.display(),
                key,
                other
            );
            false
        }
    }
}

fn split_list(value: &str) -> Vec<&str> {
    value.split(';').filter(|s| !s.is_empty()).collect()
}
