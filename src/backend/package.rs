//! Package identities and transaction vocabulary.
//!
//! A package is identified by the four-field `name;version;arch;data`
//! string used by the package-management subsystem. The `data` field names
//! where the package lives (`installed`, a repository id, ...), which is why
//! an install event's identity has to be re-keyed to `installed` before its
//! files are looked up.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// `data` field value of a package that is installed on the system.
pub const INSTALLED_DATA: &str = "installed";

/// Four-field package identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageId {
    /// Package name
    pub name: String,
    /// Version string, may be empty
    pub version: String,
    /// Architecture, may be empty
    pub arch: String,
    /// Location or state (`installed`, repository id, ...)
    pub data: String,
}

impl PackageId {
    /// Build an identifier from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            data: data.into(),
        }
    }

    /// The same package, identified as installed.
    #[must_use]
    pub fn installed(&self) -> Self {
        Self {
            data: INSTALLED_DATA.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.name, self.version, self.arch, self.data)
    }
}

/// Errors from parsing a [`PackageId`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PackageIdError {
    /// The string does not have exactly four `;`-separated fields.
    #[error("Package id '{0}' must have four ';'-separated fields")]
    FieldCount(String),

    /// The name field is empty.
    #[error("Package id '{0}' has an empty name")]
    EmptyName(String),
}

impl FromStr for PackageId {
    type Err = PackageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(';').collect();
        let [name, version, arch, data] = fields.as_slice() else {
            return Err(PackageIdError::FieldCount(s.to_string()));
        };
        if name.is_empty() {
            return Err(PackageIdError::EmptyName(s.to_string()));
        }
        Ok(Self::new(*name, *version, *arch, *data))
    }
}

/// State a package is in, as reported by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKind {
    /// Already installed
    Installed,
    /// Available from a repository
    Available,
    /// Being installed by the current transaction
    Installing,
    /// Being updated by the current transaction
    Updating,
    /// Being removed by the current transaction
    Removing,
    /// Anything else
    Unknown,
}

impl InfoKind {
    /// Whether the package is arriving on disk in this transaction.
    #[must_use]
    pub fn is_arriving(self) -> bool {
        matches!(self, Self::Installing | Self::Updating)
    }
}

/// A package as reported by the backend or an install transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    /// Transition state of the package
    pub info: InfoKind,
    /// Package identity
    pub id: PackageId,
}

impl PackageInfo {
    /// Create a package record.
    #[must_use]
    pub fn new(info: InfoKind, id: PackageId) -> Self {
        Self { info, id }
    }
}

/// Operations a package backend may implement, and transaction roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Refresh package metadata
    RefreshCache,
    /// Install packages
    InstallPackages,
    /// Update packages
    UpdatePackages,
    /// Remove packages
    RemovePackages,
    /// Map files to the packages that own them
    SearchFile,
    /// List the files of packages
    GetFiles,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RefreshCache => "refresh-cache",
            Self::InstallPackages => "install-packages",
            Self::UpdatePackages => "update-packages",
            Self::RemovePackages => "remove-packages",
            Self::SearchFile => "search-file",
            Self::GetFiles => "get-files",
        };
        f.write_str(name)
    }
}

/// Package filter applied to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Only packages currently installed
    Installed,
    /// No filtering
    None,
}

/// Terminal status of a backend query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The query completed
    Success,
    /// The query failed with a backend-specific code
    Failed(String),
    /// The query was cancelled before completing
    Cancelled,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed(code) => write!(f, "failed ({code})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}
