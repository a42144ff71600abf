//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML config file (`<config dir>/config.toml`, or `--config PATH`)
//! 3. `LAUNCHCACHE_*` environment variables
//! 4. Command-line flags (applied by the caller)
//!
//! # Example
//!
//! ```toml
//! enabled = true
//! database = "/var/lib/launchcache/desktop-files.db"
//! applications_dir = "/usr/share/applications"
//! query_timeout_secs = 10
//! backend = "dpkg"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::backend::PackageTool;
use crate::engine::DEFAULT_APPLICATIONS_DIR;
use crate::scanner::{WalkerConfig, DEFAULT_SUFFIX};

/// Prefix of environment variables that override config keys.
pub const ENV_PREFIX: &str = "LAUNCHCACHE_";

/// File name of the cache database inside the cache directory.
pub const DATABASE_FILE: &str = "desktop-files.db";

/// Which package tool answers ownership and manifest queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Use whichever supported tool is installed
    #[default]
    Auto,
    /// `dpkg-query`
    Dpkg,
    /// `rpm`
    Rpm,
}

impl BackendChoice {
    /// The explicitly chosen tool, `None` for auto-detection.
    #[must_use]
    pub fn tool(self) -> Option<PackageTool> {
        match self {
            Self::Auto => None,
            Self::Dpkg => Some(PackageTool::Dpkg),
            Self::Rpm => Some(PackageTool::Rpm),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch; when false no transaction touches the cache.
    pub enabled: bool,
    /// Cache database location; the platform cache directory when unset.
    pub database: Option<PathBuf>,
    /// Directory walked for launcher files.
    pub applications_dir: PathBuf,
    /// File name suffix of launcher files.
    pub suffix: String,
    /// Seconds to wait for a backend query before giving up on it.
    pub query_timeout_secs: u64,
    /// Package tool selection.
    pub backend: BackendChoice,
    /// Follow symbolic links while walking.
    pub follow_symlinks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
            applications_dir: PathBuf::from(DEFAULT_APPLICATIONS_DIR),
            suffix: DEFAULT_SUFFIX.to_string(),
            query_timeout_secs: 30,
            backend: BackendChoice::Auto,
            follow_symlinks: true,
        }
    }
}

impl Config {
    /// Load the configuration, reading `path` or the default config file.
    ///
    /// A missing config file is not an error; defaults and environment
    /// variables still apply.
    ///
    /// # Errors
    ///
    /// Returns a figment error if a layer holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_config_path);
        Self::load_from_path(path.as_deref())
    }

    /// Load the configuration from an explicit file (or none at all).
    ///
    /// # Errors
    ///
    /// Returns a figment error if a layer holds a value of the wrong type.
    pub fn load_from_path(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)
    }

    /// The default config file location.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The cache database location after applying the default.
    ///
    /// # Errors
    ///
    /// Fails if no database is configured and the platform has no cache
    /// directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref path) = self.database {
            return Ok(path.clone());
        }
        let dirs = project_dirs()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(dirs.cache_dir().join(DATABASE_FILE))
    }

    /// Per-query timeout for backend requests.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    /// Walker settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::new(self.suffix.clone(), self.follow_symlinks)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "launchcache", "launchcache")
}
