//! Command-line interface definitions for launchcache.
//!
//! Global options (verbosity, config file, database override) apply to every
//! subcommand. `refresh` and `ingest` play the part of the transactions that
//! normally drive the cache; `list` and `lookup` read it back.
//!
//! # Example
//!
//! ```bash
//! # Reconcile the cache with /usr/share/applications
//! launchcache refresh
//!
//! # Record the launchers of packages that were just installed
//! launchcache ingest "firefox;128.0;amd64;debian"
//!
//! # Dump the cache as JSON
//! launchcache list --output json
//!
//! # Which package owns a launcher?
//! launchcache lookup /usr/share/applications/firefox.desktop
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::backend::PackageId;

/// Keeps a cache of desktop launcher files and the packages that own them.
#[derive(Debug, Parser)]
#[command(name = "launchcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file to read instead of the default one
    #[arg(long, value_name = "PATH", global = true, env = "LAUNCHCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the cache database
    ///
    /// If not specified, the configured or platform-specific path is used.
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile the cache with the launcher files on disk
    Refresh {
        /// Directory to scan instead of the configured one
        #[arg(value_name = "DIR")]
        applications_dir: Option<PathBuf>,

        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Record the launchers shipped by freshly installed packages
    Ingest {
        /// Package ids as `name;version;arch;data`
        #[arg(value_name = "PACKAGE_ID", required = true)]
        package_ids: Vec<PackageId>,
    },
    /// Print every cached launcher
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Print the cached owner of one launcher
    Lookup {
        /// Launcher file path
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Output format for cache listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One tab-separated line per launcher
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
