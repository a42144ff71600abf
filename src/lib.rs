//! launchcache - desktop launcher ownership cache
//!
//! Keeps a persistent SQLite cache that maps every desktop launcher file
//! under an applications directory to the installed package that owns it,
//! whether it should be shown in menus, and a content fingerprint. The cache
//! is reconciled after package metadata refreshes and fed directly from
//! install transactions, so lookups never have to ask the package manager.

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod desktop;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hook;
pub mod logging;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{InfoKind, NativeBackend, PackageInfo, Role};
use crate::cache::{CacheDatabase, CacheEntry, CacheStore};
use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::Config;
use crate::desktop::DesktopEntryOracle;
use crate::engine::{EngineConfig, EngineError, ReconciliationEngine};
use crate::error::ExitCode;
use crate::hook::{ScanHook, TransactionOutcome};
use crate::output::JsonOutput;
use crate::progress::Progress;
use crate::resolver::ResolverClient;
use crate::signal::ShutdownHandler;

/// Run the application with parsed arguments.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the cache cannot
/// be read for `list`/`lookup`, or a triggered run fails outright.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::Error::new(*e))
        .context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    match cli.command {
        Commands::Refresh {
            applications_dir,
            no_progress,
        } => {
            if let Some(dir) = applications_dir {
                config.applications_dir = dir;
            }
            let show_progress = !cli.quiet && !no_progress;
            handle_transaction(&config, Role::RefreshCache, &[], show_progress)
        }
        Commands::Ingest { package_ids } => {
            let results: Vec<PackageInfo> = package_ids
                .into_iter()
                .map(|id| PackageInfo::new(InfoKind::Installing, id))
                .collect();
            handle_transaction(&config, Role::InstallPackages, &results, !cli.quiet)
        }
        Commands::List { output } => handle_list(&config, output),
        Commands::Lookup { path, output } => handle_lookup(&config, &path, output),
        Commands::ShowConfig => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{text}");
            Ok(ExitCode::Success)
        }
    }
}

/// Build the hook the way a package-manager daemon would at startup.
///
/// A cache database that cannot be opened leaves the hook without a store
/// rather than failing: transactions that need it then report the problem.
fn build_hook(
    config: &Config,
    shutdown: &ShutdownHandler,
    show_progress: bool,
) -> Result<ScanHook<CacheDatabase>> {
    if !config.enabled {
        return Ok(ScanHook::disabled());
    }

    let db_path = config.database_path()?;
    let store = match CacheDatabase::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            log::warn!("Failed to open cache database {}: {}", db_path.display(), e);
            return Ok(ScanHook::without_store());
        }
    };

    let backend = match config.backend.tool() {
        Some(tool) => NativeBackend::new(tool),
        None => NativeBackend::detect(),
    };
    let resolver = ResolverClient::new(Box::new(backend)).with_timeout(config.query_timeout());

    let mut engine_config = EngineConfig::default()
        .with_applications_dir(&config.applications_dir)
        .with_walker(config.walker_config())
        .with_shutdown_flag(shutdown.get_flag());
    if show_progress {
        engine_config = engine_config.with_progress_callback(Arc::new(Progress::new(false)));
    }

    Ok(ScanHook::new(ReconciliationEngine::new(
        store,
        resolver,
        Box::new(DesktopEntryOracle::from_env()),
        engine_config,
    )))
}

fn handle_transaction(
    config: &Config,
    role: Role,
    results: &[PackageInfo],
    show_progress: bool,
) -> Result<ExitCode> {
    let shutdown = signal::install_handler().unwrap_or_else(|e| {
        log::warn!("{}; Ctrl+C will not stop cleanly", e);
        ShutdownHandler::new()
    });
    let mut hook = build_hook(config, &shutdown, show_progress)?;

    let outcome = match hook.transaction_finished(role, results) {
        Ok(outcome) => outcome,
        Err(EngineError::Unsupported(needed)) => {
            log::warn!("Package backend cannot run {}, nothing to do", needed);
            return Ok(ExitCode::Skipped);
        }
        Err(e) => return Err(e).with_context(|| format!("{role} run failed")),
    };

    let code = match outcome {
        TransactionOutcome::Ignored => ExitCode::Skipped,
        TransactionOutcome::Refreshed(report) => {
            if report.interrupted() {
                ExitCode::Interrupted
            } else if report.skipped() > 0 {
                ExitCode::PartialSuccess
            } else {
                ExitCode::Success
            }
        }
        TransactionOutcome::Ingested(stats) => {
            if stats.incomplete || stats.skipped > 0 {
                ExitCode::PartialSuccess
            } else {
                ExitCode::Success
            }
        }
    };
    Ok(code)
}

/// Open the configured cache for reading, `None` if it was never created.
fn open_existing(config: &Config) -> Result<Option<CacheDatabase>> {
    let db_path = config.database_path()?;
    if !db_path.exists() {
        log::info!("No cache database at {}", db_path.display());
        return Ok(None);
    }
    let store = CacheDatabase::open(&db_path)
        .with_context(|| format!("Failed to open cache database {}", db_path.display()))?;
    Ok(Some(store))
}

fn handle_list(config: &Config, format: OutputFormat) -> Result<ExitCode> {
    let mut entries: Vec<CacheEntry> = Vec::new();
    let mut malformed = 0;
    if let Some(store) = open_existing(config)? {
        for row in store.scan_all()? {
            match row {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    log::warn!("Skipping cache row: {}", e);
                    malformed += 1;
                }
            }
        }
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Text => output::write_text(&mut out, &entries)?,
        OutputFormat::Json => JsonOutput::new(&entries, malformed).write_to(&mut out, true)?,
    }
    out.flush()?;

    Ok(if malformed > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn handle_lookup(config: &Config, path: &Path, format: OutputFormat) -> Result<ExitCode> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let entry = match open_existing(config)? {
        Some(store) => store.get(&path)?,
        None => None,
    };
    let Some(entry) = entry else {
        anyhow::bail!("{} is not in the cache", path.display());
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Text => output::write_text(&mut out, std::slice::from_ref(&entry))?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &entry)?;
            writeln!(out)?;
        }
    }
    Ok(ExitCode::Success)
}
