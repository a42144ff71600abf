//! The reconciliation engine.
//!
//! See the [module documentation](super) for the phase structure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{PackageId, PackageInfo, Role};
use crate::cache::{CacheEntry, CacheStore};
use crate::desktop::VisibilityOracle;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::progress::{Phase, ProgressCallback};
use crate::resolver::{ResolveError, ResolverClient};
use crate::scanner::Walker;

use super::{
    CandidateError, CycleReport, DiscoverStats, EngineConfig, EngineError, IngestStats,
    RevalidateStats, VisitedSet,
};

/// Keeps a [`CacheStore`] consistent with the launcher files on disk.
///
/// Runs are serialised by construction: every entry point takes `&mut self`.
pub struct ReconciliationEngine<S> {
    store: S,
    resolver: ResolverClient,
    oracle: Box<dyn VisibilityOracle>,
    fingerprinter: Fingerprinter,
    config: EngineConfig,
}

impl<S> std::fmt::Debug for ReconciliationEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: CacheStore> ReconciliationEngine<S> {
    /// Create an engine over an open store.
    #[must_use]
    pub fn new(
        store: S,
        resolver: ResolverClient,
        oracle: Box<dyn VisibilityOracle>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            oracle,
            fingerprinter: Fingerprinter::new(),
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a full refresh cycle: revalidation, then discovery.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] without touching the cache if
    /// the backend cannot resolve file ownership, or [`EngineError::Store`]
    /// if the store cannot be scanned.
    pub fn refresh(&mut self) -> Result<CycleReport, EngineError> {
        if !self.resolver.supports(Role::SearchFile) {
            log::debug!("Backend cannot search files, skipping refresh");
            return Err(EngineError::Unsupported(Role::SearchFile));
        }

        log::info!(
            "Refreshing launcher cache for {}",
            self.config.applications_dir.display()
        );

        let mut visited = VisitedSet::new();
        let revalidate = self.revalidate_all(&mut visited)?;
        let discover = if revalidate.interrupted {
            DiscoverStats {
                interrupted: true,
                ..Default::default()
            }
        } else {
            self.discover_new(&visited)?
        };

        let report = CycleReport {
            revalidate,
            discover,
        };
        log::info!(
            "Refresh complete: {} checked, {} updated, {} removed, {} added, {} skipped",
            report.revalidate.checked,
            report.revalidate.updated,
            report.revalidate.removed,
            report.discover.inserted,
            report.skipped()
        );
        Ok(report)
    }

    /// Check every cached row against the file it describes.
    ///
    /// Paths whose file still exists are added to `visited`, whether or not
    /// they could be re-resolved.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store cannot be scanned.
    pub fn revalidate_all(
        &mut self,
        visited: &mut VisitedSet,
    ) -> Result<RevalidateStats, EngineError> {
        let rows = self.store.scan_all()?;
        let progress = self.config.progress_callback.clone();
        let mut stats = RevalidateStats::default();

        log::debug!("Revalidating {} cached rows", rows.len());
        if let Some(ref callback) = progress {
            callback.on_phase_start(Phase::Revalidate, 0);
        }

        for row in rows {
            if self.config.is_shutdown_requested() {
                log::debug!("Revalidate: Shutdown requested, stopping");
                stats.interrupted = true;
                break;
            }

            let entry = match row {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping cache row: {}", e);
                    stats.malformed += 1;
                    continue;
                }
            };
            stats.checked += 1;
            if let Some(ref callback) = progress {
                callback.on_progress(stats.checked, &entry.path.to_string_lossy());
            }

            let Some(current) = self.fingerprinter.fingerprint(&entry.path) else {
                log::debug!("Removing {} as it no longer exists", entry.path.display());
                match self.store.delete(&entry.path) {
                    Ok(()) => stats.removed += 1,
                    Err(e) => {
                        log::warn!("Failed to remove {}: {}", entry.path.display(), e);
                        stats.stale += 1;
                    }
                }
                continue;
            };

            visited.insert(&entry.path);

            if current == entry.fingerprint {
                log::trace!("Existing entry {} is valid", entry.path.display());
                stats.unchanged += 1;
                continue;
            }

            log::debug!(
                "Re-resolving {} as its content changed ({} vs {})",
                entry.path.display(),
                entry.fingerprint,
                current
            );
            match self.resolve_and_store(&entry.path, current) {
                Ok(updated) => {
                    log::debug!("Updated {} (package {})", updated.path.display(), updated.package);
                    stats.updated += 1;
                }
                Err(e) => {
                    log_skip(&entry.path, &e);
                    stats.stale += 1;
                }
            }
        }

        if let Some(ref callback) = progress {
            callback.on_phase_end(Phase::Revalidate);
        }
        Ok(stats)
    }

    /// Resolve and insert launchers on disk that `visited` does not contain.
    ///
    /// Unwalkable subtrees and per-path failures are counted in the returned
    /// stats rather than reported as errors.
    ///
    /// # Errors
    ///
    /// Reserved for conditions that abort the phase; none arise today.
    pub fn discover_new(&mut self, visited: &VisitedSet) -> Result<DiscoverStats, EngineError> {
        let progress = self.config.progress_callback.clone();
        let mut stats = DiscoverStats::default();

        let candidates = self.collect_candidates(visited, &mut stats);
        stats.candidates = candidates.len();
        log::debug!("Discovered {} launchers missing from the cache", candidates.len());

        if self.config.is_shutdown_requested() {
            stats.interrupted = true;
            return Ok(stats);
        }
        if candidates.is_empty() {
            return Ok(stats);
        }

        if let Some(ref callback) = progress {
            callback.on_phase_start(Phase::Discover, candidates.len());
        }

        for (idx, path) in candidates.iter().enumerate() {
            if self.config.is_shutdown_requested() {
                log::debug!("Discover: Shutdown requested, stopping");
                stats.interrupted = true;
                break;
            }
            if let Some(ref callback) = progress {
                callback.on_progress(idx + 1, &path.to_string_lossy());
            }

            let result = self
                .fingerprinter
                .fingerprint(path)
                .ok_or_else(|| CandidateError::Vanished(path.clone()))
                .and_then(|fingerprint| self.resolve_and_store(path, fingerprint));

            match result {
                Ok(entry) => {
                    log::debug!("Added {} (package {})", entry.path.display(), entry.package);
                    stats.inserted += 1;
                }
                Err(e) => {
                    log_skip(path, &e);
                    stats.skipped += 1;
                }
            }
        }

        if let Some(ref callback) = progress {
            callback.on_phase_end(Phase::Discover);
        }
        Ok(stats)
    }

    /// Store the launchers of packages an install transaction just put on disk.
    ///
    /// Only packages in the installing or updating state are considered.
    /// Their identities are re-keyed to `installed` and their manifests
    /// requested in one query; launchers found there are written with the
    /// already-known package name, without any ownership query.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] if the backend cannot list files.
    pub fn ingest_from_install(
        &mut self,
        packages: &[PackageInfo],
    ) -> Result<IngestStats, EngineError> {
        if !self.resolver.supports(Role::GetFiles) {
            log::debug!("Backend cannot get files, skipping ingest");
            return Err(EngineError::Unsupported(Role::GetFiles));
        }

        let ids: Vec<PackageId> = packages
            .iter()
            .filter(|p| p.info.is_arriving())
            .map(|p| p.id.installed())
            .collect();
        log::debug!("Processing {} packages for launcher files", ids.len());

        let mut stats = IngestStats {
            packages: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return Ok(stats);
        }

        let progress = self.config.progress_callback.clone();
        if let Some(ref callback) = progress {
            callback.on_phase_start(Phase::Ingest, 0);
        }

        let manifest = match self.resolver.list_files(&ids) {
            Ok(manifest) => manifest,
            Err(e) => {
                log::warn!("Failed to request package file lists: {}", e);
                stats.incomplete = true;
                if let Some(ref callback) = progress {
                    callback.on_phase_end(Phase::Ingest);
                }
                return Ok(stats);
            }
        };
        stats.incomplete = manifest.error.is_some();

        for package in &manifest.packages {
            for file in &package.files {
                if !self.config.walker.matches(file) || !file.exists() {
                    continue;
                }
                stats.launchers += 1;
                if let Some(ref callback) = progress {
                    callback.on_progress(stats.launchers, &file.to_string_lossy());
                }

                log::debug!("Adding {} from {}", file.display(), package.package_id);
                match self.add_launcher(file, &package.package_id.name, None) {
                    Ok(_) => stats.inserted += 1,
                    Err(e) => {
                        log_skip(file, &e);
                        stats.skipped += 1;
                    }
                }
            }
        }

        if let Some(ref callback) = progress {
            callback.on_phase_end(Phase::Ingest);
        }
        log::info!(
            "Ingested {} launchers from {} packages",
            stats.inserted,
            stats.packages
        );
        Ok(stats)
    }

    /// Write a launcher whose owning package is already known.
    ///
    /// If `fingerprint` is `None` it is computed from the file.
    ///
    /// # Errors
    ///
    /// Returns [`CandidateError`] if the file is gone, its visibility cannot
    /// be decided, or the write fails. Nothing is written in that case.
    pub fn add_launcher(
        &self,
        path: &Path,
        package: &str,
        fingerprint: Option<Fingerprint>,
    ) -> Result<CacheEntry, CandidateError> {
        let fingerprint = match fingerprint {
            Some(fingerprint) => fingerprint,
            None => self
                .fingerprinter
                .fingerprint(path)
                .ok_or_else(|| CandidateError::Vanished(path.to_path_buf()))?,
        };
        let visible = self.oracle.is_visible(path)?;
        let entry = CacheEntry::new(path, package, visible, fingerprint);
        self.store.upsert(&entry)?;
        Ok(entry)
    }

    fn resolve_and_store(
        &mut self,
        path: &Path,
        fingerprint: Fingerprint,
    ) -> Result<CacheEntry, CandidateError> {
        let owner = self.resolver.resolve_owner(path)?;
        self.add_launcher(path, &owner.id.name, Some(fingerprint))
    }

    fn collect_candidates(&self, visited: &VisitedSet, stats: &mut DiscoverStats) -> Vec<PathBuf> {
        let mut walker = Walker::new(&self.config.applications_dir, self.config.walker.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let mut candidates = Vec::new();
        for item in walker.walk() {
            match item {
                Ok(path) if visited.contains(&path) => {}
                Ok(path) => {
                    log::trace!("Adding {} as it is not in the cache", path.display());
                    candidates.push(path);
                }
                Err(_) => stats.walk_errors += 1,
            }
        }
        candidates
    }
}

/// Unowned launchers are routine (locally created entries), so they are
/// logged quietly; every other skip is a warning.
fn log_skip(path: &Path, error: &CandidateError) {
    match error {
        CandidateError::Resolve(ResolveError::Empty(_)) => {
            log::debug!("Skipping {}: {}", path.display(), error);
        }
        _ => log::warn!("Skipping {}: {}", path.display(), error),
    }
}
