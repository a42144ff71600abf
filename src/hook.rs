//! Transaction hook.
//!
//! The cache is maintained as a side effect of package-manager transactions:
//! a finished metadata refresh triggers a reconciliation cycle, and a
//! finished install triggers an ingest of the installed packages' launchers.
//! Every other transaction role is ignored.
//!
//! Callers must deliver transactions one at a time; [`ScanHook`] takes
//! `&mut self` so two runs can never overlap.

use crate::backend::{PackageInfo, Role};
use crate::cache::CacheStore;
use crate::engine::{CycleReport, EngineError, IngestStats, ReconciliationEngine};

/// What a finished transaction caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// A refresh cycle ran
    Refreshed(CycleReport),
    /// An ingest ran
    Ingested(IngestStats),
    /// Nothing ran: the role is not relevant or the hook is disabled
    Ignored,
}

enum HookState<S> {
    Disabled,
    NoStore,
    Ready(Box<ReconciliationEngine<S>>),
}

/// Dispatches finished transactions to the reconciliation engine.
pub struct ScanHook<S> {
    state: HookState<S>,
}

impl<S> std::fmt::Debug for ScanHook<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            HookState::Disabled => "disabled",
            HookState::NoStore => "no-store",
            HookState::Ready(_) => "ready",
        };
        f.debug_struct("ScanHook").field("state", &state).finish()
    }
}

impl<S: CacheStore> ScanHook<S> {
    /// A hook that drives `engine`.
    #[must_use]
    pub fn new(engine: ReconciliationEngine<S>) -> Self {
        Self {
            state: HookState::Ready(Box::new(engine)),
        }
    }

    /// A hook switched off by configuration; every transaction is ignored.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            state: HookState::Disabled,
        }
    }

    /// A hook whose cache database could not be opened.
    ///
    /// Relevant transactions fail with [`EngineError::StoreUnavailable`].
    #[must_use]
    pub fn without_store() -> Self {
        Self {
            state: HookState::NoStore,
        }
    }

    /// The engine, if the hook is ready.
    #[must_use]
    pub fn engine(&self) -> Option<&ReconciliationEngine<S>> {
        match &self.state {
            HookState::Ready(engine) => Some(engine.as_ref()),
            _ => None,
        }
    }

    /// React to a finished transaction.
    ///
    /// `results` are the packages the transaction reported; only install
    /// transactions look at them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the triggered run could not start.
    pub fn transaction_finished(
        &mut self,
        role: Role,
        results: &[PackageInfo],
    ) -> Result<TransactionOutcome, EngineError> {
        if !matches!(role, Role::RefreshCache | Role::InstallPackages) {
            log::trace!("Ignoring {} transaction", role);
            return Ok(TransactionOutcome::Ignored);
        }

        let engine = match &mut self.state {
            HookState::Disabled => {
                log::debug!("Launcher scanning disabled, ignoring {} transaction", role);
                return Ok(TransactionOutcome::Ignored);
            }
            HookState::NoStore => return Err(EngineError::StoreUnavailable),
            HookState::Ready(engine) => engine,
        };

        match role {
            Role::RefreshCache => engine.refresh().map(TransactionOutcome::Refreshed),
            _ => engine
                .ingest_from_install(results)
                .map(TransactionOutcome::Ingested),
        }
    }
}
