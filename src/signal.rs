//! Signal handling for graceful shutdown.
//!
//! Ctrl+C sets a shared `AtomicBool`. The walker and every reconciliation
//! phase check it between paths, so an interrupted refresh stops after the
//! path it is on and leaves every row either untouched or fully rewritten.
//!
//! ```rust,no_run
//! use launchcache::engine::EngineConfig;
//! use launchcache::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let config = EngineConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a shutdown without a signal.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clone of the flag for the engine and walker.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear a previous shutdown request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// Calling it again returns the installed handler with its flag reset, so
/// repeated `run_app` calls in one process (as in tests) keep working.
///
/// # Errors
///
/// Returns [`SignalError`] if the process already has a Ctrl+C handler that
/// this module did not install.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    let mut install_error = None;
    let handler = GLOBAL_HANDLER.get_or_init(|| {
        let handler = ShutdownHandler::new();
        let flag = handler.get_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current file...");
            log::info!("Shutdown signal received");
        }) {
            install_error = Some(e);
        }
        handler
    });

    if let Some(e) = install_error {
        return Err(SignalError::InstallFailed(e));
    }
    handler.reset();
    Ok(handler.clone())
}
