use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;

/// Exit status for a run stopped by Ctrl+C.
pub(crate) const EXIT_INTERRUPTED: u8 = 130;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C sets the returned flag; the engine checks it before each
/// batch, so already applied batches are kept. A second Ctrl+C exits with 130
/// immediately.
pub(crate) fn setup_shutdown_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let requested = Arc::clone(&flag);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, stopping before the next batch...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, stopping before the next batch");
        }

        requested.store(true, Ordering::Release);

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    });

    flag
}
