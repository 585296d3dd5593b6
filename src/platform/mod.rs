//! Platform shims installed at fixed lifecycle phases

#[cfg(unix)]
pub mod posix;
pub mod exception;

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
pub use posix::{install_sigchld_handler, install_shutdown_signal_handlers, restore_shutdown_signal_handlers};
pub use exception::install_exception_filter;

/// Set by the shutdown signal handlers; the main loop watches it
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// The flag shutdown signals raise
pub fn shutdown_flag() -> &'static AtomicBool {
    &SHUTDOWN_REQUESTED
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
