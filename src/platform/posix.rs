//! POSIX signal handling: child reaping and shutdown signals

use std::sync::atomic::Ordering;

use log::{debug, info};
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use super::SHUTDOWN_REQUESTED;
use crate::utils::{Result, ShellError};

const SHUTDOWN_SIGNALS: [Signal; 3] = [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP];

extern "C" fn reap_children(_: c_int) {
    // Reap every exited child without blocking.
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

extern "C" fn request_shutdown(_: c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install(signal: Signal, handler: SigHandler, flags: SaFlags) -> Result<()> {
    let action = SigAction::new(handler, flags, SigSet::empty());
    // SAFETY: both handlers only touch async-signal-safe state.
    unsafe { sigaction(signal, &action) }
        .map(|_| ())
        .map_err(|e| ShellError::Platform(format!("sigaction({}) failed: {}", signal, e)))
}

/// Reap exited children so they never linger as zombies
pub fn install_sigchld_handler() -> Result<()> {
    install(
        Signal::SIGCHLD,
        SigHandler::Handler(reap_children),
        SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
    )?;
    debug!("SIGCHLD handler installed");
    Ok(())
}

/// Route SIGTERM, SIGINT and SIGHUP to the shutdown flag
pub fn install_shutdown_signal_handlers() -> Result<()> {
    for signal in SHUTDOWN_SIGNALS {
        install(signal, SigHandler::Handler(request_shutdown), SaFlags::SA_RESTART)?;
    }
    info!("Shutdown signal handlers installed");
    Ok(())
}

/// Put the default dispositions back once the main loop has exited
pub fn restore_shutdown_signal_handlers() -> Result<()> {
    for signal in SHUTDOWN_SIGNALS {
        install(signal, SigHandler::SigDfl, SaFlags::empty())?;
    }
    debug!("Shutdown signal handlers restored");
    Ok(())
}
