//! Two-phase shutdown sequence around thread teardown

use log::info;

use super::browser_process::HostProcess;
use super::prefs::names;

/// Flags carried from phase one into phase two
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartFlags {
    NoFlags,
    RestartLastSession,
}

/// Tracks the shutdown sequence for the process
#[derive(Debug, Default)]
pub struct ShutdownSequence {
    pre_threads_stopped: bool,
    post_threads_stopped: bool,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one, before threads are torn down. Returns whether the last
    /// session should be restored on next launch.
    pub fn pre_threads_stop(&mut self, host: &mut HostProcess) -> bool {
        assert!(!self.pre_threads_stopped, "shutdown phase one ran twice");
        self.pre_threads_stopped = true;

        let restart = host
            .local_state_mut()
            .map(|prefs| {
                let restart = prefs.get_boolean(names::RESTART_LAST_SESSION);
                if restart {
                    prefs.clear_pref(names::RESTART_LAST_SESSION);
                    prefs.commit_pending_write();
                }
                restart
            })
            .unwrap_or(false);

        info!("Shutdown phase one complete (restart last session: {})", restart);
        restart
    }

    /// Phase two, after threads are gone. Takes ownership of the host
    /// process and performs its final deletion.
    pub fn post_threads_stop(&mut self, host: Box<HostProcess>, flags: RestartFlags) -> RestartFlags {
        assert!(self.pre_threads_stopped, "shutdown phase two ran before phase one");
        assert!(!self.post_threads_stopped, "shutdown phase two ran twice");
        self.post_threads_stopped = true;

        drop(host);
        info!("Shutdown phase two complete ({:?})", flags);
        flags
    }

    pub fn is_complete(&self) -> bool {
        self.post_threads_stopped
    }
}
