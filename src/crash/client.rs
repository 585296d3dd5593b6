//! Crash reporter client
//!
//! Tracks whether crash reporting is enabled for this process. Before local
//! state exists the answer comes from the command line; afterwards the
//! persisted `metrics.reporting_enabled` pref is authoritative.

use log::{debug, info};

use super::backend::CrashBackend;
use crate::config::switches;
use crate::host::PrefService;
use crate::host::pref_names;
use crate::utils::{CommandLine, SharedCommandLine};

/// Child process types that never install their own crash handler
#[cfg(all(unix, not(target_os = "macos")))]
const SELF_HANDLED_PROCESS_TYPE: &str = "zygote";
#[cfg(not(all(unix, not(target_os = "macos"))))]
const SELF_HANDLED_PROCESS_TYPE: &str = "crashpad-handler";

pub struct CrashReporterClient {
    command_line: SharedCommandLine,
    backend: Box<dyn CrashBackend>,
    initialized: bool,
}

impl CrashReporterClient {
    pub fn new(command_line: SharedCommandLine, backend: Box<dyn CrashBackend>) -> Self {
        Self {
            command_line,
            backend,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Install the crash handler. Later calls do nothing.
    pub fn init_crash_reporting(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let process_type = self.process_type();
        self.backend.initialize(&process_type);
        self.set_enabled_for_process(true);
        self.set_crash_keys_from_command_line();
    }

    /// Persist the toggle when local state exists and apply it to this process
    pub fn set_crash_reporting_enabled(&mut self, local_state: Option<&mut PrefService>, enabled: bool) {
        if let Some(prefs) = local_state {
            if prefs.get_boolean(pref_names::METRICS_REPORTING_ENABLED) == enabled {
                return;
            }
            prefs.set_boolean(pref_names::METRICS_REPORTING_ENABLED, enabled);
        }

        info!("Crash reporting {}", if enabled { "enabled" } else { "disabled" });
        self.set_enabled_for_process(enabled);
        if enabled {
            self.init_crash_reporting();
        }
    }

    pub fn is_crash_reporting_enabled(&self, local_state: Option<&PrefService>) -> bool {
        match local_state {
            Some(prefs) => prefs.get_boolean(pref_names::METRICS_REPORTING_ENABLED),
            None => {
                let cmd = self.command_line.borrow();
                !cmd.has_switch(switches::DISABLE_BREAKPAD)
                    && cmd.has_switch(switches::ENABLE_CRASH_REPORTER)
            }
        }
    }

    /// Reflect the toggle in this process's switches and the backend's consent
    pub fn set_enabled_for_process(&mut self, enabled: bool) {
        {
            let mut cmd = self.command_line.borrow_mut();
            if enabled {
                cmd.remove_switch(switches::DISABLE_BREAKPAD);
                cmd.append_switch(switches::ENABLE_CRASH_REPORTER);
            } else {
                cmd.remove_switch(switches::ENABLE_CRASH_REPORTER);
                cmd.append_switch(switches::DISABLE_BREAKPAD);
            }
        }
        self.backend.set_upload_consent(enabled);
    }

    /// Propagate the toggle to a child process command line
    pub fn append_extra_command_line_switches(&self, local_state: Option<&PrefService>, child: &mut CommandLine) {
        if self.is_crash_reporting_enabled(local_state) {
            child.append_switch(switches::ENABLE_CRASH_REPORTER);
        }
    }

    pub fn set_crash_key_value(&mut self, key: &str, value: &str) {
        self.backend.set_crash_key(key, value);
    }

    /// Initialize reporting in a child process. Returns whether it ran.
    pub fn init_for_process(&mut self) -> bool {
        let process_type = self.process_type();
        if process_type.is_empty() || process_type == SELF_HANDLED_PROCESS_TYPE {
            return false;
        }
        self.init_crash_reporting();
        true
    }

    fn process_type(&self) -> String {
        self.command_line
            .borrow()
            .switch_value(switches::PROCESS_TYPE)
            .unwrap_or_default()
            .to_string()
    }

    fn set_crash_keys_from_command_line(&mut self) {
        let args: Vec<String> = self.command_line.borrow().argv().into_iter().skip(1).collect();
        self.backend.set_crash_key("num-switches", &args.len().to_string());
        for (i, arg) in args.iter().enumerate() {
            self.backend.set_crash_key(&format!("switch-{}", i + 1), arg);
        }
        debug!("Recorded {} command-line crash keys", args.len());
    }
}
