//! Shell configuration resolved from the command line and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::CommandLine;

/// Environment variable overriding the default user data directory
pub const USER_DATA_DIR_ENV: &str = "HEARTH_USER_DATA_DIR";

/// Command-line switches understood by the shell
pub mod switches {
    pub const USER_DATA_DIR: &str = "user-data-dir";
    pub const ENABLE_PROFILING: &str = "enable-profiling";
    pub const IDLE_GC_INTERVAL_MS: &str = "idle-gc-interval-ms";
    pub const APP: &str = "app";
    pub const EXIT_WHEN_IDLE: &str = "exit-when-idle";
    pub const DISABLE_MEMORY_MONITOR: &str = "disable-memory-monitor";
    pub const ENABLE_CRASH_REPORTER: &str = "enable-crash-reporter";
    pub const DISABLE_BREAKPAD: &str = "disable-breakpad";
    pub const PROCESS_TYPE: &str = "type";
    pub const LANG: &str = "lang";
}

/// Period of the idle memory-release timer
pub const DEFAULT_IDLE_GC_PERIOD: Duration = Duration::from_secs(60);

/// Upper bound on the end-of-session rundown wait
pub const DEFAULT_END_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

const APP_DIR_NAME: &str = "hearth";

/// Resolved shell configuration
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Persistent storage root; created during PreMainMessageLoopRun
    pub user_data_dir: PathBuf,
    pub idle_gc_period: Duration,
    pub end_session_timeout: Duration,
    /// `Some(value)` when `--enable-profiling` was passed
    pub enable_profiling: Option<String>,
    /// User script evaluated after the bootstrap prelude
    pub app_script: Option<PathBuf>,
    /// Quit the main loop once no tasks, timers-due or script work remain
    pub exit_when_idle: bool,
    /// Poll system memory and raise memory-pressure signals
    pub system_memory_monitor: bool,
}

impl ShellConfig {
    /// Resolve configuration from `cmd`, falling back to the environment
    pub fn from_command_line(cmd: &CommandLine) -> Self {
        let env_dir = std::env::var_os(USER_DATA_DIR_ENV).map(PathBuf::from);
        Self::resolve(cmd, env_dir, default_user_data_dir())
    }

    fn resolve(cmd: &CommandLine, env_dir: Option<PathBuf>, platform_dir: Option<PathBuf>) -> Self {
        let user_data_dir = cmd
            .switch_value(switches::USER_DATA_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or(env_dir.filter(|p| !p.as_os_str().is_empty()))
            .or(platform_dir)
            .unwrap_or_else(|| PathBuf::from(".hearth"));

        let idle_gc_period = cmd
            .switch_value(switches::IDLE_GC_INTERVAL_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_IDLE_GC_PERIOD);

        Self {
            user_data_dir,
            idle_gc_period,
            end_session_timeout: DEFAULT_END_SESSION_TIMEOUT,
            enable_profiling: cmd
                .switch_value(switches::ENABLE_PROFILING)
                .map(str::to_string),
            app_script: cmd
                .switch_value(switches::APP)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            exit_when_idle: cmd.has_switch(switches::EXIT_WHEN_IDLE),
            system_memory_monitor: !cmd.has_switch(switches::DISABLE_MEMORY_MONITOR),
        }
    }

    /// Configuration rooted at `user_data_dir` with monitors disabled
    pub fn for_testing(user_data_dir: impl AsRef<Path>) -> Self {
        Self {
            user_data_dir: user_data_dir.as_ref().to_path_buf(),
            idle_gc_period: DEFAULT_IDLE_GC_PERIOD,
            end_session_timeout: DEFAULT_END_SESSION_TIMEOUT,
            enable_profiling: None,
            app_script: None,
            exit_when_idle: true,
            system_memory_monitor: false,
        }
    }

    /// Path of the JSON local-state file
    pub fn local_state_path(&self) -> PathBuf {
        self.user_data_dir.join("Local State")
    }
}

fn default_user_data_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);
    #[cfg(target_os = "macos")]
    let base = std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Library").join("Application Support"));
    #[cfg(all(unix, not(target_os = "macos")))]
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")));
    #[cfg(not(any(windows, unix)))]
    let base: Option<PathBuf> = None;

    base.map(|dir| dir.join(APP_DIR_NAME))
}
