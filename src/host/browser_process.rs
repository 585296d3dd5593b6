//! Surrogate host-process object
//!
//! Stands in for the host application's process-wide services. Only the
//! services this shell needs are real (local state, profiles, geolocation);
//! the rest report themselves unavailable and callers must cope.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use super::geolocation::{AccessTokenStore, GeolocationDelegate};
use super::prefs::{PrefService, names};
use super::profile::{ExitType, ProfileManager};
use super::worker::{WorkerHandle, WorkerQueue, flush_worker_queues};
use crate::config::ShellConfig;
use crate::utils::{CommandLine, Result};

const DEFAULT_LOCALE: &str = "en-US";

/// Process-wide object tracking status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Active,
    Deactivated,
}

/// Services a host process may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostService {
    LocalState,
    ProfileManager,
    Geolocation,
    NetLog,
    IoThread,
    WatchdogThread,
    NotificationUiManager,
    MetricsServicesManager,
}

/// The host process surrogate
pub struct HostProcess {
    user_data_dir: PathBuf,
    local_state_path: PathBuf,
    end_session_timeout: Duration,
    local_state_queue: WorkerQueue,
    local_state: Option<PrefService>,
    profile_manager: Option<ProfileManager>,
    created_profile_manager: bool,
    locale: String,
    tearing_down: bool,
    trying_to_quit: bool,
    tracking_status: Option<TrackingStatus>,
    geolocation: Option<Box<dyn GeolocationDelegate>>,
    access_token_store: Option<AccessTokenStore>,
}

impl HostProcess {
    /// Create the host process and its local-state worker queue
    pub fn new(config: &ShellConfig) -> Result<Self> {
        Ok(Self {
            user_data_dir: config.user_data_dir.clone(),
            local_state_path: config.local_state_path(),
            end_session_timeout: config.end_session_timeout,
            local_state_queue: WorkerQueue::spawn("local-state")?,
            local_state: None,
            profile_manager: None,
            created_profile_manager: false,
            locale: locale_from_env(),
            tearing_down: false,
            trying_to_quit: false,
            tracking_status: None,
            geolocation: None,
            access_token_store: None,
        })
    }

    /// Directory profiles and local state live under
    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    /// Create local state on first use
    pub fn create_local_state(&mut self) -> Result<&mut PrefService> {
        let prefs = match self.local_state.take() {
            Some(prefs) => prefs,
            None => {
                let mut prefs =
                    PrefService::load(&self.local_state_path, Some(self.local_state_queue.handle()))?;
                prefs.register_boolean_pref(names::METRICS_REPORTING_ENABLED, false);
                prefs.register_boolean_pref(names::RESTART_LAST_SESSION, false);
                prefs.register_string_pref(names::APP_LOCALE, "");
                debug!("Local state loaded from {}", self.local_state_path.display());
                prefs
            }
        };
        Ok(self.local_state.insert(prefs))
    }

    /// Whether local state has been created
    pub fn created_local_state(&self) -> bool {
        self.local_state.is_some()
    }

    /// Local-state preferences, once created
    pub fn local_state(&self) -> Option<&PrefService> {
        self.local_state.as_ref()
    }

    /// Mutable local-state preferences, once created
    pub fn local_state_mut(&mut self) -> Option<&mut PrefService> {
        self.local_state.as_mut()
    }

    /// The profile manager, created on first use; `None` after teardown
    pub fn profile_manager(&mut self) -> Option<&mut ProfileManager> {
        if !self.created_profile_manager {
            self.created_profile_manager = true;
            self.profile_manager = Some(ProfileManager::new(&self.user_data_dir));
        }
        self.profile_manager.as_mut()
    }

    /// Apply the `--enable-profiling` switch value
    pub fn init_tracking(&mut self, flag: &str) {
        // "0" activates tracking, any other value deactivates it.
        let status = if flag == "0" {
            TrackingStatus::Active
        } else {
            TrackingStatus::Deactivated
        };
        info!("Object tracking status: {:?}", status);
        self.tracking_status = Some(status);
    }

    /// Tracking status chosen by `--enable-profiling`, if any
    pub fn tracking_status(&self) -> Option<TrackingStatus> {
        self.tracking_status
    }

    /// Install the delegate the access-token store comes from
    pub fn set_geolocation_delegate(&mut self, delegate: Box<dyn GeolocationDelegate>) {
        self.geolocation = Some(delegate);
    }

    /// Store created from the geolocation delegate before the loop runs
    pub fn access_token_store(&self) -> Option<&AccessTokenStore> {
        self.access_token_store.as_ref()
    }

    /// Current application locale
    pub fn application_locale(&self) -> &str {
        &self.locale
    }

    /// Replace the application locale
    pub fn set_application_locale(&mut self, locale: &str) {
        self.locale = locale.to_string();
    }

    /// Whether `service` is implemented by this host
    pub fn has_service(&self, service: HostService) -> bool {
        match service {
            HostService::LocalState => self.local_state.is_some(),
            HostService::ProfileManager => self.profile_manager.is_some() || !self.created_profile_manager,
            HostService::Geolocation => self.geolocation.is_some(),
            HostService::NetLog
            | HostService::IoThread
            | HostService::WatchdogThread
            | HostService::NotificationUiManager
            | HostService::MetricsServicesManager => not_implemented(service).is_some(),
        }
    }

    /// Not provided; always `None`
    pub fn net_log(&self) -> Option<&dyn Any> {
        not_implemented(HostService::NetLog)
    }

    /// Not provided; always `None`
    pub fn io_thread(&self) -> Option<&dyn Any> {
        not_implemented(HostService::IoThread)
    }

    /// Not provided; always `None`
    pub fn watchdog_thread(&self) -> Option<&dyn Any> {
        not_implemented(HostService::WatchdogThread)
    }

    /// Not provided; always `None`
    pub fn notification_ui_manager(&self) -> Option<&dyn Any> {
        not_implemented(HostService::NotificationUiManager)
    }

    /// Not provided; always `None`
    pub fn metrics_services_manager(&self) -> Option<&dyn Any> {
        not_implemented(HostService::MetricsServicesManager)
    }

    /// Create local state, apply command-line prefs and the saved locale
    pub fn pre_create_threads(&mut self, cmd: &CommandLine) -> Result<()> {
        let prefs = self.create_local_state()?;
        prefs.update_command_line_pref_store(cmd);
        let locale = prefs
            .get_string(names::APP_LOCALE)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        if let Some(locale) = locale {
            self.set_application_locale(&locale);
        }
        Ok(())
    }

    /// Create the access-token store from the geolocation delegate
    pub fn pre_main_message_loop_run(&mut self) {
        if let Some(delegate) = &self.geolocation {
            self.access_token_store = Some(delegate.create_access_token_store());
        }
        debug!("Host process ready for the main loop");
    }

    /// Begin teardown: flag shutdown, drop profiles, commit local state
    pub fn start_tear_down(&mut self) {
        info!("Host process tearing down");
        self.tearing_down = true;
        self.trying_to_quit = true;

        // Dropping the manager marks profiles cleanly exited and joins their IO queues.
        self.profile_manager = None;

        if let Some(local_state) = self.local_state.as_mut() {
            local_state.commit_pending_write();
        }
    }

    /// Whether teardown has started
    pub fn is_shutting_down(&self) -> bool {
        self.tearing_down
    }

    /// Whether the process is trying to quit
    pub fn is_trying_to_quit(&self) -> bool {
        self.trying_to_quit
    }

    /// Bound on how long `end_session` waits for pending writes
    pub fn set_end_session_timeout(&mut self, timeout: Duration) {
        self.end_session_timeout = timeout;
    }

    /// Mark profiles as session-ended and wait, bounded, for pending writes
    pub fn end_session(&mut self) -> bool {
        let mut writers: Vec<WorkerHandle> = Vec::new();

        if let Some(manager) = self.profile_manager.as_ref() {
            for profile in manager.loaded_profiles() {
                let mut profile = profile.borrow_mut();
                profile.set_exit_type(ExitType::SessionEnded);
                profile.prefs_mut().commit_pending_write();
                writers.push(profile.io_handle());
            }
        }

        if let Some(local_state) = self.local_state.as_mut() {
            local_state.commit_pending_write();
            writers.push(self.local_state_queue.handle());
        }

        flush_worker_queues(&writers, self.end_session_timeout)
    }

    /// Threads are gone: stop the local-state writer
    pub fn post_destroy_threads(&mut self) {
        self.local_state_queue.shutdown();
        debug!("Host process worker threads stopped");
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        debug!("Host process deleted");
    }
}

fn not_implemented(service: HostService) -> Option<&'static dyn Any> {
    warn!("{:?} is not implemented by this host", service);
    None
}

fn locale_from_env() -> String {
    std::env::var("LANG")
        .ok()
        .and_then(|lang| {
            let tag = lang.split('.').next().unwrap_or_default().replace('_', "-");
            if tag.is_empty() || tag == "C" || tag == "POSIX" {
                None
            } else {
                Some(tag)
            }
        })
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(dir: &Path) -> HostProcess {
        HostProcess::new(&ShellConfig::for_testing(dir)).unwrap()
    }

    #[test]
    fn test_local_state_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());
        assert!(!host.created_local_state());
        host.pre_create_threads(&CommandLine::new("hearth")).unwrap();
        let prefs = host.local_state().unwrap();
        assert!(!prefs.get_boolean(names::METRICS_REPORTING_ENABLED));
    }

    #[test]
    fn test_lang_switch_sets_locale() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());
        host.pre_create_threads(&CommandLine::from_args(["hearth", "--lang=pt-BR"]))
            .unwrap();
        assert_eq!(host.application_locale(), "pt-BR");
    }

    #[test]
    fn test_tracking_flag_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());
        host.init_tracking("0");
        assert_eq!(host.tracking_status(), Some(TrackingStatus::Active));
        host.init_tracking("1");
        assert_eq!(host.tracking_status(), Some(TrackingStatus::Deactivated));
    }

    #[test]
    fn test_stub_services_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());
        assert!(!host.has_service(HostService::NetLog));
        assert!(!host.has_service(HostService::IoThread));
        assert!(!host.has_service(HostService::LocalState));
        assert!(host.net_log().is_none());
        assert!(host.metrics_services_manager().is_none());
    }

    #[test]
    fn test_profile_manager_gone_after_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());
        host.pre_create_threads(&CommandLine::new("hearth")).unwrap();
        assert!(host.profile_manager().is_some());
        host.start_tear_down();
        assert!(host.is_shutting_down());
        assert!(host.profile_manager().is_none());
    }

    #[test]
    fn test_end_session_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host(dir.path());
        host.pre_create_threads(&CommandLine::new("hearth")).unwrap();
        let profile = host
            .profile_manager()
            .unwrap()
            .get_active_user_profile()
            .unwrap();
        assert!(host.end_session());
        assert_eq!(profile.borrow().exit_type(), ExitType::SessionEnded);
        assert!(!host.local_state().unwrap().has_pending_write());
    }
}
