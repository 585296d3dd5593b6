//! User profiles and the profile manager

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::prefs::{PrefService, names};
use super::worker::{WorkerHandle, WorkerQueue};
use crate::utils::{Result, ShellError};

/// Name of the profile used when nothing else is selected
pub const DEFAULT_PROFILE_NAME: &str = "Default";

const PREFERENCES_FILE: &str = "Preferences";

/// How the previous session ended, persisted in profile preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExitType {
    /// Still running, or the process died without shutting down
    #[default]
    Crashed,
    Normal,
    SessionEnded,
}

/// Shared handle to a loaded profile
pub type ProfileRef = Rc<RefCell<Profile>>;

/// A user profile: a directory, its preferences and its IO queue
pub struct Profile {
    name: String,
    path: PathBuf,
    prefs: PrefService,
    io_queue: WorkerQueue,
    last_exit_type: ExitType,
}

impl Profile {
    /// Open (creating if needed) the profile at `path`
    pub fn open(name: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)
            .map_err(|e| ShellError::Path(format!("{}: {}", path.display(), e)))?;

        let io_queue = WorkerQueue::spawn(&format!("profile-io-{}", name))?;
        let prefs = PrefService::load(path.join(PREFERENCES_FILE), Some(io_queue.handle()))?;
        let last_exit_type = prefs
            .get(names::PROFILE_EXIT_TYPE)
            .and_then(|v| serde_json::from_value::<ExitType>(v.clone()).ok())
            .unwrap_or(ExitType::Normal);

        if last_exit_type == ExitType::Crashed {
            warn!("Profile {} did not exit cleanly last time", name);
        }

        let mut profile = Self {
            name: name.to_string(),
            path,
            prefs,
            io_queue,
            last_exit_type,
        };
        profile.set_exit_type(ExitType::Crashed);
        profile.prefs.commit_pending_write();
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefs(&self) -> &PrefService {
        &self.prefs
    }

    pub fn prefs_mut(&mut self) -> &mut PrefService {
        &mut self.prefs
    }

    /// Exit type recorded by the previous session
    pub fn last_exit_type(&self) -> ExitType {
        self.last_exit_type
    }

    pub fn exit_type(&self) -> ExitType {
        self.prefs
            .get(names::PROFILE_EXIT_TYPE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_exit_type(&mut self, exit_type: ExitType) {
        match serde_json::to_value(exit_type) {
            Ok(value) => self.prefs.set_value(names::PROFILE_EXIT_TYPE, value),
            Err(e) => warn!("Cannot record exit type for {}: {}", self.name, e),
        }
    }

    pub fn io_handle(&self) -> WorkerHandle {
        self.io_queue.handle()
    }

    /// Record a clean exit, flush and stop the IO queue
    fn shutdown(&mut self) {
        if self.exit_type() == ExitType::Crashed {
            self.set_exit_type(ExitType::Normal);
        }
        self.prefs.commit_pending_write();
        self.io_queue.shutdown();
    }
}

/// Loads profiles under the user data directory
pub struct ProfileManager {
    user_data_dir: PathBuf,
    profiles: Vec<ProfileRef>,
}

impl ProfileManager {
    pub fn new(user_data_dir: impl AsRef<Path>) -> Self {
        Self {
            user_data_dir: user_data_dir.as_ref().to_path_buf(),
            profiles: Vec::new(),
        }
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    /// Load `name`, reusing an already loaded profile
    pub fn get_profile(&mut self, name: &str) -> Result<ProfileRef> {
        if let Some(profile) = self.profiles.iter().find(|p| p.borrow().name() == name) {
            return Ok(Rc::clone(profile));
        }

        info!("Loading profile {}", name);
        let profile = Rc::new(RefCell::new(Profile::open(name, self.user_data_dir.join(name))?));
        self.profiles.push(Rc::clone(&profile));
        Ok(profile)
    }

    /// The profile used for the browser context
    pub fn get_active_user_profile(&mut self) -> Result<ProfileRef> {
        self.get_profile(DEFAULT_PROFILE_NAME)
    }

    pub fn loaded_profiles(&self) -> &[ProfileRef] {
        &self.profiles
    }
}

impl Drop for ProfileManager {
    fn drop(&mut self) {
        for profile in &self.profiles {
            if Rc::strong_count(profile) > 1 {
                warn!("Profile {} still referenced at teardown", profile.borrow().name());
            }
            profile.borrow_mut().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_profile_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ProfileManager::new(dir.path());
        let a = manager.get_active_user_profile().unwrap();
        let b = manager.get_active_user_profile().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(manager.loaded_profiles().len(), 1);
        assert!(dir.path().join(DEFAULT_PROFILE_NAME).is_dir());
    }

    #[test]
    fn test_exit_type_round_trip_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut manager = ProfileManager::new(dir.path());
            let profile = manager.get_active_user_profile().unwrap();
            assert_eq!(profile.borrow().exit_type(), ExitType::Crashed);
        }
        let mut manager = ProfileManager::new(dir.path());
        let profile = manager.get_active_user_profile().unwrap();
        assert_eq!(profile.borrow().last_exit_type(), ExitType::Normal);
    }

    #[test]
    fn test_unclean_exit_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_PROFILE_NAME);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(PREFERENCES_FILE), r#"{"profile.exit_type":"Crashed"}"#).unwrap();

        let mut manager = ProfileManager::new(dir.path());
        let profile = manager.get_active_user_profile().unwrap();
        assert_eq!(profile.borrow().last_exit_type(), ExitType::Crashed);
    }
}
