//! JSON-backed preference store

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::{Map, Value};

use super::worker::WorkerHandle;
use crate::utils::{CommandLine, Result, ShellError};

/// Preference names
pub mod names {
    /// Crash and usage reporting consent
    pub const METRICS_REPORTING_ENABLED: &str = "metrics.reporting_enabled";
    /// Set to restore the previous session on next start
    pub const RESTART_LAST_SESSION: &str = "browser.restart_last_session";
    pub const APP_LOCALE: &str = "intl.app_locale";
    pub const PROFILE_EXIT_TYPE: &str = "profile.exit_type";
}

/// Preferences with registered defaults, user values and command-line overrides
#[derive(Debug)]
pub struct PrefService {
    path: PathBuf,
    defaults: BTreeMap<String, Value>,
    user_values: Map<String, Value>,
    command_line_values: BTreeMap<String, Value>,
    writer: Option<WorkerHandle>,
    dirty: bool,
}

impl PrefService {
    /// Load preferences from `path`; a missing or corrupt file starts empty
    pub fn load(path: impl AsRef<Path>, writer: Option<WorkerHandle>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let user_values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("Ignoring unreadable preferences at {}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(ShellError::Prefs(format!("{}: {}", path.display(), e))),
        };

        Ok(Self {
            path,
            defaults: BTreeMap::new(),
            user_values,
            command_line_values: BTreeMap::new(),
            writer,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn register_boolean_pref(&mut self, name: &str, default: bool) {
        self.defaults.insert(name.to_string(), Value::Bool(default));
    }

    pub fn register_string_pref(&mut self, name: &str, default: &str) {
        self.defaults.insert(name.to_string(), Value::String(default.to_string()));
    }

    /// Effective value: command line, then user value, then default
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.command_line_values
            .get(name)
            .or_else(|| self.user_values.get(name))
            .or_else(|| self.defaults.get(name))
    }

    pub fn get_boolean(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn set_boolean(&mut self, name: &str, value: bool) {
        self.set_value(name, Value::Bool(value));
    }

    pub fn set_string(&mut self, name: &str, value: &str) {
        self.set_value(name, Value::String(value.to_string()));
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        if self.user_values.get(name) != Some(&value) {
            self.user_values.insert(name.to_string(), value);
            self.dirty = true;
        }
    }

    pub fn clear_pref(&mut self, name: &str) {
        if self.user_values.remove(name).is_some() {
            self.dirty = true;
        }
    }

    /// Apply command-line switches that map onto preferences
    pub fn update_command_line_pref_store(&mut self, cmd: &CommandLine) {
        if let Some(lang) = cmd.switch_value(crate::config::switches::LANG) {
            if !lang.is_empty() {
                self.command_line_values
                    .insert(names::APP_LOCALE.to_string(), Value::String(lang.to_string()));
            }
        }
    }

    pub fn has_pending_write(&self) -> bool {
        self.dirty
    }

    /// Schedule a write of the current values on the writer queue
    pub fn commit_pending_write(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        let path = self.path.clone();
        let snapshot = Value::Object(self.user_values.clone());
        let write = move || match serialize_to(&path, &snapshot) {
            Ok(()) => debug!("Preferences written to {}", path.display()),
            Err(e) => warn!("Failed to write preferences {}: {}", path.display(), e),
        };

        match &self.writer {
            Some(writer) => {
                if !writer.post_task(write) {
                    warn!("Preference writer for {} is gone; write dropped", self.path.display());
                }
            }
            None => write(),
        }
    }

    pub fn writer(&self) -> Option<&WorkerHandle> {
        self.writer.as_ref()
    }
}

fn serialize_to(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value)?;
    fs::write(path, contents)?;
    Ok(())
}
