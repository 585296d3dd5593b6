//! Crash backends

use std::collections::BTreeMap;

use log::{debug, info};

/// Whatever actually collects and uploads crash dumps
pub trait CrashBackend {
    /// Start the handler for `process_type` (empty for the browser process)
    fn initialize(&mut self, process_type: &str);
    fn set_upload_consent(&mut self, enabled: bool);
    fn set_crash_key(&mut self, key: &str, value: &str);
}

/// Backend that records state and logs it; no dumps are written
#[derive(Debug, Default)]
pub struct LoggingCrashBackend {
    initialized_for: Option<String>,
    upload_consent: bool,
    keys: BTreeMap<String, String>,
}

impl LoggingCrashBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized_for(&self) -> Option<&str> {
        self.initialized_for.as_deref()
    }

    pub fn upload_consent(&self) -> bool {
        self.upload_consent
    }

    pub fn crash_key(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }
}

impl CrashBackend for LoggingCrashBackend {
    fn initialize(&mut self, process_type: &str) {
        let label = if process_type.is_empty() { "browser" } else { process_type };
        info!("Crash handler initialized for {} process", label);
        self.initialized_for = Some(process_type.to_string());
    }

    fn set_upload_consent(&mut self, enabled: bool) {
        debug!("Crash upload consent: {}", enabled);
        self.upload_consent = enabled;
    }

    fn set_crash_key(&mut self, key: &str, value: &str) {
        self.keys.insert(key.to_string(), value.to_string());
    }
}
