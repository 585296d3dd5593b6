//! Geolocation delegate installed during thread pre-creation

use std::collections::BTreeMap;

/// Access tokens handed to network location providers, keyed by provider URL
#[derive(Debug, Default, Clone)]
pub struct AccessTokenStore {
    tokens: BTreeMap<String, String>,
}

impl AccessTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(&self, provider: &str) -> Option<&str> {
        self.tokens.get(provider).map(String::as_str)
    }

    pub fn save_token(&mut self, provider: &str, token: &str) {
        self.tokens.insert(provider.to_string(), token.to_string());
    }
}

/// Supplies geolocation services to the host
pub trait GeolocationDelegate {
    fn create_access_token_store(&self) -> AccessTokenStore;
}

/// Delegate backed by an empty, in-memory token store
#[derive(Debug, Default)]
pub struct ShellGeolocationDelegate;

impl GeolocationDelegate for ShellGeolocationDelegate {
    fn create_access_token_store(&self) -> AccessTokenStore {
        AccessTokenStore::new()
    }
}
