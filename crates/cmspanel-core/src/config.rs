//! Application configuration management.
//!
//! This module handles loading and saving the configuration: which API to
//! talk to, where the session is kept and how the client behaves.
//!
//! Configuration is stored at `~/.config/cmspanel/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::{ClientOptions, DEFAULT_REFRESH_HEADER, REQUEST_TIMEOUT_SECS};
use crate::auth::{CredentialStore, FileStore, KeySource, KeyringStore};
use crate::notifications::DEFAULT_POLL_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "cmspanel";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "CMSPANEL_API_URL";

/// Environment variable holding the passphrase for the encrypted store
pub const STORE_PASSPHRASE_ENV: &str = "CMSPANEL_STORE_PASSPHRASE";

/// Used when neither the environment, the config file nor the build set one
const FALLBACK_API_URL: &str = "http://localhost:3000/api";

/// Where the session token is kept between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// OS keychain, token and profile
    #[default]
    Keyring,
    /// Plain JSON file in the cache directory, token only unless
    /// `cache_profile` is set
    File,
    /// ChaCha20-Poly1305 sealed file, token and profile
    Encrypted,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    /// Set from the command line; beats everything else and is never saved
    #[serde(skip)]
    pub api_url_override: Option<String>,
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default)]
    pub cache_profile: bool,
    pub refresh_header: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub notification_poll_secs: Option<u64>,
    #[serde(default)]
    pub revoke_on_logout: bool,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL from the command line, the environment, the config file,
    /// then the build
    pub fn api_base_url(&self) -> String {
        if let Some(ref url) = self.api_url_override {
            return url.clone();
        }
        resolve_base_url(std::env::var(API_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(self.api_base_url());
        options.refresh_header = self
            .refresh_header
            .clone()
            .unwrap_or_else(|| DEFAULT_REFRESH_HEADER.to_string());
        options.timeout = Duration::from_secs(self.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS));
        options
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_secs.unwrap_or(DEFAULT_POLL_SECS).max(1))
    }

    /// Build the configured credential store
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match self.store {
            StoreKind::Keyring => Arc::new(KeyringStore::for_site(&self.api_base_url())),
            StoreKind::File => {
                Arc::new(FileStore::new(&self.cache_dir()?).with_profile_cache(self.cache_profile))
            }
            StoreKind::Encrypted => {
                let key_source = match std::env::var(STORE_PASSPHRASE_ENV) {
                    Ok(passphrase) if !passphrase.is_empty() => KeySource::Passphrase(passphrase),
                    _ => KeySource::Keychain,
                };
                Arc::new(FileStore::encrypted(&self.cache_dir()?, key_source))
            }
        };
        Ok(store)
    }
}

fn resolve_base_url(from_env: Option<String>, configured: Option<&str>) -> String {
    from_env
        .filter(|url| !url.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .or_else(|| option_env!("CMSPANEL_API_URL").map(str::to_string))
        .unwrap_or_else(|| FALLBACK_API_URL.to_string())
}
