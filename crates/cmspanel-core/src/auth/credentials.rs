use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;
use tracing::warn;

use super::store::CredentialStore;
use crate::models::UserProfile;

pub(crate) const SERVICE_NAME: &str = "cmspanel";

const TOKEN_ENTRY: &str = "session-token";
const PROFILE_ENTRY: &str = "session-profile";

/// Credential store in the OS keychain.
///
/// Token and JSON-serialized profile live in two entries and are read
/// together on start.
pub struct KeyringStore {
    account_prefix: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            account_prefix: String::new(),
        }
    }

    /// Separate entries per API base URL so sessions for different sites
    /// don't overwrite each other
    pub fn for_site(site: &str) -> Self {
        Self {
            account_prefix: format!("{}:", site),
        }
    }

    fn entry(&self, name: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &format!("{}{}", self.account_prefix, name))
            .context("Failed to create keyring entry")
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read from keychain"),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        self.entry(name)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get_token(&self) -> Result<Option<String>> {
        self.read(TOKEN_ENTRY)
    }

    async fn set_token(&self, token: &str) -> Result<()> {
        self.write(TOKEN_ENTRY, token)
    }

    async fn clear_token(&self) -> Result<()> {
        self.delete(TOKEN_ENTRY)
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>> {
        let Some(raw) = self.read(PROFILE_ENTRY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(error = %e, "Cached profile in keychain is unreadable");
                Err(e).context("Failed to parse cached profile")
            }
        }
    }

    async fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        let raw = serde_json::to_string(profile)?;
        self.write(PROFILE_ENTRY, &raw)
    }

    async fn clear_profile(&self) -> Result<()> {
        self.delete(PROFILE_ENTRY)
    }

    fn persists_profile(&self) -> bool {
        true
    }
}
