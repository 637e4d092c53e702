use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::UserProfile;

/// Persistent key-value storage for the bearer token and, optionally, a
/// cached copy of the signed-in user's profile.
///
/// Each method is a single read or write of one entry. Token and profile are
/// logically paired but not stored transactionally; pairing is enforced by
/// the session context. A read that fails (unreadable or corrupted entry) is
/// reported as an error so callers can discard the session.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_token(&self) -> Result<Option<String>>;

    async fn set_token(&self, token: &str) -> Result<()>;

    async fn clear_token(&self) -> Result<()>;

    async fn get_profile(&self) -> Result<Option<UserProfile>>;

    async fn set_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn clear_profile(&self) -> Result<()>;

    /// Whether this store keeps a cached profile between runs. Stores that
    /// don't ignore profile writes and the profile is re-fetched on start.
    fn persists_profile(&self) -> bool;
}

#[derive(Debug, Default)]
struct MemoryEntries {
    token: Option<String>,
    profile: Option<UserProfile>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<MemoryEntries>,
    cache_profile: bool,
}

impl MemoryStore {
    /// Token-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that also keeps the profile
    pub fn with_profile_cache() -> Self {
        Self {
            entries: Mutex::default(),
            cache_profile: true,
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, MemoryEntries>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_token(&self) -> Result<Option<String>> {
        Ok(self.entries()?.token.clone())
    }

    async fn set_token(&self, token: &str) -> Result<()> {
        self.entries()?.token = Some(token.to_string());
        Ok(())
    }

    async fn clear_token(&self) -> Result<()> {
        self.entries()?.token = None;
        Ok(())
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>> {
        Ok(self.entries()?.profile.clone())
    }

    async fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        if self.cache_profile {
            self.entries()?.profile = Some(profile.clone());
        }
        Ok(())
    }

    async fn clear_profile(&self) -> Result<()> {
        self.entries()?.profile = None;
        Ok(())
    }

    fn persists_profile(&self) -> bool {
        self.cache_profile
    }
}
