use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::sealed::{KeySource, Sealer};
use super::store::CredentialStore;
use crate::models::UserProfile;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Encrypted session file name in cache directory
const SEALED_SESSION_FILE: &str = "session.enc";

/// Everything a file-backed store keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    /// When the token was last written (login or rolling refresh)
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    fn is_empty(&self) -> bool {
        self.token.is_none() && self.user.is_none()
    }
}

enum Codec {
    Json,
    Sealed(Sealer),
}

impl Codec {
    fn encode(&self, record: &SessionRecord) -> Result<Vec<u8>> {
        match self {
            Codec::Json => Ok(serde_json::to_vec_pretty(record)?),
            Codec::Sealed(sealer) => sealer.seal(&serde_json::to_vec(record)?),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<SessionRecord> {
        match self {
            Codec::Json => serde_json::from_slice(bytes).context("Failed to parse session file"),
            Codec::Sealed(sealer) => {
                let plain = sealer.open(bytes)?;
                serde_json::from_slice(&plain).context("Failed to parse decrypted session")
            }
        }
    }
}

/// Credential store backed by a single file in the cache directory.
///
/// The plain variant writes JSON; the encrypted variant seals the same
/// record with ChaCha20-Poly1305. Writes read the current record, change one
/// field and write the whole record back under an in-process lock.
pub struct FileStore {
    path: PathBuf,
    codec: Codec,
    cache_profile: bool,
    io: Mutex<()>,
}

impl FileStore {
    /// Plain JSON store that keeps only the token
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(SESSION_FILE),
            codec: Codec::Json,
            cache_profile: false,
            io: Mutex::new(()),
        }
    }

    /// Encrypted-at-rest store. Keeps the profile next to the token.
    pub fn encrypted(cache_dir: &Path, key_source: KeySource) -> Self {
        Self {
            path: cache_dir.join(SEALED_SESSION_FILE),
            codec: Codec::Sealed(Sealer::new(key_source)),
            cache_profile: true,
            io: Mutex::new(()),
        }
    }

    pub fn with_profile_cache(mut self, enabled: bool) -> Self {
        self.cache_profile = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record from disk. A missing file is an empty record.
    pub async fn load(&self) -> Result<SessionRecord> {
        let _guard = self.io.lock().await;
        self.read_record()
    }

    fn read_record(&self) -> Result<SessionRecord> {
        if !self.path.exists() {
            return Ok(SessionRecord::default());
        }
        let bytes = std::fs::read(&self.path).context("Failed to read session file")?;
        self.codec.decode(&bytes)
    }

    fn write_record(&self, record: &SessionRecord) -> Result<()> {
        if record.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = self.codec.encode(record)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        restrict_permissions(&self.path);
        Ok(())
    }

    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut SessionRecord) + Send,
    {
        let _guard = self.io.lock().await;
        let mut record = match self.read_record() {
            Ok(record) => record,
            Err(e) => {
                // Unreadable entries are replaced rather than kept around
                warn!(error = %e, path = ?self.path, "Discarding unreadable session file");
                SessionRecord::default()
            }
        };
        change(&mut record);
        self.write_record(&record)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        debug!(error = %e, "Failed to restrict session file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get_token(&self) -> Result<Option<String>> {
        Ok(self.load().await?.token)
    }

    async fn set_token(&self, token: &str) -> Result<()> {
        let token = token.to_string();
        self.update(move |record| {
            record.token = Some(token);
            record.saved_at = Some(Utc::now());
        })
        .await
    }

    async fn clear_token(&self) -> Result<()> {
        self.update(|record| {
            record.token = None;
            record.saved_at = None;
        })
        .await
    }

    async fn get_profile(&self) -> Result<Option<UserProfile>> {
        if !self.cache_profile {
            return Ok(None);
        }
        Ok(self.load().await?.user)
    }

    async fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        if !self.cache_profile {
            return Ok(());
        }
        let profile = profile.clone();
        self.update(move |record| record.user = Some(profile)).await
    }

    async fn clear_profile(&self) -> Result<()> {
        self.update(|record| record.user = None).await
    }

    fn persists_profile(&self) -> bool {
        self.cache_profile
    }
}
