//! Encryption for the at-rest session file.
//!
//! Layout: `CMS1` magic, 16-byte salt, 12-byte nonce, ChaCha20-Poly1305
//! ciphertext. Every seal uses a fresh nonce.

use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;

use super::credentials::SERVICE_NAME;

const MAGIC: &[u8; 4] = b"CMS1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Keychain entry holding the random file key
const KEY_ENTRY: &str = "session-key";

/// Where the file encryption key comes from.
#[derive(Clone)]
pub enum KeySource {
    /// Derived from a passphrase with Argon2 and the per-file salt
    Passphrase(String),
    /// Random key kept in the OS keychain, created on first use
    Keychain,
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Passphrase(_) => f.write_str("Passphrase(..)"),
            KeySource::Keychain => f.write_str("Keychain"),
        }
    }
}

pub(crate) struct Sealer {
    source: KeySource,
    /// Last (salt, key) pair, so rolling refreshes don't re-run Argon2
    cached: Mutex<Option<([u8; SALT_LEN], [u8; KEY_LEN])>>,
}

impl Sealer {
    pub(crate) fn new(source: KeySource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let (salt, key) = match self.cached_pair() {
            Some(pair) => pair,
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                let key = self.derive_key(&salt)?;
                self.remember(salt, key);
                (salt, key)
            }
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt session"))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub(crate) fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < HEADER_LEN || &sealed[..MAGIC.len()] != MAGIC {
            bail!("Session file is not a recognized encrypted session");
        }
        let (salt_bytes, rest) = sealed[MAGIC.len()..].split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);

        let key = match self.cached_pair() {
            Some((cached_salt, key)) if cached_salt == salt => key,
            _ => self.derive_key(&salt)?,
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt session (wrong key or corrupted file)"))?;

        self.remember(salt, key);
        Ok(plaintext)
    }

    fn cached_pair(&self) -> Option<([u8; SALT_LEN], [u8; KEY_LEN])> {
        self.cached.lock().ok().and_then(|cached| *cached)
    }

    fn remember(&self, salt: [u8; SALT_LEN], key: [u8; KEY_LEN]) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((salt, key));
        }
    }

    fn derive_key(&self, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
        match &self.source {
            KeySource::Passphrase(passphrase) => {
                let mut key = [0u8; KEY_LEN];
                Argon2::default()
                    .hash_password_into(passphrase.as_bytes(), salt, &mut key)
                    .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
                Ok(key)
            }
            KeySource::Keychain => keychain_key(),
        }
    }
}

fn keychain_key() -> Result<[u8; KEY_LEN]> {
    let entry = Entry::new(SERVICE_NAME, KEY_ENTRY).context("Failed to create keyring entry")?;
    match entry.get_secret() {
        Ok(secret) => <[u8; KEY_LEN]>::try_from(secret)
            .map_err(|_| anyhow!("Session key in keychain has the wrong length")),
        Err(keyring::Error::NoEntry) => {
            let mut key = [0u8; KEY_LEN];
            OsRng.fill_bytes(&mut key);
            entry
                .set_secret(&key)
                .context("Failed to store session key in keychain")?;
            Ok(key)
        }
        Err(e) => Err(e).context("Failed to read session key from keychain"),
    }
}
