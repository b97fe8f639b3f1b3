//! zkm-secrets: confidentiality-scoped local storage for session credentials
//!
//! Two independent records:
//!   * the ephemeral session: three named slots (ephemeral key, randomness,
//!     max epoch) written, read, and cleared as one unit;
//!   * the per-user salt: created once, survives across sessions.
//!
//! Backends:
//!   1. `memory`  : process-local, for tests and embedding
//!   2. `file`    : JSON files with 0600 permissions, atomic temp+rename writes
//!   3. `keychain`: platform keychain via the `keyring` crate

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileStore;
pub use keychain::KeychainStore;
pub use memory::MemoryStore;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};
use zkm_core::config::StoreConfig;
use zkm_core::Epoch;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown secret store backend: {0:?} (expected file, keychain, or memory)")]
    UnknownBackend(String),

    /// The stored record exists but cannot be parsed.
    #[error("stored session record is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The named slots making up a persisted ephemeral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    EphemeralKey,
    Randomness,
    MaxEpoch,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::EphemeralKey, Slot::Randomness, Slot::MaxEpoch];

    pub fn name(&self) -> &'static str {
        match self {
            Slot::EphemeralKey => "ephemeral-key",
            Slot::Randomness => "randomness",
            Slot::MaxEpoch => "max-epoch",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete set of session secrets, as written at session creation.
pub struct SessionSecrets {
    /// Ephemeral signing key seed (base64)
    pub ephemeral_key: SecretString,
    /// Session randomness (decimal)
    pub randomness: SecretString,
    pub max_epoch: Epoch,
}

impl fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSecrets")
            .field("ephemeral_key", &"[REDACTED]")
            .field("randomness", &"[REDACTED]")
            .field("max_epoch", &self.max_epoch)
            .finish()
    }
}

/// Whatever the store currently holds for the session slots.
///
/// A backend never fills gaps with defaults; callers decide whether a
/// partial readout is usable (it never is for a session).
#[derive(Default)]
pub struct StoredSlots {
    pub ephemeral_key: Option<SecretString>,
    pub randomness: Option<SecretString>,
    pub max_epoch: Option<Epoch>,
}

impl StoredSlots {
    /// True when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.ephemeral_key.is_none() && self.randomness.is_none() && self.max_epoch.is_none()
    }

    /// Slots that hold no value.
    pub fn missing(&self) -> Vec<Slot> {
        let mut missing = Vec::new();
        if self.ephemeral_key.is_none() {
            missing.push(Slot::EphemeralKey);
        }
        if self.randomness.is_none() {
            missing.push(Slot::Randomness);
        }
        if self.max_epoch.is_none() {
            missing.push(Slot::MaxEpoch);
        }
        missing
    }

    /// Convert into a complete [`SessionSecrets`], or report which slots are absent.
    pub fn complete(self) -> Result<SessionSecrets, Vec<Slot>> {
        match (self.ephemeral_key, self.randomness, self.max_epoch) {
            (Some(ephemeral_key), Some(randomness), Some(max_epoch)) => Ok(SessionSecrets {
                ephemeral_key,
                randomness,
                max_epoch,
            }),
            (k, r, e) => Err(StoredSlots {
                ephemeral_key: k,
                randomness: r,
                max_epoch: e,
            }
            .missing()),
        }
    }
}

impl fmt::Debug for StoredSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSlots")
            .field("ephemeral_key", &self.ephemeral_key.as_ref().map(|_| "[REDACTED]"))
            .field("randomness", &self.randomness.as_ref().map(|_| "[REDACTED]"))
            .field("max_epoch", &self.max_epoch)
            .finish()
    }
}

/// Injected storage capability for session secrets and the user salt.
///
/// Implementations must make `save_session` and `clear_session` affect all
/// three slots together: a reader never observes a half-written session.
pub trait SecretStore: Send + Sync {
    fn save_session(&self, secrets: &SessionSecrets) -> Result<(), StoreError>;
    fn load_session(&self) -> Result<StoredSlots, StoreError>;
    fn clear_session(&self) -> Result<(), StoreError>;

    fn load_salt(&self) -> Result<Option<SecretString>, StoreError>;
    fn save_salt(&self, salt: &SecretString) -> Result<(), StoreError>;
    fn clear_salt(&self) -> Result<(), StoreError>;
}

/// Build the backend selected in config.
pub fn build_store(config: &StoreConfig) -> Result<Box<dyn SecretStore>, StoreError> {
    let store: Box<dyn SecretStore> = match config.backend.as_str() {
        "memory" => Box::new(MemoryStore::new()),
        "file" => Box::new(FileStore::new(expand_tilde(&config.dir))),
        "keychain" => Box::new(KeychainStore::new(&config.keychain_service)),
        other => return Err(StoreError::UnknownBackend(other.to_string())),
    };
    tracing::debug!(backend = %config.backend, "secret store ready");
    Ok(store)
}

/// Serialized form of the session record shared by the file and keychain
/// backends. Every slot is optional on read so partial records surface as
/// missing slots instead of parse errors.
#[derive(Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ephemeral_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    randomness: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_epoch"
    )]
    max_epoch: Option<u64>,
}

impl SessionRecord {
    pub(crate) fn from_secrets(secrets: &SessionSecrets) -> Self {
        Self {
            ephemeral_key: Some(secrets.ephemeral_key.expose_secret().to_string()),
            randomness: Some(secrets.randomness.expose_secret().to_string()),
            max_epoch: Some(secrets.max_epoch),
        }
    }

    pub(crate) fn into_slots(mut self) -> StoredSlots {
        StoredSlots {
            ephemeral_key: self
                .ephemeral_key
                .take()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            randomness: self
                .randomness
                .take()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            max_epoch: self.max_epoch.take(),
        }
    }
}

/// Older records stored the epoch as a string; accept both shapes here and
/// nowhere else.
fn deserialize_epoch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => zkm_core::parse_epoch(&v)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
