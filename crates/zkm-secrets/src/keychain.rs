//! Platform keychain backend.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)
//!
//! The three session slots are stored as one JSON entry so they are written
//! and deleted together.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{SecretStore, SessionRecord, SessionSecrets, StoreError, StoredSlots};

/// Well-known keychain entry names
pub mod entries {
    /// Ephemeral session record (JSON: ephemeral_key, randomness, max_epoch)
    pub const SESSION: &str = "ephemeral-session";
    /// Per-user address salt
    pub const SALT: &str = "user-salt";
}

pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Check if the platform keychain is available.
    pub fn is_available(&self) -> bool {
        keyring::Entry::new(&self.service, "__zkm_probe__").is_ok()
    }

    fn entry(&self, name: &str) -> anyhow::Result<keyring::Entry> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))
    }

    fn get(&self, name: &str) -> anyhow::Result<Option<String>> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{name}': {e}")),
        }
    }

    fn set(&self, name: &str, value: &str) -> anyhow::Result<()> {
        self.entry(name)?
            .set_password(value)
            .map_err(|e| anyhow::anyhow!("keychain store for '{name}': {e}"))?;
        tracing::debug!(service = %self.service, key = name, "stored secret in platform keychain");
        Ok(())
    }

    fn delete(&self, name: &str) -> anyhow::Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(key = name, "deleted secret from platform keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()), // already deleted
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{name}': {e}")),
        }
    }
}

impl SecretStore for KeychainStore {
    fn save_session(&self, secrets: &SessionSecrets) -> Result<(), StoreError> {
        let record = SessionRecord::from_secrets(secrets);
        let mut json = serde_json::to_string(&record).context("serializing session record")?;
        let result = self.set(entries::SESSION, &json);
        json.zeroize();
        Ok(result?)
    }

    fn load_session(&self) -> Result<StoredSlots, StoreError> {
        let Some(mut json) = self.get(entries::SESSION)? else {
            return Ok(StoredSlots::default());
        };
        let parsed: Result<SessionRecord, _> = serde_json::from_str(&json);
        json.zeroize();
        let record =
            parsed.map_err(|e| StoreError::Corrupt(format!("keychain session record: {e}")))?;
        Ok(record.into_slots())
    }

    fn clear_session(&self) -> Result<(), StoreError> {
        Ok(self.delete(entries::SESSION)?)
    }

    fn load_salt(&self) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .get(entries::SALT)?
            .filter(|s| !s.is_empty())
            .map(SecretString::from))
    }

    fn save_salt(&self, salt: &SecretString) -> Result<(), StoreError> {
        Ok(self.set(entries::SALT, salt.expose_secret())?)
    }

    fn clear_salt(&self) -> Result<(), StoreError> {
        Ok(self.delete(entries::SALT)?)
    }
}
