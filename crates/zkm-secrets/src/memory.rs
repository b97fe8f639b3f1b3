//! Process-local secret store.

use secrecy::{ExposeSecret, SecretString};
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroize;

use crate::{SecretStore, SessionRecord, SessionSecrets, StoreError, StoredSlots};

#[derive(Default)]
struct Inner {
    session: Option<SessionRecord>,
    salt: Option<String>,
}

/// Secret store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary (possibly partial) set of slots, e.g. to model
    /// a record left behind by an interrupted writer.
    pub fn with_slots(
        ephemeral_key: Option<&str>,
        randomness: Option<&str>,
        max_epoch: Option<u64>,
    ) -> Self {
        let record = SessionRecord {
            ephemeral_key: ephemeral_key.map(str::to_string),
            randomness: randomness.map(str::to_string),
            max_epoch,
        };
        Self {
            inner: Mutex::new(Inner {
                session: Some(record),
                salt: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned").into())
    }
}

impl SecretStore for MemoryStore {
    fn save_session(&self, secrets: &SessionSecrets) -> Result<(), StoreError> {
        self.lock()?.session = Some(SessionRecord::from_secrets(secrets));
        Ok(())
    }

    fn load_session(&self) -> Result<StoredSlots, StoreError> {
        let guard = self.lock()?;
        Ok(match &guard.session {
            Some(record) => SessionRecord {
                ephemeral_key: record.ephemeral_key.clone(),
                randomness: record.randomness.clone(),
                max_epoch: record.max_epoch,
            }
            .into_slots(),
            None => StoredSlots::default(),
        })
    }

    fn clear_session(&self) -> Result<(), StoreError> {
        // dropping the record zeroizes it
        self.lock()?.session = None;
        Ok(())
    }

    fn load_salt(&self) -> Result<Option<SecretString>, StoreError> {
        Ok(self.lock()?.salt.clone().map(SecretString::from))
    }

    fn save_salt(&self, salt: &SecretString) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if let Some(old) = guard.salt.as_mut() {
            old.zeroize();
        }
        guard.salt = Some(salt.expose_secret().to_string());
        Ok(())
    }

    fn clear_salt(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if let Some(old) = guard.salt.as_mut() {
            old.zeroize();
        }
        guard.salt = None;
        Ok(())
    }
}
