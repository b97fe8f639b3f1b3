//! File-backed secret store.
//!
//! Layout under the configured directory:
//!   session.json: all three session slots in one document
//!   salt        : the per-user salt (decimal string)
//!
//! Writes go to a sibling temp file (mode 0600) and are renamed into place,
//! so a crash mid-write leaves either the old record or the new one.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::{SecretStore, SessionRecord, SessionSecrets, StoreError, StoredSlots};

const SESSION_FILE: &str = "session.json";
const SALT_FILE: &str = "salt";

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn salt_path(&self) -> PathBuf {
        self.dir.join(SALT_FILE)
    }

    /// Atomic write: write to temp file, then rename
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating secret store dir: {}", self.dir.display()))?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = open_private(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            file.write_all(contents)
                .with_context(|| format!("writing {}", tmp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("syncing {}", tmp_path.display()))?;
        }
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming into place: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

impl SecretStore for FileStore {
    fn save_session(&self, secrets: &SessionSecrets) -> Result<(), StoreError> {
        let record = SessionRecord::from_secrets(secrets);
        let mut json = serde_json::to_vec(&record).context("serializing session record")?;
        let result = self.write_atomic(&self.session_path(), &json);
        json.zeroize();
        result?;
        tracing::debug!(dir = %self.dir.display(), "session secrets written");
        Ok(())
    }

    fn load_session(&self) -> Result<StoredSlots, StoreError> {
        let path = self.session_path();
        let mut content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredSlots::default())
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("reading {}", path.display()))
                    .into())
            }
        };
        let parsed: Result<SessionRecord, _> = serde_json::from_slice(&content);
        content.zeroize();
        let record =
            parsed.map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        Ok(record.into_slots())
    }

    fn clear_session(&self) -> Result<(), StoreError> {
        remove_if_present(&self.session_path())?;
        remove_if_present(&self.session_path().with_extension("tmp"))?;
        Ok(())
    }

    fn load_salt(&self) -> Result<Option<SecretString>, StoreError> {
        let path = self.salt_path();
        match std::fs::read_to_string(&path) {
            Ok(mut content) => {
                let salt = content.trim().to_string();
                content.zeroize();
                Ok((!salt.is_empty()).then(|| SecretString::from(salt)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("reading {}", path.display()))
                .into()),
        }
    }

    fn save_salt(&self, salt: &SecretString) -> Result<(), StoreError> {
        self.write_atomic(&self.salt_path(), salt.expose_secret().as_bytes())?;
        Ok(())
    }

    fn clear_salt(&self) -> Result<(), StoreError> {
        remove_if_present(&self.salt_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Slot;

    fn sample(max_epoch: u64) -> SessionSecrets {
        SessionSecrets {
            ephemeral_key: SecretString::from("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8="),
            randomness: SecretString::from("340282366920938463463374607431768211455"),
            max_epoch,
        }
    }

    #[test]
    fn test_session_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("zkm"));

        store.save_session(&sample(101)).unwrap();
        let loaded = store.load_session().unwrap().complete().unwrap();
        assert_eq!(loaded.max_epoch, 101);
        assert_eq!(
            loaded.randomness.expose_secret(),
            "340282366920938463463374607431768211455"
        );

        // no temp file left behind
        assert!(!dir.path().join("zkm/session.tmp").exists());
    }

    #[test]
    fn test_overwrite_replaces_all_slots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save_session(&sample(1)).unwrap();
        store.save_session(&sample(2)).unwrap();
        assert_eq!(store.load_session().unwrap().complete().unwrap().max_epoch, 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load_session().unwrap().is_empty());
        assert!(store.load_salt().unwrap().is_none());
    }

    #[test]
    fn test_partial_file_reports_missing_slots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SESSION_FILE),
            r#"{"ephemeral_key":"AAEC","max_epoch":"77"}"#,
        )
        .unwrap();
        let store = FileStore::new(dir.path());
        let slots = store.load_session().unwrap();
        assert_eq!(slots.max_epoch, Some(77));
        assert_eq!(slots.missing(), vec![Slot::Randomness]);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.load_session(), Err(StoreError::Corrupt(_))));

        std::fs::write(
            dir.path().join(SESSION_FILE),
            r#"{"ephemeral_key":"AAEC","randomness":"1","max_epoch":"abc"}"#,
        )
        .unwrap();
        assert!(matches!(store.load_session(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_clear_session_keeps_salt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save_salt(&SecretString::from("4242")).unwrap();
        store.save_session(&sample(3)).unwrap();

        store.clear_session().unwrap();
        store.clear_session().unwrap();

        assert!(store.load_session().unwrap().is_empty());
        assert_eq!(store.load_salt().unwrap().unwrap().expose_secret(), "4242");
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save_session(&sample(3)).unwrap();
        store.save_salt(&SecretString::from("1")).unwrap();

        for name in [SESSION_FILE, SALT_FILE] {
            let mode = std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{name} must be 0600");
        }
    }
}
