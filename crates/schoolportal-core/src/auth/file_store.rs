use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{CredentialKey, CredentialStore, StorageError};

/// Credential file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Credential store backed by a single JSON document.
///
/// The document is re-read on every access so that a second process (or a
/// user deleting the file) is observed immediately. Writes go to a temporary
/// file first and are renamed into place.
pub struct FileCredentialStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    fn read_file(&self) -> Result<CredentialFile, StorageError> {
        let path = self.path();
        if !path.exists() {
            return Ok(CredentialFile::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_file(&self, file: &mut CredentialFile) -> Result<(), StorageError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        file.updated_at = Some(Utc::now());
        let contents = serde_json::to_string_pretty(file)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn modify<F>(&self, key: CredentialKey, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.read_file()?;
        if f(&mut file.entries) {
            self.write_file(&mut file)?;
            debug!(key = %key, "Credential file updated");
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StorageError> {
        Ok(self.read_file()?.entries.remove(key.as_str()))
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StorageError> {
        self.modify(key, |entries| {
            entries.insert(key.as_str().to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: CredentialKey) -> Result<(), StorageError> {
        self.modify(key, |entries| entries.remove(key.as_str()).is_some())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}
