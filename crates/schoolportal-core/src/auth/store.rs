use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Keys persisted in the credential store.
///
/// The string forms are the on-disk names and must stay stable across releases,
/// otherwise existing installs lose their session on upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKey {
    AuthToken,
    RefreshToken,
    PhoneNumber,
    UserRole,
    DeviceId,
    HasCompletedOnboarding,
    UserData,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 7] = [
        CredentialKey::AuthToken,
        CredentialKey::RefreshToken,
        CredentialKey::PhoneNumber,
        CredentialKey::UserRole,
        CredentialKey::DeviceId,
        CredentialKey::HasCompletedOnboarding,
        CredentialKey::UserData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::AuthToken => "authToken",
            CredentialKey::RefreshToken => "refreshToken",
            CredentialKey::PhoneNumber => "phoneNumber",
            CredentialKey::UserRole => "userRole",
            CredentialKey::DeviceId => "deviceId",
            CredentialKey::HasCompletedOnboarding => "hasCompletedOnboarding",
            CredentialKey::UserData => "userData",
        }
    }

    /// Keys holding bearer material. Cleared together when a refresh fails.
    pub fn is_token(&self) -> bool {
        matches!(self, CredentialKey::AuthToken | CredentialKey::RefreshToken)
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key-value persistence that survives process restarts.
///
/// `get` on a missing key is `Ok(None)`, never an error. `remove` on a missing
/// key succeeds. Write failures must be returned, not swallowed.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StorageError>;

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: CredentialKey) -> Result<(), StorageError>;

    /// Convenience for keys that are only meaningful when non-empty.
    fn get_non_empty(&self, key: CredentialKey) -> Result<Option<String>, StorageError> {
        Ok(self.get(key)?.filter(|v| !v.is_empty()))
    }
}

/// In-process credential store.
///
/// Can be switched into a failing mode to simulate a full or locked device
/// store; reads and writes fail independently.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<CredentialKey, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_keys: Mutex<HashSet<CredentialKey>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate entries, e.g. to simulate a previous run.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (CredentialKey, &'a str)>) -> Self {
        let store = Self::default();
        {
            let mut map = store.lock();
            for (key, value) in entries {
                map.insert(key, value.to_string());
            }
        }
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes and removals of `key` only, leaving other keys writable.
    pub fn fail_writes_for(&self, key: CredentialKey) {
        self.failing_keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialKey, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, key: CredentialKey) -> Result<(), StorageError> {
        let key_fails = self
            .failing_keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&key);
        if key_fails || self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage is full".to_string()));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage is locked".to_string()));
        }
        Ok(self.lock().get(&key).cloned())
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StorageError> {
        self.check_writable(key)?;
        self.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: CredentialKey) -> Result<(), StorageError> {
        self.check_writable(key)?;
        self.lock().remove(&key);
        Ok(())
    }
}
