use keyring::Entry;
use tracing::debug;

use super::store::{CredentialKey, CredentialStore, StorageError};

/// Default keychain service name
pub const DEFAULT_SERVICE_NAME: &str = "schoolportal";

/// Credential store backed by the OS keychain.
///
/// Each credential key maps to its own keychain entry under a shared service
/// name, so a single entry can be inspected or revoked from the OS tools.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: CredentialKey) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key.as_str())?)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        debug!(key = %key, "Stored credential in keychain");
        Ok(())
    }

    fn remove(&self, key: CredentialKey) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
