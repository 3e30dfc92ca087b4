//! Credential persistence and device identity.
//!
//! This module provides:
//! - `CredentialStore`: the key-value contract the session controller persists through
//! - `FileCredentialStore`: JSON document in the application data directory (default)
//! - `KeyringCredentialStore`: one OS keychain entry per credential key
//! - `MemoryCredentialStore`: in-process store for tests and embedders
//!
//! Each key is written independently; there are no multi-key transactions.

pub mod device;
pub mod file_store;
pub mod keyring_store;
pub mod store;

pub use device::{ensure_device_id, generate_device_id, DEVICE_ID_PREFIX};
pub use file_store::FileCredentialStore;
pub use keyring_store::KeyringCredentialStore;
pub use store::{CredentialKey, CredentialStore, MemoryCredentialStore, StorageError};
