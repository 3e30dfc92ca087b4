use rand::Rng;
use tracing::info;

use super::store::{CredentialKey, CredentialStore, StorageError};

pub const DEVICE_ID_PREFIX: &str = "dev_";

/// Number of random characters after the prefix
const DEVICE_ID_RANDOM_LEN: usize = 9;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a fresh pseudo-random device id such as `dev_k3j9x0a2q`.
pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..DEVICE_ID_RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", DEVICE_ID_PREFIX, suffix)
}

/// Return the persisted device id, generating and persisting one if absent.
///
/// The id is stable for the lifetime of the install and only changes when the
/// store is cleared.
pub fn ensure_device_id(store: &dyn CredentialStore) -> Result<String, StorageError> {
    if let Some(existing) = store.get_non_empty(CredentialKey::DeviceId)? {
        return Ok(existing);
    }
    let device_id = generate_device_id();
    store.set(CredentialKey::DeviceId, &device_id)?;
    info!(device_id = %device_id, "Generated new device id");
    Ok(device_id)
}
