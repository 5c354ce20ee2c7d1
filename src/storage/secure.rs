//! Keychain-backed secure storage.

use keyring::Entry;

use super::KeyValueStore;

const SERVICE_NAME: &str = "com.waymark.scanner";

/// Keychain/credential-manager backed store. One keyring entry per key,
/// all under the app's service name.
pub struct SecureStore {
    service: String,
}

impl SecureStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(&self.service, key).map_err(|e| format!("Keychain unavailable: {}", e))
    }
}

impl Default for SecureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for SecureStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Keychain read failed for {}: {}", key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| format!("Keychain write failed for {}: {}", key, e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Keychain delete failed for {}: {}", key, e)),
        }
    }
}
