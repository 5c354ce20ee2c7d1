//! Local key-value persistence layers
//!
//! Two production stores back the access subsystem:
//! - `SecureStore`: hardware-backed keychain/credential-manager entries
//! - `FileStore`: JSON files under the app config directory
//!
//! `MemoryStore` backs tests and the last-resort degraded mode. Callers own
//! the degradation policy: a store reports read failures, it does not repair
//! or rewrite corrupt values.

mod file;
mod secure;

pub use file::FileStore;
pub use secure::SecureStore;

use dashmap::DashMap;

/// Minimal get/set/remove contract shared by every persistence layer.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// In-memory store. Used by tests and as the process-scoped fallback when
/// no persistent layer is writable.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.entries.remove(key);
        Ok(())
    }
}
