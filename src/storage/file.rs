//! JSON-file persistence under the app config directory.

use std::fs;
use std::path::PathBuf;

use super::KeyValueStore;

/// General persistence fallback. One file per key under the base directory,
/// e.g. `~/.config/waymark/trial.state.json`.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Store rooted at the platform config directory.
    pub fn new() -> Result<Self, String> {
        let base_dir = dirs::config_dir()
            .map(|d| d.join("waymark"))
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        Ok(Self::with_dir(base_dir))
    }

    /// Store rooted at an explicit directory (tests point this at a tempdir).
    pub fn with_dir(base_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&base_dir) {
            tracing::warn!("Failed to create storage directory: {}", e);
        }
        Self { base_dir }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{}.json", sanitized))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let path = self.file_path(key);
        fs::write(&path, value).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).map_err(|e| format!("Failed to delete {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(dir.path().to_path_buf());

        assert_eq!(store.get("trial.state").unwrap(), None);

        store.set("trial.state", r#"{"isActive":true}"#).unwrap();
        assert_eq!(
            store.get("trial.state").unwrap().as_deref(),
            Some(r#"{"isActive":true}"#)
        );

        store.remove("trial.state").unwrap();
        assert_eq!(store.get("trial.state").unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(dir.path().to_path_buf());

        store.set("../escape/attempt", "value").unwrap();
        assert_eq!(
            store.get("../escape/attempt").unwrap().as_deref(),
            Some("value")
        );

        // Nothing may land outside the base directory.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(dir.path().to_path_buf());
        assert!(store.remove("never.written").is_ok());
    }
}
