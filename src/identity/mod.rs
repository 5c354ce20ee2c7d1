//! Stable per-install device identity.
//!
//! Resolution cascade, first success wins:
//! 1. previously persisted id (secure store, then general store)
//! 2. platform hardware id, prefixed with an OS tag
//! 3. random fallback id
//!
//! The resolved id is written back through the first store that accepts it
//! and memoized for the process lifetime. `device_id()` never fails; the
//! worst case is a process-scoped id, which only means the free quota keys
//! off a fresh device row after a restart.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::KeyValueStore;

const DEVICE_ID_KEY: &str = "device.id";

const MAX_DEVICE_ID_LEN: usize = 128;

/// Platform-specific identifier source tried during generation.
pub trait HardwareIdSource: Send + Sync {
    /// Tag prefixed to the raw id to avoid cross-platform collisions.
    fn platform_tag(&self) -> &'static str;
    /// Raw identifier, or None when the platform cannot provide one.
    fn read(&self) -> Option<String>;
}

/// OS machine id: `/etc/machine-id` on Linux, `IOPlatformUUID` on macOS.
pub struct MachineIdSource;

impl HardwareIdSource for MachineIdSource {
    fn platform_tag(&self) -> &'static str {
        std::env::consts::OS
    }

    #[cfg(target_os = "linux")]
    fn read(&self) -> Option<String> {
        std::fs::read_to_string("/etc/machine-id")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    fn read(&self) -> Option<String> {
        let output = duct::cmd!("ioreg", "-rd1", "-c", "IOPlatformExpertDevice")
            .read()
            .ok()?;
        output
            .lines()
            .find(|line| line.contains("IOPlatformUUID"))
            .and_then(|line| line.split('"').nth(3))
            .map(|s| s.to_string())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn read(&self) -> Option<String> {
        None
    }
}

/// Guard applied wherever a device id crosses into a lookup or RPC.
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_DEVICE_ID_LEN && !id.chars().any(char::is_whitespace)
}

pub struct DeviceIdentityProvider {
    stores: Vec<Arc<dyn KeyValueStore>>,
    sources: Vec<Box<dyn HardwareIdSource>>,
    cached: RwLock<Option<String>>,
}

impl DeviceIdentityProvider {
    /// Provider with the default hardware source chain. `stores` are tried
    /// in order for both reads and the write-back.
    pub fn new(stores: Vec<Arc<dyn KeyValueStore>>) -> Self {
        Self::with_sources(stores, vec![Box::new(MachineIdSource)])
    }

    pub fn with_sources(
        stores: Vec<Arc<dyn KeyValueStore>>,
        sources: Vec<Box<dyn HardwareIdSource>>,
    ) -> Self {
        Self {
            stores,
            sources,
            cached: RwLock::new(None),
        }
    }

    /// Stable identifier for this install. Idempotent across calls and
    /// restarts as long as any persistence layer is available.
    pub fn device_id(&self) -> String {
        {
            let cached = self
                .cached
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = cached.as_ref() {
                return id.clone();
            }
        }

        let id = self.resolve();
        let mut cached = self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // A concurrent caller may have resolved first; keep whichever id
        // landed so every caller in this process sees the same value.
        cached.get_or_insert(id).clone()
    }

    fn resolve(&self) -> String {
        for store in &self.stores {
            match store.get(DEVICE_ID_KEY) {
                Ok(Some(id)) if is_valid_device_id(&id) => return id,
                Ok(Some(id)) => {
                    warn!(stored = %id, "Ignoring malformed stored device id");
                }
                Ok(None) => {}
                Err(e) => debug!("Device id read failed: {}", e),
            }
        }

        let id = self.generate();
        self.persist(&id);
        id
    }

    fn generate(&self) -> String {
        for source in &self.sources {
            if let Some(raw) = source.read() {
                let id = format!("{}:{}", source.platform_tag(), raw);
                if is_valid_device_id(&id) {
                    return id;
                }
                warn!(source = source.platform_tag(), "Hardware id failed validation");
            }
        }
        format!(
            "gen:{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        )
    }

    fn persist(&self, id: &str) {
        for store in &self.stores {
            match store.set(DEVICE_ID_KEY, id) {
                Ok(()) => return,
                Err(e) => debug!("Device id write failed: {}", e),
            }
        }
        warn!("No persistence layer accepted the device id; using a process-scoped id");
    }
}
