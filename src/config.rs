//! Environment-driven configuration for the access subsystem.
//!
//! Values come from `WAYMARK_*` variables (dotenvy loads `.env` during
//! `init_logging`) with code defaults for everything non-secret.

use std::env;

/// Free-tier daily scan cap.
pub const DEFAULT_FREE_DAILY_SCANS: u32 = 3;

/// Trial window length in days.
pub const DEFAULT_TRIAL_DAYS: i64 = 3;

#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Base URL of the app backend exposing the quota RPCs
    pub backend_url: String,
    pub backend_api_key: String,
    /// Base URL of the entitlement platform REST API
    pub entitlement_url: String,
    pub entitlement_api_key: String,
    /// Named entitlement that grants unlimited scanning
    pub premium_entitlement_id: String,
    pub free_daily_scans: u32,
    pub trial_duration_days: i64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AccessConfig {
    pub fn from_env() -> Self {
        Self {
            backend_url: env_or("WAYMARK_BACKEND_URL", "https://api.waymark.app"),
            backend_api_key: env::var("WAYMARK_BACKEND_API_KEY").unwrap_or_default(),
            entitlement_url: env_or(
                "WAYMARK_ENTITLEMENT_URL",
                "https://entitlements.waymark.app",
            ),
            entitlement_api_key: env::var("WAYMARK_ENTITLEMENT_API_KEY").unwrap_or_default(),
            premium_entitlement_id: env_or("WAYMARK_PREMIUM_ENTITLEMENT", "premium"),
            free_daily_scans: env::var("WAYMARK_FREE_DAILY_SCANS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FREE_DAILY_SCANS),
            trial_duration_days: env::var("WAYMARK_TRIAL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TRIAL_DAYS),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = AccessConfig::from_env();
        assert_eq!(config.free_daily_scans, DEFAULT_FREE_DAILY_SCANS);
        assert_eq!(config.trial_duration_days, DEFAULT_TRIAL_DAYS);
        assert_eq!(config.premium_entitlement_id, "premium");
        assert!(!config.backend_url.is_empty());
    }
}
