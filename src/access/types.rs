//! Access-control data types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for "no numeric limit applies" in `LimitCheckResult::remaining`.
pub const UNLIMITED: i32 = -1;

/// Entitlement record from the payment platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub is_active: bool,
    pub product_identifier: String,
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    /// "normal", "trial", or "intro" on most stores
    #[serde(default)]
    pub period_type: Option<String>,
    #[serde(default)]
    pub will_renew: Option<bool>,
    #[serde(default)]
    pub store: Option<String>,
}

/// Entitlement sets as returned by the platform: everything ever granted,
/// plus the currently active subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementMap {
    #[serde(default)]
    pub active: HashMap<String, Entitlement>,
    #[serde(default)]
    pub all: HashMap<String, Entitlement>,
}

/// Customer record from the entitlement platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[serde(default)]
    pub entitlements: EntitlementMap,
}

/// Resolved premium status. Sourced from the entitlement platform, never
/// locally authoritative; cached with a short TTL by the resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub is_premium: bool,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_trial_period: Option<bool>,
    #[serde(default)]
    pub auto_renew_status: Option<bool>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl SubscriptionStatus {
    /// Conservative default used whenever the platform cannot be reached.
    pub fn non_premium() -> Self {
        Self::default()
    }
}

/// One-time trial grant. `is_active` is advisory: activity is always
/// recomputed from `end_date` at read time, and `has_used_trial` is a
/// one-way latch that normal operation never clears.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialState {
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub has_used_trial: bool,
}

/// Access tier derived from subscription, trial, and quota state.
/// Never persisted; recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccessState {
    Premium,
    Trial {
        trial_end_date: Option<DateTime<Utc>>,
    },
    Free {
        scans_remaining: u32,
    },
}

impl AccessState {
    pub fn unlimited(&self) -> bool {
        matches!(self, Self::Premium | Self::Trial { .. })
    }
}

/// Outward-facing admission decision for a single scan attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheckResult {
    pub allowed: bool,
    /// Scans left today, or `UNLIMITED` (-1) for premium/trial access.
    pub remaining: i32,
    pub is_premium: bool,
    pub is_trial_active: bool,
    pub scans_used: u32,
    pub scans_allowed: u32,
    /// Next local midnight, when the free quota resets.
    #[serde(default)]
    pub reset_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_end_date: Option<DateTime<Utc>>,
}

impl LimitCheckResult {
    pub fn premium() -> Self {
        Self {
            allowed: true,
            remaining: UNLIMITED,
            is_premium: true,
            is_trial_active: false,
            scans_used: 0,
            scans_allowed: 0,
            reset_time: None,
            trial_end_date: None,
        }
    }

    pub fn trial(trial_end_date: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: true,
            remaining: UNLIMITED,
            is_premium: false,
            is_trial_active: true,
            scans_used: 0,
            scans_allowed: 0,
            reset_time: None,
            trial_end_date,
        }
    }
}

/// Result of the atomic remote check-and-increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaOutcome {
    pub can_scan: bool,
    pub scans_used: u32,
}

/// Read-only usage snapshot for a device + calendar day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuotaUsage {
    pub scans_used: u32,
    #[serde(default)]
    pub scans_allowed: u32,
}

/// Quota RPC wire response. The backend historically returned either a bare
/// admission flag or a structured record; both shapes are decoded at this
/// boundary and nowhere else.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuotaRpcResponse {
    Record { can_scan: bool, scans_used: u32 },
    Flag(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_state_unlimited() {
        assert!(AccessState::Premium.unlimited());
        assert!(AccessState::Trial {
            trial_end_date: None
        }
        .unlimited());
        assert!(!AccessState::Free { scans_remaining: 3 }.unlimited());
    }

    #[test]
    fn test_quota_response_decodes_boolean_shape() {
        let decoded: QuotaRpcResponse = serde_json::from_str("true").unwrap();
        assert!(matches!(decoded, QuotaRpcResponse::Flag(true)));
    }

    #[test]
    fn test_quota_response_decodes_record_shape() {
        let decoded: QuotaRpcResponse =
            serde_json::from_str(r#"{"can_scan": false, "scans_used": 3}"#).unwrap();
        match decoded {
            QuotaRpcResponse::Record {
                can_scan,
                scans_used,
            } => {
                assert!(!can_scan);
                assert_eq!(scans_used, 3);
            }
            QuotaRpcResponse::Flag(_) => panic!("expected record shape"),
        }
    }

    #[test]
    fn test_quota_response_rejects_unknown_shape() {
        assert!(serde_json::from_str::<QuotaRpcResponse>(r#""yes""#).is_err());
    }

    #[test]
    fn test_trial_state_default_is_unused() {
        let state = TrialState::default();
        assert!(!state.is_active);
        assert!(!state.has_used_trial);
        assert!(state.end_date.is_none());
    }

    #[test]
    fn test_limit_check_result_serializes_camel_case() {
        let json = serde_json::to_string(&LimitCheckResult::premium()).unwrap();
        assert!(json.contains("isPremium"));
        assert!(json.contains("scansAllowed"));
    }
}
