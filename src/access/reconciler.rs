//! Access state reconciliation
//!
//! Composes the subscription resolver, trial store, and remote quota ledger
//! into a single admission decision, with strict premium → trial → quota
//! precedence. The quota ledger is never consulted while premium or an
//! active trial holds, so trial users cannot burn free-tier quota.
//!
//! Every public entry point absorbs internal failures and returns a
//! well-formed value; the UI always receives a decision it can act on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;

use crate::identity::DeviceIdentityProvider;

use super::quota::QuotaLedger;
use super::subscription::SubscriptionResolver;
use super::trial::TrialStore;
use super::types::{AccessState, LimitCheckResult, QuotaUsage, SubscriptionStatus};

/// Budget for each remote call in the gating path. A hung backend must not
/// hang the scan decision.
const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AccessReconciler {
    identity: Arc<DeviceIdentityProvider>,
    subscriptions: Arc<SubscriptionResolver>,
    trial: Arc<TrialStore>,
    quota: Arc<dyn QuotaLedger>,
    free_daily_scans: u32,
    remote_timeout: Duration,
    /// Devices with a perform-scan in flight; duplicates are denied rather
    /// than racing a second increment.
    in_flight: DashMap<String, ()>,
}

impl AccessReconciler {
    pub fn new(
        identity: Arc<DeviceIdentityProvider>,
        subscriptions: Arc<SubscriptionResolver>,
        trial: Arc<TrialStore>,
        quota: Arc<dyn QuotaLedger>,
        free_daily_scans: u32,
    ) -> Self {
        Self {
            identity,
            subscriptions,
            trial,
            quota,
            free_daily_scans,
            remote_timeout: REMOTE_CALL_TIMEOUT,
            in_flight: DashMap::new(),
        }
    }

    #[cfg(test)]
    fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Current tier, freshly composed from all three sources. Read-only.
    pub async fn user_access_state(&self) -> AccessState {
        let device_id = self.identity.device_id();

        if self.resolve_subscription(&device_id).await.is_premium {
            return AccessState::Premium;
        }

        if self.trial.is_trial_active() {
            return AccessState::Trial {
                trial_end_date: self.trial.trial_state().end_date,
            };
        }

        let usage = self.peek_quota(&device_id).await;
        let scans_allowed = self.effective_allowance(usage.scans_allowed);
        AccessState::Free {
            scans_remaining: self.clamp_remaining(usage.scans_used, scans_allowed),
        }
    }

    /// Admission decision for one scan attempt.
    ///
    /// With `perform_scan` set, the remote ledger is incremented at most
    /// once and there is no internal retry. Without it, the call is
    /// side-effect free and safe to repeat for display.
    pub async fn check_scan_limit(&self, perform_scan: bool) -> LimitCheckResult {
        let device_id = self.identity.device_id();

        // Tier 1: premium entitlement. Live query; correctness over latency
        // for the gating decision.
        if self.resolve_subscription(&device_id).await.is_premium {
            return LimitCheckResult::premium();
        }

        // Tier 2: trial window. Deliberately bypasses the quota ledger so a
        // paid-equivalent trial never burns free-tier quota.
        if self.trial.is_trial_active() {
            return LimitCheckResult::trial(self.trial.trial_state().end_date);
        }

        // Tier 3: remote free quota.
        if perform_scan {
            self.perform_metered_scan(&device_id).await
        } else {
            self.read_quota_stats(&device_id).await
        }
    }

    /// Side-effect-free usage snapshot for display. Callable arbitrarily
    /// often; never touches the increment RPC.
    pub async fn current_usage_stats(&self) -> LimitCheckResult {
        self.check_scan_limit(false).await
    }

    /// Admit and count one scan.
    pub async fn perform_scan(&self) -> LimitCheckResult {
        self.check_scan_limit(true).await
    }

    async fn perform_metered_scan(&self, device_id: &str) -> LimitCheckResult {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, device_id) else {
            warn!(device = %device_id, "Concurrent scan attempt rejected");
            return LimitCheckResult {
                allowed: false,
                remaining: 0,
                is_premium: false,
                is_trial_active: false,
                scans_used: 0,
                scans_allowed: self.free_daily_scans,
                reset_time: Some(next_local_midnight()),
                trial_end_date: None,
            };
        };

        let date = today_local();
        let outcome = match tokio::time::timeout(
            self.remote_timeout,
            self.quota
                .check_and_increment(device_id, &date, self.free_daily_scans),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Quota increment timed out, denying scan");
                return LimitCheckResult {
                    allowed: false,
                    remaining: 0,
                    is_premium: false,
                    is_trial_active: false,
                    scans_used: 0,
                    scans_allowed: self.free_daily_scans,
                    reset_time: Some(next_local_midnight()),
                    trial_end_date: None,
                };
            }
        };

        let scans_allowed = self.free_daily_scans;
        let remaining = self.clamp_remaining(outcome.scans_used, scans_allowed);
        LimitCheckResult {
            allowed: outcome.can_scan,
            remaining: remaining as i32,
            is_premium: false,
            is_trial_active: false,
            scans_used: outcome.scans_used,
            scans_allowed,
            reset_time: Some(next_local_midnight()),
            trial_end_date: None,
        }
    }

    async fn read_quota_stats(&self, device_id: &str) -> LimitCheckResult {
        let usage = self.peek_quota(device_id).await;
        let scans_allowed = self.effective_allowance(usage.scans_allowed);
        let remaining = self.clamp_remaining(usage.scans_used, scans_allowed);
        LimitCheckResult {
            allowed: remaining > 0,
            remaining: remaining as i32,
            is_premium: false,
            is_trial_active: false,
            scans_used: usage.scans_used,
            scans_allowed,
            reset_time: Some(next_local_midnight()),
            trial_end_date: None,
        }
    }

    async fn resolve_subscription(&self, device_id: &str) -> SubscriptionStatus {
        match tokio::time::timeout(
            self.remote_timeout,
            self.subscriptions.check_premium_status(device_id),
        )
        .await
        {
            Ok(status) => status,
            Err(_) => {
                warn!("Subscription check timed out, treating as non-premium");
                SubscriptionStatus::non_premium()
            }
        }
    }

    async fn peek_quota(&self, device_id: &str) -> QuotaUsage {
        match tokio::time::timeout(
            self.remote_timeout,
            self.quota.peek(device_id, &today_local()),
        )
        .await
        {
            Ok(usage) => usage,
            Err(_) => {
                warn!("Quota read timed out");
                QuotaUsage::default()
            }
        }
    }

    /// Backend rows omit the allowance until the day's first write; fall
    /// back to the configured cap for display.
    fn effective_allowance(&self, reported: u32) -> u32 {
        if reported == 0 {
            self.free_daily_scans
        } else {
            reported
        }
    }

    /// Clamp to zero, surfacing negative raw values first: used exceeding
    /// allowed means the ledger and this client disagree, which telemetry
    /// should see.
    fn clamp_remaining(&self, used: u32, allowed: u32) -> u32 {
        let raw = allowed as i64 - used as i64;
        if raw < 0 {
            warn!(used, allowed, raw, "Scan usage exceeds allowance; clamping remaining to 0");
        }
        raw.max(0) as u32
    }
}

/// Today's date string in the user's local timezone; the free quota is
/// keyed by local calendar day and resets at local midnight.
fn today_local() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn next_local_midnight() -> DateTime<Utc> {
    let tomorrow = Local::now().date_naive() + chrono::Days::new(1);
    tomorrow
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::days(1))
}

struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    key: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(map: &'a DashMap<String, ()>, key: &str) -> Option<Self> {
        match map.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(Self {
                    map,
                    key: key.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
