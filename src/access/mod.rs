//! Access control for the scan action
//!
//! This module reconciles three independently-updated sources of truth:
//! - the remote subscription ledger (entitlement platform, TTL-cached)
//! - the locally persisted one-time trial window
//! - the remote-metered daily free quota (atomic check-and-increment)
//!
//! into one admission decision with strict premium → trial → quota
//! precedence.

mod quota;
mod reconciler;
mod subscription;
mod trial;
mod types;

pub use quota::{QuotaLedger, RestQuotaLedger};
pub use reconciler::AccessReconciler;
pub use subscription::{EntitlementGateway, RestEntitlementGateway, SubscriptionResolver};
pub use trial::{TrialError, TrialStore};
pub use types::{
    AccessState, CustomerInfo, Entitlement, EntitlementMap, LimitCheckResult, QuotaOutcome,
    QuotaRpcResponse, QuotaUsage, SubscriptionStatus, TrialState, UNLIMITED,
};

use std::sync::Arc;

use crate::config::AccessConfig;
use crate::identity::DeviceIdentityProvider;
use crate::review::{NoopReviewPrompt, ReviewPromptThrottle};
use crate::storage::{FileStore, KeyValueStore, MemoryStore, SecureStore};

/// Access subsystem wiring, constructed once at app start and held for the
/// app lifetime so the subscription cache and in-flight guard are scoped to
/// it rather than living as module globals.
pub struct AccessControl {
    pub reconciler: Arc<AccessReconciler>,
    pub subscriptions: Arc<SubscriptionResolver>,
    pub trial: Arc<TrialStore>,
    pub review: Arc<ReviewPromptThrottle>,
    pub identity: Arc<DeviceIdentityProvider>,
}

impl AccessControl {
    /// Wire the production stores and gateways from configuration.
    /// Never fails: a missing config directory degrades to in-memory
    /// persistence, which only weakens durability, not correctness.
    pub fn new(config: &AccessConfig) -> Self {
        let secure: Arc<dyn KeyValueStore> = Arc::new(SecureStore::new());
        let general: Arc<dyn KeyValueStore> = match FileStore::new() {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!("General store unavailable, falling back to memory: {}", e);
                Arc::new(MemoryStore::new())
            }
        };

        let identity = Arc::new(DeviceIdentityProvider::new(vec![
            secure.clone(),
            general.clone(),
        ]));
        let gateway = Arc::new(RestEntitlementGateway::new(
            &config.entitlement_url,
            &config.entitlement_api_key,
        ));
        let subscriptions = Arc::new(SubscriptionResolver::new(
            gateway,
            &config.premium_entitlement_id,
        ));
        let trial = Arc::new(TrialStore::new(general.clone(), config.trial_duration_days));
        let quota: Arc<dyn QuotaLedger> = Arc::new(RestQuotaLedger::new(
            &config.backend_url,
            &config.backend_api_key,
        ));
        let reconciler = Arc::new(AccessReconciler::new(
            identity.clone(),
            subscriptions.clone(),
            trial.clone(),
            quota,
            config.free_daily_scans,
        ));
        let review = Arc::new(ReviewPromptThrottle::new(
            general,
            Arc::new(NoopReviewPrompt),
        ));

        Self {
            reconciler,
            subscriptions,
            trial,
            review,
            identity,
        }
    }
}
