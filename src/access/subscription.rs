//! Subscription status resolution with TTL caching
//!
//! Queries the entitlement platform for the premium entitlement and caches
//! the result briefly to keep repeated UI reads off the network. Resolver
//! errors degrade to non-premium; they never block the app.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::http_client;

use super::types::{CustomerInfo, SubscriptionStatus};

/// Cache TTL in milliseconds (5 minutes)
const CACHE_TTL_MS: i64 = 5 * 60 * 1000;

/// Helper to acquire read lock with poison recovery
fn acquire_read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read()
        .unwrap_or_else(|poisoned: PoisonError<RwLockReadGuard<'_, T>>| {
            warn!("RwLock was poisoned on read, recovering inner value");
            poisoned.into_inner()
        })
}

/// Helper to acquire write lock with poison recovery
fn acquire_write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write()
        .unwrap_or_else(|poisoned: PoisonError<RwLockWriteGuard<'_, T>>| {
            warn!("RwLock was poisoned on write, recovering inner value");
            poisoned.into_inner()
        })
}

/// Remote entitlement platform boundary.
#[async_trait]
pub trait EntitlementGateway: Send + Sync {
    async fn get_customer_info(&self, app_user_id: &str) -> Result<CustomerInfo, String>;
}

/// REST implementation of the entitlement platform contract.
pub struct RestEntitlementGateway {
    base_url: String,
    api_key: String,
}

impl RestEntitlementGateway {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl EntitlementGateway for RestEntitlementGateway {
    async fn get_customer_info(&self, app_user_id: &str) -> Result<CustomerInfo, String> {
        let url = format!("{}/v1/customers/{}", self.base_url, app_user_id);
        let response = http_client::entitlement_client()
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("Entitlement request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!(
                "Entitlement request returned {}",
                response.status()
            ));
        }

        response
            .json::<CustomerInfo>()
            .await
            .map_err(|e| format!("Entitlement response parse failed: {}", e))
    }
}

struct CachedStatus {
    status: SubscriptionStatus,
    cached_at: i64,
}

/// Subscription resolver with a TTL cache
pub struct SubscriptionResolver {
    gateway: Arc<dyn EntitlementGateway>,
    entitlement_id: String,
    cache: RwLock<Option<CachedStatus>>,
}

impl SubscriptionResolver {
    pub fn new(gateway: Arc<dyn EntitlementGateway>, entitlement_id: &str) -> Self {
        Self {
            gateway,
            entitlement_id: entitlement_id.to_string(),
            cache: RwLock::new(None),
        }
    }

    /// Live premium check. Any gateway failure resolves to the non-premium
    /// default; the result rewrites the cache either way.
    pub async fn check_premium_status(&self, app_user_id: &str) -> SubscriptionStatus {
        let status = match self.gateway.get_customer_info(app_user_id).await {
            Ok(info) => self.status_from(&info),
            Err(e) => {
                warn!("Premium check failed, treating as non-premium: {}", e);
                SubscriptionStatus::non_premium()
            }
        };

        let mut cache = acquire_write_lock(&self.cache);
        *cache = Some(CachedStatus {
            status: status.clone(),
            cached_at: Utc::now().timestamp_millis(),
        });
        status
    }

    /// Cached status, or None when absent or older than the TTL. A stale
    /// entry is treated as absent, never served.
    pub fn cached_status(&self) -> Option<SubscriptionStatus> {
        let cache = acquire_read_lock(&self.cache);
        cache.as_ref().and_then(|entry| {
            let age = Utc::now().timestamp_millis() - entry.cached_at;
            (age < CACHE_TTL_MS).then(|| entry.status.clone())
        })
    }

    /// Force a live query and rewrite the cache.
    pub async fn refresh(&self, app_user_id: &str) -> SubscriptionStatus {
        self.check_premium_status(app_user_id).await
    }

    /// Drop the cached status (logout, restore purchases).
    pub fn invalidate(&self) {
        let mut cache = acquire_write_lock(&self.cache);
        *cache = None;
        debug!("Subscription cache invalidated");
    }

    /// Premium requires the named entitlement in the full set, in the
    /// active set, and flagged active. Presence without activity (an
    /// expired grant) confers nothing.
    fn status_from(&self, info: &CustomerInfo) -> SubscriptionStatus {
        let in_all = info.entitlements.all.contains_key(&self.entitlement_id);
        match info.entitlements.active.get(&self.entitlement_id) {
            Some(entitlement) if in_all && entitlement.is_active => SubscriptionStatus {
                is_premium: true,
                product_id: Some(entitlement.product_identifier.clone()),
                purchase_date: entitlement.purchase_date,
                expiration_date: entitlement.expiration_date,
                is_trial_period: entitlement.period_type.as_deref().map(|p| p == "trial"),
                auto_renew_status: entitlement.will_renew,
                platform: entitlement.store.clone(),
            },
            _ => SubscriptionStatus::non_premium(),
        }
    }

    /// Backdate the cache entry (for TTL tests).
    #[cfg(test)]
    fn age_cache(&self, ms: i64) {
        let mut cache = acquire_write_lock(&self.cache);
        if let Some(entry) = cache.as_mut() {
            entry.cached_at -= ms;
        }
    }
}
