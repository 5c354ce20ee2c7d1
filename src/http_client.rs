//! Shared HTTP Client Module
//!
//! Provides lazy-initialized HTTP clients with connection pooling, one per
//! remote dependency. Creating a client per request would pay the builder
//! and TLS-handshake cost on every gating decision.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// HTTP client for the app backend (quota ledger RPCs)
///
/// The quota RPC sits on the scan hot path; the 30s client timeout is the
/// outer bound, the reconciler races calls against its own shorter budget.
pub static BACKEND_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create backend HTTP client")
});

/// HTTP client for the entitlement platform
pub static ENTITLEMENT_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create entitlement HTTP client")
});

/// Get the shared backend HTTP client
#[inline]
pub fn backend_client() -> &'static Client {
    &BACKEND_CLIENT
}

/// Get the shared entitlement HTTP client
#[inline]
pub fn entitlement_client() -> &'static Client {
    &ENTITLEMENT_CLIENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_are_created() {
        let _ = backend_client();
        let _ = entitlement_client();
    }

    #[test]
    fn test_clients_are_same_instance() {
        let client1 = backend_client();
        let client2 = backend_client();
        assert!(std::ptr::eq(client1, client2));
    }
}
