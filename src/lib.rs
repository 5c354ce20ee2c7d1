//! Client-side access control for the Waymark scanner app
//!
//! The app gates one monetized action (a landmark scan) behind three
//! independently-updated sources of truth: a remote subscription ledger, a
//! locally persisted one-time trial window, and a remote-metered daily free
//! quota. This crate reconciles them into a single admission decision, and
//! also throttles native "rate this app" prompts.
//!
//! The UI layer owns rendering and alerts; everything here returns
//! well-formed decision values instead of surfacing faults.

pub mod access;
pub mod config;
pub mod http_client;
pub mod identity;
pub mod review;
pub mod storage;

pub use access::{
    AccessControl, AccessReconciler, AccessState, LimitCheckResult, SubscriptionStatus,
    TrialError, TrialState, UNLIMITED,
};
pub use config::AccessConfig;
pub use identity::DeviceIdentityProvider;
pub use review::ReviewPromptThrottle;

use tracing_subscriber::EnvFilter;

/// Load `.env` and initialize tracing with the `RUST_LOG` env filter.
/// Default: warn for most crates, info for this one. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logging() {
    // During development the CWD may be the workspace root or a member;
    // check the current dir first, then the parent.
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path("../.env");
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,waymark_access=info")),
        )
        .try_init();
}
