//! One-time trial window
//!
//! A single time-boxed unlimited-access grant per device, gated by the
//! one-way `has_used_trial` latch. Expiry is computed lazily from
//! `end_date` at read time; there is no background timer, and the stored
//! `is_active` flag is never trusted on its own.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

use super::types::TrialState;

const TRIAL_STATE_KEY: &str = "trial.state";

#[derive(Debug, Error)]
pub enum TrialError {
    /// The one-way `has_used_trial` latch is already set.
    #[error("free trial has already been used on this device")]
    AlreadyUsed,
    #[error("failed to persist trial state: {0}")]
    Storage(String),
}

pub struct TrialStore {
    store: Arc<dyn KeyValueStore>,
    duration_days: i64,
}

impl TrialStore {
    pub fn new(store: Arc<dyn KeyValueStore>, duration_days: i64) -> Self {
        Self {
            store,
            duration_days,
        }
    }

    /// Current trial state. Never fails: unreadable or corrupt state reads
    /// as the zero-value default and is left untouched on disk.
    pub fn trial_state(&self) -> TrialState {
        let raw = match self.store.get(TRIAL_STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return TrialState::default(),
            Err(e) => {
                debug!("Trial state read failed: {}", e);
                return TrialState::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!("Corrupt trial state, treating as unused: {}", e);
                TrialState::default()
            }
        }
    }

    /// Whether the trial window is currently open. Derived from `end_date`,
    /// so a stale stored `is_active` after expiry still reads as inactive.
    pub fn is_trial_active(&self) -> bool {
        let state = self.trial_state();
        match state.end_date {
            Some(end) => state.is_active && Utc::now() < end,
            None => false,
        }
    }

    /// Activate the one-time trial. Fails with `TrialError::AlreadyUsed`
    /// once the latch is set, even after the first window has expired.
    pub fn start_trial(&self) -> Result<TrialState, TrialError> {
        if self.trial_state().has_used_trial {
            return Err(TrialError::AlreadyUsed);
        }

        let now = Utc::now();
        let state = TrialState {
            is_active: true,
            start_date: Some(now),
            end_date: Some(now + Duration::days(self.duration_days)),
            has_used_trial: true,
        };
        let raw = serde_json::to_string(&state).map_err(|e| TrialError::Storage(e.to_string()))?;
        self.store
            .set(TRIAL_STATE_KEY, &raw)
            .map_err(TrialError::Storage)?;
        debug!(days = self.duration_days, "Trial activated");
        Ok(state)
    }
}
