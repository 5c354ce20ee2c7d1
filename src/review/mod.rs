//! App-store review prompt throttling
//!
//! Decides when to ask the platform for a native "rate this app" prompt.
//! The platform, not this module, decides whether anything is actually
//! shown; the job here is purely to avoid over-asking. Check entry points
//! never propagate errors and are meant to be detached from the invoking
//! flow (`spawn_*` helpers).

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Utc};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

const FIRST_LAUNCH_KEY: &str = "review.first_launch_completed";
const SCAN_COUNT_KEY: &str = "review.successful_scans";
const LAST_REQUEST_KEY: &str = "review.last_request_at";
const YEAR_COUNT_KEY: &str = "review.requests_this_year";

/// Minimum days between prompts.
const MIN_DAYS_BETWEEN_REQUESTS: i64 = 30;

/// Platform ceiling on prompts per calendar year.
const MAX_REQUESTS_PER_YEAR: u32 = 3;

/// Native review-prompt capability boundary.
pub trait ReviewPromptApi: Send + Sync {
    /// Whether the platform can show a review prompt at all.
    fn has_action(&self) -> bool;
    /// Fire-and-forget request; the platform decides whether to display.
    fn request_review(&self);
}

/// Headless default. The host shell swaps in the platform implementation;
/// without one, the capability check simply reports unavailable.
pub struct NoopReviewPrompt;

impl ReviewPromptApi for NoopReviewPrompt {
    fn has_action(&self) -> bool {
        false
    }
    fn request_review(&self) {}
}

/// Milestones: the 1st success, the 5th, then every 10th after that.
fn is_milestone(count: u32) -> bool {
    count == 1 || count == 5 || (count > 5 && count % 10 == 0)
}

pub struct ReviewPromptThrottle {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn ReviewPromptApi>,
}

impl ReviewPromptThrottle {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Arc<dyn ReviewPromptApi>) -> Self {
        Self { store, api }
    }

    /// App-launch hook. The first launch only latches the flag; later
    /// launches may prompt once the user has a successful scan behind them.
    pub fn check_app_launch_review(&self) {
        if !self.read_bool(FIRST_LAUNCH_KEY) {
            self.write(FIRST_LAUNCH_KEY, "true");
            debug!("First launch recorded");
            return;
        }
        if self.read_u32(SCAN_COUNT_KEY) == 0 {
            return;
        }
        self.request_if_eligible();
    }

    /// Scan-success hook. Increments the success counter and prompts at
    /// milestone counts.
    pub fn check_scan_success_review(&self) {
        let count = self.read_u32(SCAN_COUNT_KEY).saturating_add(1);
        self.write(SCAN_COUNT_KEY, &count.to_string());

        if !is_milestone(count) {
            return;
        }
        debug!(count, "Review milestone reached");
        self.request_if_eligible();
    }

    /// Detached variant of `check_app_launch_review`; the calling flow
    /// must never block on review bookkeeping.
    pub fn spawn_app_launch_check(self: &Arc<Self>) {
        let throttle = Arc::clone(self);
        tokio::spawn(async move { throttle.check_app_launch_review() });
    }

    /// Detached variant of `check_scan_success_review`.
    pub fn spawn_scan_success_check(self: &Arc<Self>) {
        let throttle = Arc::clone(self);
        tokio::spawn(async move { throttle.check_scan_success_review() });
    }

    fn request_if_eligible(&self) {
        if !self.api.has_action() {
            return;
        }

        let now = Utc::now();
        let last = self.last_request_at();
        let eligible = match last {
            None => true,
            Some(last) => {
                (now - last).num_days() >= MIN_DAYS_BETWEEN_REQUESTS
                    && self.requests_this_year(last, now) < MAX_REQUESTS_PER_YEAR
            }
        };
        if !eligible {
            debug!("Review prompt suppressed by frequency gate");
            return;
        }

        self.record_request(last, now);
        self.api.request_review();
    }

    /// Yearly counter as of `now`: the stored value, or 0 once the
    /// calendar year has rolled past the last recorded request.
    fn requests_this_year(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        if last.with_timezone(&Local).year() != now.with_timezone(&Local).year() {
            0
        } else {
            self.read_u32(YEAR_COUNT_KEY)
        }
    }

    /// The yearly counter resets to 1 here, when the first request of a
    /// new year is recorded, not eagerly at rollover.
    fn record_request(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        let next = match last {
            Some(last) if last.with_timezone(&Local).year() == now.with_timezone(&Local).year() => {
                self.read_u32(YEAR_COUNT_KEY).saturating_add(1)
            }
            _ => 1,
        };
        self.write(LAST_REQUEST_KEY, &now.to_rfc3339());
        self.write(YEAR_COUNT_KEY, &next.to_string());
    }

    fn last_request_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(LAST_REQUEST_KEY).ok().flatten()?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!("Corrupt review request timestamp, ignoring: {}", e);
                None
            }
        }
    }

    fn read_bool(&self, key: &str) -> bool {
        matches!(
            self.store.get(key).ok().flatten().as_deref(),
            Some("true")
        )
    }

    fn read_u32(&self, key: &str) -> u32 {
        self.store
            .get(key)
            .ok()
            .flatten()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Review state write failed for {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakePrompt {
        available: bool,
        requests: AtomicU32,
    }

    impl FakePrompt {
        fn new(available: bool) -> Arc<Self> {
            Arc::new(Self {
                available,
                requests: AtomicU32::new(0),
            })
        }

        fn count(&self) -> u32 {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl ReviewPromptApi for FakePrompt {
        fn has_action(&self) -> bool {
            self.available
        }
        fn request_review(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_throttle(prompt: Arc<FakePrompt>) -> (ReviewPromptThrottle, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReviewPromptThrottle::new(store.clone(), prompt), store)
    }

    // P5: over counts 1..=25 with the frequency gate held open, prompts
    // fire exactly at 1, 5, 10, and 20.
    #[test]
    fn test_milestone_sequence() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());

        let mut fired_at = Vec::new();
        for count in 1..=25u32 {
            let before = prompt.count();
            throttle.check_scan_success_review();
            if prompt.count() > before {
                fired_at.push(count);
                // Hold the gate open for the next milestone.
                store
                    .set(
                        LAST_REQUEST_KEY,
                        &(Utc::now() - Duration::days(31)).to_rfc3339(),
                    )
                    .unwrap();
                store.set(YEAR_COUNT_KEY, "0").unwrap();
            }
        }
        assert_eq!(fired_at, vec![1, 5, 10, 20]);
    }

    // P6: 10 days since the last request is too soon; 31 days is enough.
    #[test]
    fn test_frequency_gate() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());
        store.set(SCAN_COUNT_KEY, "4").unwrap();
        store.set(YEAR_COUNT_KEY, "1").unwrap();

        store
            .set(
                LAST_REQUEST_KEY,
                &(Utc::now() - Duration::days(10)).to_rfc3339(),
            )
            .unwrap();
        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 0, "10 days since last request is too soon");

        store.set(SCAN_COUNT_KEY, "4").unwrap();
        store
            .set(
                LAST_REQUEST_KEY,
                &(Utc::now() - Duration::days(31)).to_rfc3339(),
            )
            .unwrap();
        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 1);
    }

    #[test]
    fn test_yearly_cap() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());
        store.set(SCAN_COUNT_KEY, "4").unwrap();
        store.set(YEAR_COUNT_KEY, "3").unwrap();
        // Jan 2 noon UTC lands in the current local year for every offset,
        // so the stored counter applies: either the 30-day spacing or the
        // yearly budget blocks the prompt, whatever today's date is.
        let jan2 = Utc
            .with_ymd_and_hms(Utc::now().year(), 1, 2, 12, 0, 0)
            .unwrap();
        store.set(LAST_REQUEST_KEY, &jan2.to_rfc3339()).unwrap();

        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 0, "three requests this year exhausts the budget");
    }

    // Year rollover is detected lazily and resets the counter to 1 as part
    // of recording the new request.
    #[test]
    fn test_year_rollover_resets_counter_on_record() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());
        store.set(SCAN_COUNT_KEY, "4").unwrap();
        store.set(YEAR_COUNT_KEY, "3").unwrap();
        store
            .set(
                LAST_REQUEST_KEY,
                &(Utc::now() - Duration::days(400)).to_rfc3339(),
            )
            .unwrap();

        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 1);
        assert_eq!(store.get(YEAR_COUNT_KEY).unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_first_launch_only_latches() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());

        throttle.check_app_launch_review();
        assert_eq!(prompt.count(), 0);
        assert_eq!(store.get(FIRST_LAUNCH_KEY).unwrap().as_deref(), Some("true"));

        // Later launches without any successful scan stay quiet.
        throttle.check_app_launch_review();
        assert_eq!(prompt.count(), 0);

        // With a scan behind them and an open gate, a later launch prompts.
        store.set(SCAN_COUNT_KEY, "2").unwrap();
        throttle.check_app_launch_review();
        assert_eq!(prompt.count(), 1);
    }

    #[test]
    fn test_unavailable_capability_suppresses_everything() {
        let prompt = FakePrompt::new(false);
        let (throttle, _store) = make_throttle(prompt.clone());

        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 0);
    }

    #[test]
    fn test_corrupt_counters_read_as_zero() {
        let prompt = FakePrompt::new(true);
        let (throttle, store) = make_throttle(prompt.clone());
        store.set(SCAN_COUNT_KEY, "not a number").unwrap();
        store.set(LAST_REQUEST_KEY, "garbage").unwrap();

        // Counter restarts from the corrupt value's default; the first
        // increment lands on milestone 1 and the garbage timestamp reads
        // as "no prior request".
        throttle.check_scan_success_review();
        assert_eq!(prompt.count(), 1);
    }

    #[test]
    fn test_milestone_predicate() {
        let fired: Vec<u32> = (1..=40).filter(|&n| is_milestone(n)).collect();
        assert_eq!(fired, vec![1, 5, 10, 20, 30, 40]);
    }
}
