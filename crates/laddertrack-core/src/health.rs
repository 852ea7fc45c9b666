//! Per-provider health accounting.
//!
//! A [`HealthMonitor`] counts terminal outcomes of logical operations and folds them
//! into a [`HealthScore`] on a schedule. Monitors live in a [`HealthRegistry`] that is
//! built at startup and handed to whoever reports health.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::ProviderId;

/// Durable key/value store used to publish health snapshots.
pub trait VariableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Process-local [`VariableStore`].
#[derive(Debug, Default)]
pub struct InMemoryVariableStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableStore for InMemoryVariableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory variable store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::new("in-memory variable store lock poisoned"))?;
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Coarse health label derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Snapshot produced by one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// Requests counted in the folded window.
    pub requests: u64,
    /// Errors counted in the folded window.
    pub errors: u64,
    pub error_rate: f64,
    pub health: f64,
}

impl Default for HealthScore {
    fn default() -> Self {
        Self::from_counts(0, 0)
    }
}

impl HealthScore {
    pub fn from_counts(requests: u64, errors: u64) -> Self {
        let error_rate = if requests == 0 {
            0.0
        } else {
            errors.min(requests) as f64 / requests as f64 * 100.0
        };

        Self {
            requests,
            errors,
            error_rate,
            health: 100.0 - error_rate,
        }
    }

    pub fn state(&self) -> HealthState {
        if self.health >= 90.0 {
            HealthState::Healthy
        } else if self.health >= 50.0 {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    }
}

// Both counters share one atomic word: requests in the high half, errors in the low
// half. A terminal outcome is a single fetch_add and a fold is a single swap, so
// `errors <= requests` holds for every window as long as errors are recorded through
// `record` or after their request. Each window must stay below 2^32 events.
const REQUEST_UNIT: u64 = 1 << 32;
const ERROR_MASK: u64 = REQUEST_UNIT - 1;

const MIN_UPDATE_PERIOD: Duration = Duration::from_millis(1);

/// Request/error counters and the latest score for one provider.
pub struct HealthMonitor {
    prefix: String,
    counters: AtomicU64,
    score: ArcSwap<HealthScore>,
    store: Arc<dyn VariableStore>,
}

impl HealthMonitor {
    /// Monitor starting from the default score (health 100).
    pub fn new(prefix: impl Into<String>, store: Arc<dyn VariableStore>) -> Self {
        Self {
            prefix: prefix.into(),
            counters: AtomicU64::new(0),
            score: ArcSwap::from_pointee(HealthScore::default()),
            store,
        }
    }

    /// Monitor seeded with the last score persisted under `prefix`.
    ///
    /// Missing or unreadable entries fall back to the default score.
    pub fn restore(prefix: impl Into<String>, store: Arc<dyn VariableStore>) -> Self {
        let monitor = Self::new(prefix, store);
        match monitor.load_persisted() {
            Ok(Some(score)) => monitor.score.store(Arc::new(score)),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(prefix = %monitor.prefix, %error, "failed to restore health score");
            }
        }
        monitor
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn add_request(&self) {
        self.counters.fetch_add(REQUEST_UNIT, Ordering::Relaxed);
    }

    /// Count an error for a request that was already counted.
    ///
    /// Prefer [`record`](Self::record), which counts both halves in one step. An error
    /// without its request would carry into the request half once the window overflows.
    pub fn add_error(&self) {
        let (requests, errors) = unpack(self.counters.fetch_add(1, Ordering::Relaxed));
        debug_assert!(
            errors < requests,
            "health error counted without a matching request ({errors} errors, {requests} requests)"
        );
    }

    /// Count one terminal outcome: a request, plus an error when `failed`.
    pub fn record(&self, failed: bool) {
        self.counters
            .fetch_add(REQUEST_UNIT + u64::from(failed), Ordering::Relaxed);
    }

    /// Counters accumulated since the last fold, as `(requests, errors)`.
    pub fn pending(&self) -> (u64, u64) {
        unpack(self.counters.load(Ordering::Acquire))
    }

    /// Swap the counters to zero, publish and persist the new score.
    pub fn update(&self) -> HealthScore {
        let (requests, errors) = unpack(self.counters.swap(0, Ordering::AcqRel));
        let score = HealthScore::from_counts(requests, errors);
        self.score.store(Arc::new(score));

        if let Err(error) = self.persist(&score) {
            tracing::warn!(prefix = %self.prefix, %error, "failed to persist health score");
        }

        tracing::debug!(
            prefix = %self.prefix,
            requests,
            errors,
            health = score.health,
            "folded health counters"
        );
        score
    }

    pub fn score(&self) -> HealthScore {
        **self.score.load()
    }

    pub fn health(&self) -> f64 {
        self.score.load().health
    }

    pub fn error_rate(&self) -> f64 {
        self.score.load().error_rate
    }

    /// Requests of the most recent fold.
    pub fn requests(&self) -> u64 {
        self.score.load().requests
    }

    /// Errors of the most recent fold.
    pub fn errors(&self) -> u64 {
        self.score.load().errors
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    fn persist(&self, score: &HealthScore) -> Result<(), StoreError> {
        self.store
            .set(&self.key("requests"), &score.requests.to_string())?;
        self.store.set(&self.key("errors"), &score.errors.to_string())?;
        self.store
            .set(&self.key("error_rate"), &score.error_rate.to_string())?;
        self.store.set(&self.key("health"), &score.health.to_string())
    }

    fn load_persisted(&self) -> Result<Option<HealthScore>, StoreError> {
        let Some(requests) = self.store.get(&self.key("requests"))? else {
            return Ok(None);
        };
        let errors = self.store.get(&self.key("errors"))?.unwrap_or_default();

        match (requests.parse::<u64>(), errors.parse::<u64>()) {
            (Ok(requests), Ok(errors)) => Ok(Some(HealthScore::from_counts(requests, errors))),
            _ => Err(StoreError::new(format!(
                "unparsable health counters for '{}'",
                self.prefix
            ))),
        }
    }
}

fn unpack(packed: u64) -> (u64, u64) {
    (packed >> 32, packed & ERROR_MASK)
}

/// Registry of per-provider monitors sharing one variable store.
pub struct HealthRegistry {
    store: Arc<dyn VariableStore>,
    monitors: RwLock<BTreeMap<ProviderId, Arc<HealthMonitor>>>,
}

impl HealthRegistry {
    pub fn new(store: Arc<dyn VariableStore>) -> Self {
        Self {
            store,
            monitors: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryVariableStore::new()))
    }

    pub fn store(&self) -> Arc<dyn VariableStore> {
        Arc::clone(&self.store)
    }

    /// Monitor for `provider`, created (and restored from the store) on first use.
    pub fn monitor(&self, provider: ProviderId) -> Arc<HealthMonitor> {
        if let Some(monitor) = self.get(provider) {
            return monitor;
        }

        let mut monitors = self
            .monitors
            .write()
            .expect("health registry lock is not poisoned");
        Arc::clone(monitors.entry(provider).or_insert_with(|| {
            Arc::new(HealthMonitor::restore(
                provider.as_str(),
                Arc::clone(&self.store),
            ))
        }))
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<HealthMonitor>> {
        self.monitors
            .read()
            .expect("health registry lock is not poisoned")
            .get(&provider)
            .cloned()
    }

    /// Fold every registered monitor.
    pub fn update_all(&self) -> Vec<(ProviderId, HealthScore)> {
        self.monitors()
            .into_iter()
            .map(|(provider, monitor)| (provider, monitor.update()))
            .collect()
    }

    /// Latest published score of every registered monitor.
    pub fn snapshot(&self) -> Vec<(ProviderId, HealthScore)> {
        self.monitors()
            .into_iter()
            .map(|(provider, monitor)| (provider, monitor.score()))
            .collect()
    }

    /// Fold all monitors every `period` until the returned task is aborted.
    ///
    /// Folds run on the blocking pool because persisting may hit disk. A zero period is
    /// raised to one millisecond.
    pub fn spawn_updater(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = period.max(MIN_UPDATE_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let registry = Arc::clone(&registry);
                if let Err(error) = tokio::task::spawn_blocking(move || registry.update_all()).await
                {
                    tracing::error!(%error, "health fold task failed");
                }
            }
        })
    }

    fn monitors(&self) -> Vec<(ProviderId, Arc<HealthMonitor>)> {
        self.monitors
            .read()
            .expect("health registry lock is not poisoned")
            .iter()
            .map(|(provider, monitor)| (*provider, Arc::clone(monitor)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> (HealthMonitor, Arc<InMemoryVariableStore>) {
        let store = Arc::new(InMemoryVariableStore::new());
        (HealthMonitor::new("aligulac", store.clone()), store)
    }

    #[test]
    fn starts_fully_healthy() {
        let (monitor, _) = monitor();

        assert_eq!(monitor.health(), 100.0);
        assert_eq!(monitor.error_rate(), 0.0);
        assert_eq!(monitor.requests(), 0);
        assert_eq!(monitor.errors(), 0);
    }

    #[test]
    fn fold_computes_rate_and_resets_counters() {
        let (monitor, store) = monitor();
        monitor.add_request();
        monitor.add_request();
        monitor.add_request();
        monitor.add_error();

        let score = monitor.update();

        assert!((score.error_rate - 33.333).abs() < 0.001);
        assert!((score.health - 66.667).abs() < 0.001);
        assert_eq!(monitor.requests(), 3);
        assert_eq!(monitor.errors(), 1);
        assert_eq!(monitor.pending(), (0, 0));
        assert_eq!(score.state(), HealthState::Degraded);
        assert_eq!(
            store.get("aligulac_requests").expect("get").as_deref(),
            Some("3")
        );
        assert!(store.get("aligulac_health").expect("get").is_some());
    }

    #[test]
    fn empty_fold_reports_full_health() {
        let (monitor, _) = monitor();
        monitor.record(true);
        monitor.update();
        assert_eq!(monitor.health(), 0.0);

        let score = monitor.update();

        assert_eq!(score.health, 100.0);
        assert_eq!(score.error_rate, 0.0);
        assert_eq!(monitor.requests(), 0);
    }

    #[test]
    fn score_stays_readable_between_folds() {
        let (monitor, _) = monitor();
        monitor.record(false);
        monitor.record(true);
        monitor.update();

        monitor.record(false);

        assert_eq!(monitor.health(), 50.0);
        assert_eq!(monitor.pending(), (1, 0));
    }

    #[test]
    fn concurrent_increments_are_never_lost() {
        let (monitor, _) = monitor();
        let monitor = Arc::new(monitor);
        let mut folded_requests = 0;
        let mut folded_errors = 0;

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for index in 0..10_000 {
                        monitor.record(index % 10 == 0);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let score = monitor.update();
            assert!(score.errors <= score.requests);
            folded_requests += score.requests;
            folded_errors += score.errors;
        }
        for worker in workers {
            worker.join().expect("worker");
        }
        let last = monitor.update();
        folded_requests += last.requests;
        folded_errors += last.errors;

        assert_eq!(folded_requests, 40_000);
        assert_eq!(folded_errors, 4_000);
    }

    #[test]
    fn restore_reads_persisted_counters() {
        let store: Arc<dyn VariableStore> = Arc::new(InMemoryVariableStore::new());
        store.set("twitch_requests", "4").expect("set");
        store.set("twitch_errors", "1").expect("set");

        let monitor = HealthMonitor::restore("twitch", store);

        assert_eq!(monitor.health(), 75.0);
        assert_eq!(monitor.requests(), 4);
    }

    #[test]
    fn registry_partitions_by_provider() {
        let registry = HealthRegistry::in_memory();
        registry.monitor(ProviderId::Twitch).record(true);
        registry.monitor(ProviderId::Discord).record(false);

        let folded: BTreeMap<_, _> = registry.update_all().into_iter().collect();

        assert_eq!(folded[&ProviderId::Twitch].health, 0.0);
        assert_eq!(folded[&ProviderId::Discord].health, 100.0);
        assert!(Arc::ptr_eq(
            &registry.monitor(ProviderId::Twitch),
            &registry.monitor(ProviderId::Twitch)
        ));
    }

    #[tokio::test]
    async fn updater_folds_on_schedule() {
        let registry = Arc::new(HealthRegistry::in_memory());
        let monitor = registry.monitor(ProviderId::Liquipedia);
        monitor.record(true);
        monitor.record(false);

        let task = registry.spawn_updater(Duration::from_millis(50));
        let mut folded = None;
        for _ in 0..500 {
            let score = monitor.score();
            if score.requests == 2 {
                folded = Some(score);
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        task.abort();

        let folded = folded.expect("updater should fold within a second");
        assert_eq!(folded.health, 50.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "without a matching request")]
    fn error_without_request_is_caught_in_debug_builds() {
        let (monitor, _) = monitor();
        monitor.add_error();
    }

    #[tokio::test]
    async fn zero_update_period_still_folds() {
        let registry = Arc::new(HealthRegistry::in_memory());
        let monitor = registry.monitor(ProviderId::Discord);
        monitor.record(false);

        let task = registry.spawn_updater(Duration::ZERO);
        for _ in 0..500 {
            if monitor.score().requests == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        task.abort();

        assert_eq!(monitor.score().requests, 1);
        assert_eq!(monitor.health(), 100.0);
    }
}
