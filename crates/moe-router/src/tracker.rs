//! Performance tracker: rolling per-(model, task_type) outcomes and a
//! single recommendation weight.
//!
//! Grounded on `synapse_routing::feedback::FeedbackTracker` (a
//! `DashMap`-sharded per-key samples table with a bounded sliding window),
//! extended with Welford running means for cost, latency and quality.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use crate::store::{NoopStore, PersistenceStore};
use crate::types::{Outcome, TaskType};

/// Bound on the recent-outcomes ring buffer kept per key.
const MAX_SAMPLES: usize = 200;

/// Minimum observed samples before `recommendation_weight` trusts the data.
const N_MIN: u64 = 5;

/// One recorded outcome, retained in the bounded ring buffer for
/// `feedback_history`.
#[derive(Debug, Clone)]
pub struct RecordedOutcome {
    pub task_type: TaskType,
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub cost: Option<f64>,
    pub quality_score: Option<f64>,
    pub error: Option<String>,
}

/// Welford's online algorithm for a running mean (and variance, unused here
/// beyond the mean but kept since the tracker's contract calls out
/// "Welford-style running means").
#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningMean {
    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn has_samples(self) -> bool {
        self.count > 0
    }
}

#[derive(Debug, Default)]
struct KeyState {
    total: u64,
    successes: u64,
    failures: u64,
    recent: VecDeque<RecordedOutcome>,
    cost: RunningMean,
    latency: RunningMean,
    quality: RunningMean,
}

/// Maintains per-(model, task_type) rolling outcomes and exposes a
/// recommendation weight in `[0, 1]`.
pub struct PerformanceTracker {
    keys: DashMap<(String, TaskType), KeyState>,
    store: Arc<dyn PersistenceStore>,
}

impl std::fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceTracker").field("keys", &self.keys).finish_non_exhaustive()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self { keys: DashMap::new(), store: Arc::new(NoopStore) }
    }
}

impl PerformanceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker backed by `store` instead of the default `NoopStore`,
    /// injected rather than hard-coded so the caller picks the backend
    /// (in-process `NoopStore`, `RedisStore` behind the `redis-store`
    /// feature, or a test double).
    #[must_use]
    pub fn with_store(store: Arc<dyn PersistenceStore>) -> Self {
        Self { keys: DashMap::new(), store }
    }

    /// Record a completed (or failed) request against a (model, task_type)
    /// key. O(1) amortized.
    #[allow(clippy::too_many_arguments)]
    pub fn record_outcome(
        &self,
        model_id: &str,
        task_type: TaskType,
        success: bool,
        latency_ms: Option<u64>,
        cost: Option<f64>,
        quality_score: Option<f64>,
        error: Option<String>,
    ) {
        let mut entry = self.keys.entry((model_id.to_owned(), task_type)).or_default();
        entry.total += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        if let Some(cost) = cost {
            entry.cost.update(cost);
        }
        if let Some(latency_ms) = latency_ms {
            entry.latency.update(latency_ms as f64);
        }
        if let Some(quality_score) = quality_score {
            entry.quality.update(quality_score);
        }

        if entry.recent.len() >= MAX_SAMPLES {
            entry.recent.pop_front();
        }
        entry.recent.push_back(RecordedOutcome {
            task_type,
            success,
            latency_ms,
            cost,
            quality_score,
            error,
        });
    }

    /// `0.6 * success_rate + 0.4 * normalized_quality`, or the neutral `0.5`
    /// when fewer than `N_MIN` samples have been observed.
    #[must_use]
    pub fn recommendation_weight(&self, model_id: &str, task_type: TaskType) -> f64 {
        let Some(entry) = self.keys.get(&(model_id.to_owned(), task_type)) else {
            return 0.5;
        };

        if entry.total < N_MIN {
            return 0.5;
        }

        let success_rate = entry.successes as f64 / entry.total as f64;
        let normalized_quality = if entry.quality.has_samples() {
            entry.quality.mean.clamp(0.0, 1.0)
        } else {
            success_rate
        };

        (0.6 * success_rate + 0.4 * normalized_quality).clamp(0.0, 1.0)
    }

    /// Most-recent entries matching an optional (model, task_type) filter,
    /// newest first, bounded by `limit`.
    #[must_use]
    pub fn feedback_history(&self, model_id: Option<&str>, task_type: Option<TaskType>, limit: usize) -> Vec<RecordedOutcome> {
        let mut history: Vec<RecordedOutcome> = self
            .keys
            .iter()
            .filter(|entry| model_id.is_none_or(|id| entry.key().0 == id))
            .filter(|entry| task_type.is_none_or(|t| entry.key().1 == t))
            .flat_map(|entry| entry.recent.iter().rev().cloned().collect::<Vec<_>>())
            .collect();
        history.truncate(limit);
        history
    }

    /// Mean observed cost for a key, if any cost samples were recorded.
    #[must_use]
    pub fn mean_cost(&self, model_id: &str, task_type: TaskType) -> Option<f64> {
        self.keys
            .get(&(model_id.to_owned(), task_type))
            .filter(|e| e.cost.has_samples())
            .map(|e| e.cost.mean)
    }

    /// Mean observed latency (ms) for a key, if any latency samples were
    /// recorded.
    #[must_use]
    pub fn mean_latency_ms(&self, model_id: &str, task_type: TaskType) -> Option<f64> {
        self.keys
            .get(&(model_id.to_owned(), task_type))
            .filter(|e| e.latency.has_samples())
            .map(|e| e.latency.mean)
    }

    /// Write this outcome's counters through to the backing store, on top of
    /// the in-memory update `record_outcome` already made. A store failure
    /// is logged and discarded: it never reaches the caller, matching
    /// `store.rs`'s "swallow and log" contract.
    pub async fn persist_outcome(&self, model_id: &str, task_type: TaskType, success: bool) {
        let prefix = format!("{model_id}:{task_type:?}");
        if let Err(err) = self.store.incr(&format!("{prefix}:total"), 1).await {
            tracing::warn!(model_id, error = %err, "failed to persist tracker total");
            return;
        }
        let suffix = if success { "successes" } else { "failures" };
        if let Err(err) = self.store.incr(&format!("{prefix}:{suffix}"), 1).await {
            tracing::warn!(model_id, error = %err, "failed to persist tracker outcome");
        }
    }

    /// Seed this key's in-memory counters from the backing store, if nothing
    /// has been recorded yet this process. Used to carry counters across a
    /// restart; a store failure or a cold key leaves the tracker at its
    /// default in-memory state.
    ///
    /// The "nothing recorded yet" check happens in the same `DashMap` entry
    /// lock as the write, after the store round-trip completes, so a
    /// concurrent `record_outcome` that lands while the store read is in
    /// flight is never clobbered by a stale snapshot.
    pub async fn hydrate(&self, model_id: &str, task_type: TaskType) {
        let prefix = format!("{model_id}:{task_type:?}");
        let mut counts = [0u64; 3];
        for (slot, suffix) in counts.iter_mut().zip(["total", "successes", "failures"]) {
            match self.store.get(&format!("{prefix}:{suffix}")).await {
                Ok(Some(raw)) => *slot = raw.parse().unwrap_or(0),
                Ok(None) => return,
                Err(err) => {
                    tracing::warn!(model_id, error = %err, "failed to hydrate tracker counters");
                    return;
                }
            }
        }

        let [total, successes, failures] = counts;
        if total == 0 {
            return;
        }
        let mut entry = self.keys.entry((model_id.to_owned(), task_type)).or_default();
        if entry.total != 0 {
            return;
        }
        entry.total = total;
        entry.successes = successes;
        entry.failures = failures;
    }
}

/// Classify an outcome's boolean success flag the way the spec's
/// `FeedbackData.outcome` does: `success` is true, `partial`/`failure` are
/// not.
#[must_use]
pub const fn outcome_is_success(outcome: Outcome) -> bool {
    matches!(outcome, Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_weight_below_n_min() {
        let tracker = PerformanceTracker::new();
        tracker.record_outcome("m", TaskType::General, true, None, None, None, None);
        assert!((tracker.recommendation_weight("m", TaskType::General) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn weight_reflects_success_and_quality() {
        let tracker = PerformanceTracker::new();
        for _ in 0..10 {
            tracker.record_outcome("m", TaskType::General, true, Some(100), Some(0.01), Some(0.9), None);
        }
        let weight = tracker.recommendation_weight("m", TaskType::General);
        assert!((weight - (0.6 * 1.0 + 0.4 * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn weight_falls_back_to_success_rate_without_quality() {
        let tracker = PerformanceTracker::new();
        for success in [true, true, true, true, false, false] {
            tracker.record_outcome("m", TaskType::General, success, None, None, None, None);
        }
        let weight = tracker.recommendation_weight("m", TaskType::General);
        let expected_success_rate = 4.0 / 6.0;
        assert!((weight - expected_success_rate).abs() < 1e-9);
    }

    #[test]
    fn weight_stays_bounded_under_feedback() {
        let tracker = PerformanceTracker::new();
        for i in 0..500 {
            let success = i % 3 != 0;
            tracker.record_outcome("m", TaskType::General, success, Some(50), Some(0.02), Some(0.3), None);
        }
        let weight = tracker.recommendation_weight("m", TaskType::General);
        assert!((0.0..=1.0).contains(&weight));
    }

    #[test]
    fn feedback_history_respects_limit_and_filter() {
        let tracker = PerformanceTracker::new();
        for i in 0..10 {
            tracker.record_outcome("m", TaskType::General, i % 2 == 0, None, None, None, None);
        }
        tracker.record_outcome("other", TaskType::Planning, true, None, None, None, None);

        let history = tracker.feedback_history(Some("m"), Some(TaskType::General), 5);
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let tracker = PerformanceTracker::new();
        for _ in 0..(MAX_SAMPLES + 50) {
            tracker.record_outcome("m", TaskType::General, true, None, None, None, None);
        }
        let history = tracker.feedback_history(Some("m"), Some(TaskType::General), MAX_SAMPLES + 50);
        assert_eq!(history.len(), MAX_SAMPLES);
    }

    /// An in-memory `PersistenceStore` double, standing in for `RedisStore`
    /// in tests that don't want a real Redis instance.
    #[derive(Debug, Default)]
    struct MemoryStore {
        values: DashMap<String, String>,
    }

    #[async_trait::async_trait]
    impl PersistenceStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, crate::store::StoreError> {
            Ok(self.values.get(key).map(|v| v.clone()))
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), crate::store::StoreError> {
            self.values.insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn incr(&self, key: &str, delta: i64) -> Result<i64, crate::store::StoreError> {
            let next = {
                let mut entry = self.values.entry(key.to_owned()).or_insert_with(|| "0".to_owned());
                let next = entry.parse::<i64>().unwrap_or(0) + delta;
                *entry = next.to_string();
                next
            };
            Ok(next)
        }
    }

    #[tokio::test]
    async fn persist_outcome_writes_through_to_the_store() {
        let store = Arc::new(MemoryStore::default());
        let tracker = PerformanceTracker::with_store(store.clone());
        tracker.record_outcome("m", TaskType::General, true, None, None, None, None);
        tracker.persist_outcome("m", TaskType::General, true).await;
        tracker.record_outcome("m", TaskType::General, false, None, None, None, None);
        tracker.persist_outcome("m", TaskType::General, false).await;

        assert_eq!(store.get("m:General:total").await.unwrap(), Some("2".to_owned()));
        assert_eq!(store.get("m:General:successes").await.unwrap(), Some("1".to_owned()));
        assert_eq!(store.get("m:General:failures").await.unwrap(), Some("1".to_owned()));
    }

    /// Wraps `MemoryStore` with a delay on `get`, so a concurrent
    /// `record_outcome` can be made to land while `hydrate` is mid-round-trip.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl PersistenceStore for SlowStore {
        async fn get(&self, key: &str) -> Result<Option<String>, crate::store::StoreError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), crate::store::StoreError> {
            self.inner.put(key, value).await
        }

        async fn incr(&self, key: &str, delta: i64) -> Result<i64, crate::store::StoreError> {
            self.inner.incr(key, delta).await
        }
    }

    #[tokio::test]
    async fn hydrate_does_not_clobber_an_outcome_recorded_mid_round_trip() {
        let store = Arc::new(SlowStore::default());
        store.put("m:General:total", "50").await.unwrap();
        store.put("m:General:successes", "40").await.unwrap();
        store.put("m:General:failures", "10").await.unwrap();

        let tracker = Arc::new(PerformanceTracker::with_store(store));
        let hydrating = tracker.clone();
        let hydrate_task = tokio::spawn(async move { hydrating.hydrate("m", TaskType::General).await });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        tracker.record_outcome("m", TaskType::General, true, None, None, None, None);

        hydrate_task.await.unwrap();

        let history = tracker.feedback_history(Some("m"), Some(TaskType::General), 10);
        assert_eq!(history.len(), 1, "the in-flight record_outcome must win over the stale store snapshot");
    }

    #[tokio::test]
    async fn hydrate_seeds_counters_from_the_store() {
        let store = Arc::new(MemoryStore::default());
        store.put("m:General:total", "10").await.unwrap();
        store.put("m:General:successes", "7").await.unwrap();
        store.put("m:General:failures", "3").await.unwrap();

        let tracker = PerformanceTracker::with_store(store);
        tracker.hydrate("m", TaskType::General).await;

        let weight = tracker.recommendation_weight("m", TaskType::General);
        assert!((weight - (0.6 * 0.7 + 0.4 * 0.7)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn hydrate_does_not_override_existing_in_memory_state() {
        let store = Arc::new(MemoryStore::default());
        store.put("m:General:total", "999").await.unwrap();
        store.put("m:General:successes", "999").await.unwrap();
        store.put("m:General:failures", "0").await.unwrap();

        let tracker = PerformanceTracker::with_store(store);
        tracker.record_outcome("m", TaskType::General, true, None, None, None, None);
        tracker.hydrate("m", TaskType::General).await;

        let history = tracker.feedback_history(Some("m"), Some(TaskType::General), 10);
        assert_eq!(history.len(), 1);
    }
}
