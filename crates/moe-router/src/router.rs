//! Router Core: orchestrates the registry, cost predictor, tracker, circuit
//! breaker, hybrid strategy and learning loop into a single `select_model`
//! entry point.

use std::collections::HashMap;

use moe_config::ModelDefinition;

use crate::breaker::{CircuitBreaker, Snapshot as BreakerSnapshot};
use crate::cost::{self, CostEstimate};
use crate::hybrid;
use crate::learning::LearningLoop;
use crate::registry::ModelRegistry;
use crate::tracker::PerformanceTracker;
use crate::types::{Decision, Evidence, FeedbackData, Outcome, RoutingRequest, RoutingStrategy, TaskType};

/// Weights for the Step 3 multi-objective score. Defaults per the reference
/// layout; callers may tune them per deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub quality: f64,
    pub cost: f64,
    pub latency: f64,
    pub task_preference: f64,
    pub tracker: f64,
    pub learning: f64,
    pub diversity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            quality: 0.30,
            cost: 0.20,
            latency: 0.10,
            task_preference: 0.10,
            tracker: 0.15,
            learning: 0.15,
            diversity: 0.05,
        }
    }
}

impl ScoringWeights {
    fn ideal_score(self) -> f64 {
        self.quality + self.cost + self.latency + self.task_preference + self.tracker + self.learning + self.diversity
    }
}

/// Observability snapshot across the router's collaborators.
#[derive(Debug, Clone)]
pub struct RoutingStats {
    pub total_models: usize,
    pub enabled_models: usize,
    pub breaker: HashMap<String, BreakerSnapshot>,
}

fn latency_efficiency(model: &ModelDefinition) -> f64 {
    model.latency_p50_ms.map_or(0.5, |p50| 1.0 / (1.0 + p50 as f64 / 1000.0))
}

struct Scored<'a> {
    model: &'a ModelDefinition,
    score: f64,
    cost: CostEstimate,
}

/// Owns the registry and process-local mutable collaborators, and exposes
/// the router's two entry points: `select_model` (sync, no I/O) and
/// `record_feedback`.
pub struct Router {
    registry: ModelRegistry,
    breaker: CircuitBreaker,
    tracker: PerformanceTracker,
    learning: LearningLoop,
    weights: ScoringWeights,
}

impl Router {
    #[must_use]
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_weights(registry, ScoringWeights::default())
    }

    #[must_use]
    pub fn with_weights(registry: ModelRegistry, weights: ScoringWeights) -> Self {
        Self { registry, breaker: CircuitBreaker::default(), tracker: PerformanceTracker::new(), learning: LearningLoop::new(), weights }
    }

    /// A router whose tracker can persist counters through `store` instead
    /// of staying purely in-memory. `select_model`/`record_outcome`/
    /// `record_feedback` stay synchronous and never touch `store`; call
    /// [`Self::record_outcome_and_persist`]/[`Self::record_feedback_and_persist`]
    /// to also write through, and [`Self::hydrate`] to seed counters from it
    /// at startup. See [`PerformanceTracker::with_store`].
    #[must_use]
    pub fn with_store(registry: ModelRegistry, weights: ScoringWeights, store: std::sync::Arc<dyn crate::store::PersistenceStore>) -> Self {
        Self { registry, breaker: CircuitBreaker::default(), tracker: PerformanceTracker::with_store(store), learning: LearningLoop::new(), weights }
    }

    #[must_use]
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub const fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    #[must_use]
    pub const fn learning(&self) -> &LearningLoop {
        &self.learning
    }

    fn hard_filter_reject(&self, model: &ModelDefinition, request: &RoutingRequest, input_tokens: u32, output_tokens: u32) -> Option<&'static str> {
        if !model.enabled {
            return Some("disabled");
        }
        if model.quality_score < request.quality_requirement {
            return Some("quality_below_requirement");
        }
        let required_window = request.context_size.unwrap_or(0).max(input_tokens + output_tokens);
        if model.context_window < required_window {
            return Some("context_window_too_small");
        }
        if !request.required_capabilities().iter().all(|cap| model.capabilities.contains(cap)) {
            return Some("missing_capability");
        }
        if let (Some(p95), Some(max_latency)) = (model.latency_p95_ms, request.latency_requirement_ms)
            && p95 > max_latency
        {
            return Some("latency_above_requirement");
        }
        if let Some(preference) = request.vendor_preference
            && model.provider != preference
        {
            return Some("vendor_preference_mismatch");
        }
        if !self.breaker.is_available(model.provider.as_str()) {
            return Some("circuit_open");
        }
        None
    }

    /// Filter, score and rank the registry against a request. Returns the
    /// eligible candidates in descending score order, plus the rejection
    /// reason tally for empty-result rationale.
    fn candidates(&self, request: &RoutingRequest) -> (Vec<Scored<'_>>, HashMap<&'static str, u32>) {
        let (input_tokens, output_tokens) = cost::estimate_tokens(request);
        let task_type = request.task_type.unwrap_or(TaskType::General);

        let mut reasons: HashMap<&'static str, u32> = HashMap::new();
        let mut survivors: Vec<&ModelDefinition> = Vec::new();

        for model in self.registry.all() {
            match self.hard_filter_reject(model, request, input_tokens, output_tokens) {
                Some(reason) => *reasons.entry(reason).or_insert(0) += 1,
                None => survivors.push(model),
            }
        }

        let mut shadow: Vec<&ModelDefinition> = Vec::new();
        let mut scored: Vec<Scored<'_>> = Vec::new();

        for model in survivors {
            let estimate = cost::predict(model, request);
            if !estimate.within_budget(request.cost_budget) {
                *reasons.entry("over_budget").or_insert(0) += 1;
                shadow.push(model);
                continue;
            }

            let cost_efficiency = cost::cost_efficiency(estimate.expected);
            let task_preference_bias = f64::from(u8::from(self.registry.is_preferred(task_type, &model.id)));
            let tracker_weight = self.tracker.recommendation_weight(&model.id, task_type);
            let learning_weight = self.learning.model_weight(&model.id, task_type);
            let diversity_bonus = f64::from(u8::from(request.vendor_diversity));

            let score = self.weights.quality * model.quality_score
                + self.weights.cost * cost_efficiency
                + self.weights.latency * latency_efficiency(model)
                + self.weights.task_preference * task_preference_bias
                + self.weights.tracker * tracker_weight
                + self.weights.learning * learning_weight
                + self.weights.diversity * diversity_bonus;

            scored.push(Scored { model, score, cost: estimate });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.model.quality_score.partial_cmp(&a.model.quality_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.cost.expected.partial_cmp(&b.cost.expected).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.model.id.cmp(&b.model.id))
        });

        if scored.is_empty() && !shadow.is_empty() {
            tracing::debug!(shadow = shadow.len(), "no candidate survived the cost filter");
        }

        (scored, reasons)
    }

    /// Select a model for `request`. Never panics on routine input;
    /// an empty registry or an over-constrained request yields
    /// `Decision::none` rather than an error.
    #[must_use]
    pub fn select_model(&self, request: &RoutingRequest) -> Decision {
        if self.registry.all().is_empty() {
            return Decision::none("no eligible models: registry is empty");
        }

        let (scored, reasons) = self.candidates(request);

        let Some(top) = scored.first() else {
            let mut reasons: Vec<(&str, u32)> = reasons.into_iter().collect();
            reasons.sort_by_key(|&(_, count)| std::cmp::Reverse(count));
            let top_reasons = reasons.iter().take(3).map(|(reason, count)| format!("{reason} ({count})")).collect::<Vec<_>>().join(", ");
            return Decision::none(format!("no eligible models: {top_reasons}"));
        };

        let task_type = request.task_type.unwrap_or(TaskType::General);
        let mut evidence = vec![
            Evidence { source: "cost_predictor".to_owned(), description: format!("estimated cost ${:.6}", top.cost.expected), weight: 1.0 },
            Evidence {
                source: "performance_tracker".to_owned(),
                description: format!("recommendation weight {:.3}", self.tracker.recommendation_weight(&top.model.id, task_type)),
                weight: 0.6,
            },
            Evidence {
                source: "learning_loop".to_owned(),
                description: format!("learned weight {:.3}", self.learning.model_weight(&top.model.id, task_type)),
                weight: 0.6,
            },
        ];
        if self.registry.is_preferred(task_type, &top.model.id) {
            evidence.push(Evidence { source: "task_preferences".to_owned(), description: format!("{} is a preferred model for {task_type:?}", top.model.id), weight: 0.5 });
        }

        let ideal = self.weights.ideal_score();
        let confidence = if ideal > 0.0 { (top.score / ideal).clamp(0.0, 1.0) } else { 0.0 };

        let parallel_eligible = hybrid::should_parallelize(request);
        let survivor_defs: Vec<ModelDefinition> = scored.iter().map(|s| s.model.clone()).collect();

        let (routing_strategy, parallel_models) = if parallel_eligible && scored.len() > 1 {
            let set = hybrid::select_parallel_set(request, &survivor_defs, 3);
            let ids = set.iter().map(|m| m.id.clone()).collect::<Vec<_>>();
            evidence.push(Evidence { source: "hybrid_strategy".to_owned(), description: format!("parallel dispatch to {} models", ids.len()), weight: 0.7 });
            (RoutingStrategy::Parallel, ids)
        } else {
            (RoutingStrategy::Single, Vec::new())
        };

        let mut fallback_models = Vec::new();
        for candidate in scored.iter().skip(1) {
            if fallback_models.len() >= 3 {
                break;
            }
            if request.vendor_diversity && candidate.model.provider == top.model.provider && scored.iter().skip(1).any(|s| s.model.provider != top.model.provider) {
                continue;
            }
            fallback_models.push(candidate.model.id.clone());
        }

        Decision {
            selected_model: top.model.id.clone(),
            fallback_models,
            routing_strategy,
            parallel_models,
            estimated_cost: top.cost.expected,
            estimated_quality: top.model.quality_score,
            confidence,
            evidence,
            rationale: format!("selected {} (score {:.3}, confidence {:.3})", top.model.id, top.score, confidence),
        }
    }

    /// Record a bare outcome (no learning-loop fan-out). Resolves the
    /// provider from `model_id` via the registry.
    #[allow(clippy::too_many_arguments)]
    pub fn record_outcome(&self, model_id: &str, task_type: TaskType, success: bool, latency_ms: Option<u64>, cost: Option<f64>, quality_score: Option<f64>, error: Option<String>) {
        self.tracker.record_outcome(model_id, task_type, success, latency_ms, cost, quality_score, error);

        if let Some(model) = self.registry.find(model_id) {
            if success {
                self.breaker.record_success(model.provider.as_str());
            } else {
                self.breaker.record_failure(model.provider.as_str());
            }
        }
    }

    /// Record rich feedback: fans out to the tracker, circuit breaker and
    /// learning loop.
    pub fn record_feedback(&self, feedback: &FeedbackData) {
        let success = matches!(feedback.outcome, Outcome::Success);
        self.record_outcome(
            &feedback.model_id,
            feedback.task_type,
            success,
            feedback.actual_latency_ms,
            feedback.actual_cost,
            feedback.quality_score,
            None,
        );
        self.learning.record_feedback(feedback);
    }

    /// Like [`Self::record_outcome`], but also writes the outcome through to
    /// whatever store this router was built with (a no-op if constructed via
    /// [`Self::new`]/[`Self::with_weights`]). `record_outcome` itself stays
    /// synchronous and in-memory-only; this is the async counterpart a
    /// caller reaches for when it wants the store kept current.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_outcome_and_persist(
        &self,
        model_id: &str,
        task_type: TaskType,
        success: bool,
        latency_ms: Option<u64>,
        cost: Option<f64>,
        quality_score: Option<f64>,
        error: Option<String>,
    ) {
        self.record_outcome(model_id, task_type, success, latency_ms, cost, quality_score, error);
        self.tracker.persist_outcome(model_id, task_type, success).await;
    }

    /// Like [`Self::record_feedback`], but also writes the outcome through
    /// to the store, the same way [`Self::record_outcome_and_persist`]
    /// extends [`Self::record_outcome`].
    pub async fn record_feedback_and_persist(&self, feedback: &FeedbackData) {
        let success = matches!(feedback.outcome, Outcome::Success);
        self.record_feedback(feedback);
        self.tracker.persist_outcome(&feedback.model_id, feedback.task_type, success).await;
    }

    /// Seed the tracker's in-memory counters for (model_id, task_type) from
    /// the store, if nothing has been recorded yet this process. See
    /// [`PerformanceTracker::hydrate`].
    pub async fn hydrate(&self, model_id: &str, task_type: TaskType) {
        self.tracker.hydrate(model_id, task_type).await;
    }

    /// A snapshot of registry size and breaker state, for observability.
    #[must_use]
    pub fn routing_stats(&self) -> RoutingStats {
        let total_models = self.registry.all().len();
        let enabled_models = self.registry.all().iter().filter(|m| m.enabled).count();
        RoutingStats { total_models, enabled_models, breaker: self.breaker.snapshot() }
    }
}
