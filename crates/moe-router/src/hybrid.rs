//! Hybrid (parallel) strategy: multi-model fan-out with consensus or judge
//! selection.
//!
//! Translated from `HybridRouter` (`hybrid_router.py`) into async Rust:
//! `tokio::time::timeout` + `futures::future::join_all` stand in for
//! `asyncio.wait_for`/`asyncio.gather`.

use std::future::Future;
use std::time::Duration;

use moe_config::{Capability, ModelDefinition};

use crate::cost::{cost_efficiency, predict};
use crate::error::RoutingError;
use crate::types::{Evidence, RoutingRequest, TaskType};

/// Preferred judge models, tried in order before falling back to the
/// highest-quality non-parallel model.
const JUDGE_MODEL_PREFERENCES: &[&str] = &["claude-opus-4", "gpt-5", "claude-sonnet-4", "o1"];

/// Rule for reconciling multiple parallel responses into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusStrategy {
    FirstSuccess,
    QualityWeighted,
    Voting,
    Judge,
}

/// Whether a request should fan out to multiple models (§4.5 eligibility,
/// logical OR over four conditions).
#[must_use]
pub fn should_parallelize(request: &RoutingRequest) -> bool {
    if request.enable_parallel {
        return true;
    }
    if request.task_type.is_some_and(TaskType::is_critical) {
        return true;
    }
    if request.quality_requirement >= 0.9 && request.cost_budget.is_none_or(|b| b >= 0.05) {
        return true;
    }
    request.is_marked_critical()
}

fn capable(request: &RoutingRequest, model: &ModelDefinition) -> bool {
    if !model.enabled {
        return false;
    }
    if model.quality_score < request.quality_requirement {
        return false;
    }
    if let Some(context_size) = request.context_size
        && model.context_window < context_size
    {
        return false;
    }
    request.required_capabilities().iter().all(|cap| model.capabilities.contains(cap))
}

fn parallel_score(model: &ModelDefinition, request: &RoutingRequest) -> f64 {
    let mut score = model.quality_score * 50.0;

    let estimate = predict(model, request);
    score += cost_efficiency(estimate.expected) * 20.0;

    if let Some(p50) = model.latency_p50_ms {
        let latency_efficiency = 1.0 / (1.0 + p50 as f64 / 1000.0);
        score += latency_efficiency * 10.0;
    }

    if request.vendor_diversity {
        score += 5.0;
    }

    match request.task_type {
        Some(TaskType::Reasoning) if model.capabilities.contains(&Capability::Reasoning) => score += 10.0,
        Some(TaskType::CodeGeneration) if model.capabilities.contains(&Capability::Code) => score += 10.0,
        _ => {}
    }

    score
}

/// Select up to `target` models for parallel dispatch: filter by
/// capability, score, then greedily pick one model per distinct provider
/// before filling remaining slots by score alone.
#[must_use]
pub fn select_parallel_set<'a>(request: &RoutingRequest, available: &'a [ModelDefinition], target: usize) -> Vec<&'a ModelDefinition> {
    let capable: Vec<&ModelDefinition> = available.iter().filter(|m| capable(request, m)).collect();
    if capable.len() <= target {
        return capable;
    }

    let mut scored: Vec<(&ModelDefinition, f64)> = capable.into_iter().map(|m| (m, parallel_score(m, request))).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<&ModelDefinition> = Vec::with_capacity(target);
    let mut used_providers = std::collections::HashSet::new();

    for (model, _) in &scored {
        if selected.len() >= target {
            break;
        }
        if used_providers.insert(model.provider) {
            selected.push(model);
        }
    }

    for (model, _) in &scored {
        if selected.len() >= target {
            break;
        }
        if !selected.iter().any(|s| s.id == model.id) {
            selected.push(model);
        }
    }

    selected
}

/// Choose a judge model not already in the parallel set, preferring the
/// fixed preference list.
#[must_use]
pub fn select_judge<'a>(available: &'a [ModelDefinition], parallel_set: &[&ModelDefinition]) -> Option<&'a ModelDefinition> {
    let parallel_ids: std::collections::HashSet<&str> = parallel_set.iter().map(|m| m.id.as_str()).collect();

    for judge_id in JUDGE_MODEL_PREFERENCES {
        if let Some(model) = available.iter().find(|m| m.id == *judge_id && m.enabled && !parallel_ids.contains(m.id.as_str())) {
            return Some(model);
        }
    }

    available
        .iter()
        .filter(|m| m.enabled && !parallel_ids.contains(m.id.as_str()))
        .max_by(|a, b| a.quality_score.partial_cmp(&b.quality_score).unwrap_or(std::cmp::Ordering::Equal))
}

/// One child call's outcome in a parallel dispatch.
pub struct ChildResult<R> {
    pub model: ModelDefinition,
    pub response: Option<R>,
    pub error: Option<String>,
}

impl<R> ChildResult<R> {
    const fn succeeded(&self) -> bool {
        self.error.is_none() && self.response.is_some()
    }
}

/// Invoke `call_fn(model)` for every model concurrently, each bounded by
/// `per_child_timeout`. A child's timeout or error is isolated; partial
/// results are returned rather than failing the whole dispatch.
pub async fn execute_parallel<R, F, Fut>(models: &[ModelDefinition], call_fn: F, per_child_timeout: Duration) -> Vec<ChildResult<R>>
where
    F: Fn(&ModelDefinition) -> Fut,
    Fut: Future<Output = Result<R, String>>,
{
    let children = models.iter().map(|model| async {
        match tokio::time::timeout(per_child_timeout, call_fn(model)).await {
            Ok(Ok(response)) => ChildResult { model: model.clone(), response: Some(response), error: None },
            Ok(Err(error)) => ChildResult { model: model.clone(), response: None, error: Some(error) },
            Err(_) => ChildResult { model: model.clone(), response: None, error: Some(format!("timeout after {per_child_timeout:?}")) },
        }
    });

    futures::future::join_all(children).await
}

/// The result of `judge_fn`: the chosen response's index and a rationale.
pub struct JudgeVerdict {
    pub selected_index: usize,
    pub rationale: String,
}

fn successful_indices<R>(results: &[ChildResult<R>]) -> Vec<usize> {
    results.iter().enumerate().filter(|(_, r)| r.succeeded()).map(|(i, _)| i).collect()
}

/// Reconcile parallel results into one winning index plus evidence, per
/// `strategy`. Returns `Err(AllParallelFailed)` if nothing succeeded.
///
/// # Errors
///
/// Returns [`RoutingError::AllParallelFailed`] when every child failed, and
/// never returns `Err` otherwise — `Judge` is handled by
/// [`judge_responses`], not this function.
pub fn apply_consensus<R: PartialEq>(results: &[ChildResult<R>], strategy: ConsensusStrategy) -> Result<(usize, Evidence), RoutingError> {
    let successful = successful_indices(results);
    if successful.is_empty() {
        return Err(RoutingError::AllParallelFailed { attempted: results.len() });
    }

    if successful.len() == 1 {
        let idx = successful[0];
        return Ok((
            idx,
            Evidence {
                source: "hybrid_strategy".to_owned(),
                description: format!("only successful response from {}", results[idx].model.id),
                weight: 1.0,
            },
        ));
    }

    match strategy {
        ConsensusStrategy::FirstSuccess => {
            let idx = successful[0];
            Ok((
                idx,
                Evidence {
                    source: "hybrid_strategy".to_owned(),
                    description: format!("first successful response from {}", results[idx].model.id),
                    weight: 0.8,
                },
            ))
        }
        ConsensusStrategy::QualityWeighted | ConsensusStrategy::Judge => {
            let idx = successful
                .iter()
                .copied()
                .max_by(|&a, &b| results[a].model.quality_score.partial_cmp(&results[b].model.quality_score).unwrap_or(std::cmp::Ordering::Equal))
                .unwrap_or(successful[0]);
            Ok((
                idx,
                Evidence {
                    source: "hybrid_strategy".to_owned(),
                    description: format!(
                        "highest quality model {} (score {}) selected from {} successful responses",
                        results[idx].model.id,
                        results[idx].model.quality_score,
                        successful.len()
                    ),
                    weight: 0.9,
                },
            ))
        }
        ConsensusStrategy::Voting => {
            // Majority vote over equal responses. Each successful index gets a
            // vote count: itself plus every other successful response that
            // compares equal to it. The first index in the largest group wins,
            // so ties break the same way `FirstSuccess` does.
            let mut best_idx = successful[0];
            let mut best_votes = 0usize;
            for &idx in &successful {
                let votes = successful.iter().filter(|&&other| results[other].response == results[idx].response).count();
                if votes > best_votes {
                    best_votes = votes;
                    best_idx = idx;
                }
            }

            if best_votes > 1 {
                Ok((
                    best_idx,
                    Evidence {
                        source: "hybrid_strategy".to_owned(),
                        description: format!("voting consensus: {} of {} responses agreed with {}", best_votes, successful.len(), results[best_idx].model.id),
                        weight: 0.85,
                    },
                ))
            } else {
                // No response has a plurality: every successful response is
                // distinct, so there is nothing to vote on. Falls back to
                // quality_weighted, the sanctioned alternative.
                apply_consensus(results, ConsensusStrategy::QualityWeighted)
            }
        }
    }
}

/// Invoke `judge_fn` with all successful responses and select the winner it
/// names. Falls back to `quality_weighted` consensus when the judge call
/// fails or returns an out-of-range index.
///
/// # Errors
///
/// Returns [`RoutingError::AllParallelFailed`] when every child failed.
///
/// # Panics
///
/// Never panics: every index in `successful_indices` has a `Some` response.
pub async fn judge_responses<R, F, Fut>(results: &[ChildResult<R>], judge_model: &ModelDefinition, judge_fn: F) -> Result<(usize, Evidence), RoutingError>
where
    R: PartialEq,
    F: FnOnce(&ModelDefinition, &[&R]) -> Fut,
    Fut: Future<Output = Result<JudgeVerdict, String>>,
{
    let successful = successful_indices(results);
    if successful.is_empty() {
        return Err(RoutingError::AllParallelFailed { attempted: results.len() });
    }

    if successful.len() == 1 {
        let idx = successful[0];
        return Ok((
            idx,
            Evidence {
                source: "hybrid_strategy".to_owned(),
                description: format!("only response from {}", results[idx].model.id),
                weight: 1.0,
            },
        ));
    }

    let responses: Vec<&R> = successful.iter().map(|&i| results[i].response.as_ref().expect("index from successful_indices")).collect();

    match judge_fn(judge_model, &responses).await {
        Ok(verdict) if verdict.selected_index < successful.len() => {
            let idx = successful[verdict.selected_index];
            Ok((
                idx,
                Evidence {
                    source: "hybrid_strategy".to_owned(),
                    description: format!(
                        "judge model {} selected {} from {} responses: {}",
                        judge_model.id,
                        results[idx].model.id,
                        successful.len(),
                        verdict.rationale
                    ),
                    weight: 0.95,
                },
            ))
        }
        Ok(_) | Err(_) => {
            tracing::warn!(judge = %judge_model.id, "judge call failed or returned an invalid index, falling back to quality-weighted consensus");
            apply_consensus(results, ConsensusStrategy::QualityWeighted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, provider: &str, quality: f64) -> ModelDefinition {
        moe_config::ConfigDocument::parse_toml(&format!(
            r#"
            [[models]]
            id = "{id}"
            provider = "{provider}"
            cost_per_1k_input = 0.001
            cost_per_1k_output = 0.002
            context_window = 100000
            quality_score = {quality}
            "#
        ))
        .expect("valid")
        .models
        .remove(0)
    }

    #[test]
    fn enable_parallel_flag_forces_eligibility() {
        let request = RoutingRequest { enable_parallel: true, ..Default::default() };
        assert!(should_parallelize(&request));
    }

    #[test]
    fn critical_task_type_is_eligible() {
        let request = RoutingRequest { task_type: Some(TaskType::SecurityAudit), ..Default::default() };
        assert!(should_parallelize(&request));
    }

    #[test]
    fn high_quality_with_budget_is_eligible() {
        let request = RoutingRequest { quality_requirement: 0.95, cost_budget: Some(0.1), ..Default::default() };
        assert!(should_parallelize(&request));
        let too_tight = RoutingRequest { quality_requirement: 0.95, cost_budget: Some(0.01), ..Default::default() };
        assert!(!should_parallelize(&too_tight));
    }

    #[test]
    fn general_request_is_not_eligible() {
        let request = RoutingRequest { task_type: Some(TaskType::General), ..Default::default() };
        assert!(!should_parallelize(&request));
    }

    #[test]
    fn select_parallel_set_picks_distinct_providers_first() {
        let available = vec![model("a1", "anthropic", 0.9), model("a2", "anthropic", 0.89), model("o1m", "openai", 0.8), model("g1", "google", 0.7)];
        let request = RoutingRequest::default();
        let selected = select_parallel_set(&request, &available, 2);
        let providers: std::collections::HashSet<_> = selected.iter().map(|m| m.provider).collect();
        assert_eq!(selected.len(), 2);
        assert_eq!(providers.len(), 2);
    }

    #[tokio::test]
    async fn execute_parallel_isolates_failures_and_timeouts() {
        let models = vec![model("fast", "anthropic", 0.9), model("slow", "openai", 0.8), model("erroring", "google", 0.7)];
        let results = execute_parallel(
            &models,
            |m| {
                let id = m.id.clone();
                async move {
                    match id.as_str() {
                        "fast" => Ok("ok".to_owned()),
                        "slow" => {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok("too-late".to_owned())
                        }
                        _ => Err("boom".to_owned()),
                    }
                }
            },
            Duration::from_millis(5),
        )
        .await;

        assert!(results[0].succeeded());
        assert!(!results[1].succeeded());
        assert!(!results[2].succeeded());
    }

    #[test]
    fn apply_consensus_picks_highest_quality() {
        let results = vec![
            ChildResult { model: model("low", "anthropic", 0.7), response: Some("lo"), error: None },
            ChildResult { model: model("high", "google", 0.95), response: Some("hi"), error: None },
            ChildResult { model: model("timed-out", "mistral", 0.99), response: None, error: Some("timeout".to_owned()) },
        ];
        let (idx, evidence) = apply_consensus(&results, ConsensusStrategy::QualityWeighted).unwrap();
        assert_eq!(results[idx].model.id, "high");
        assert!((evidence.weight - 0.9).abs() < 1e-9);
    }

    #[test]
    fn apply_consensus_voting_picks_the_majority_answer() {
        let results = vec![
            ChildResult { model: model("a", "anthropic", 0.7), response: Some("same"), error: None },
            ChildResult { model: model("b", "google", 0.95), response: Some("different"), error: None },
            ChildResult { model: model("c", "mistral", 0.6), response: Some("same"), error: None },
        ];
        let (idx, evidence) = apply_consensus(&results, ConsensusStrategy::Voting).unwrap();
        assert_eq!(results[idx].model.id, "a");
        assert!((evidence.weight - 0.85).abs() < 1e-9);
    }

    #[test]
    fn apply_consensus_voting_falls_back_to_quality_weighted_without_a_majority() {
        let results = vec![
            ChildResult { model: model("low", "anthropic", 0.7), response: Some("one"), error: None },
            ChildResult { model: model("high", "google", 0.95), response: Some("two"), error: None },
        ];
        let (idx, evidence) = apply_consensus(&results, ConsensusStrategy::Voting).unwrap();
        assert_eq!(results[idx].model.id, "high");
        assert!((evidence.weight - 0.9).abs() < 1e-9);
    }

    #[test]
    fn apply_consensus_fails_when_all_fail() {
        let results: Vec<ChildResult<&str>> = vec![ChildResult { model: model("m", "anthropic", 0.5), response: None, error: Some("e".to_owned()) }];
        assert!(matches!(apply_consensus(&results, ConsensusStrategy::FirstSuccess), Err(RoutingError::AllParallelFailed { attempted: 1 })));
    }

    #[tokio::test]
    async fn judge_responses_falls_back_on_failure() {
        let results = vec![
            ChildResult { model: model("low", "anthropic", 0.7), response: Some("lo"), error: None },
            ChildResult { model: model("high", "google", 0.95), response: Some("hi"), error: None },
        ];
        let judge = model("judge", "mistral", 0.99);
        let (idx, evidence) = judge_responses(&results, &judge, |_, _| async { Err("judge unreachable".to_owned()) }).await.unwrap();
        assert_eq!(results[idx].model.id, "high");
        assert!((evidence.weight - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn judge_responses_uses_verdict_index() {
        let results = vec![
            ChildResult { model: model("low", "anthropic", 0.7), response: Some("lo"), error: None },
            ChildResult { model: model("high", "google", 0.95), response: Some("hi"), error: None },
        ];
        let judge = model("judge", "mistral", 0.99);
        let (idx, evidence) = judge_responses(&results, &judge, |_, _| async {
            Ok(JudgeVerdict { selected_index: 0, rationale: "prefer concise answers".to_owned() })
        })
        .await
        .unwrap();
        assert_eq!(results[idx].model.id, "low");
        assert!((evidence.weight - 0.95).abs() < 1e-9);
    }
}
