//! Learning loop: feedback-driven model weights and A/B testing.
//!
//! Grounded on `learning_loop.py`'s `LearningLoop`: an exponential moving
//! average per (model, task_type) key, plus a registry of two-armed A/B
//! tests with a 5%-improvement winner rule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

use crate::types::{FeedbackData, Outcome, TaskType};

/// Learning rate for the weight exponential moving average.
const ALPHA: f64 = 0.1;

/// `score += bonus` when a model's output shipped as a merged PR.
const PR_MERGED_BONUS: f64 = 0.2;

/// `score += penalty` (i.e. a reduction) when a model's output was reverted.
const PR_REVERTED_PENALTY: f64 = -0.5;

const fn outcome_base(outcome: Outcome) -> f64 {
    match outcome {
        Outcome::Success => 1.0,
        Outcome::Partial => 0.5,
        Outcome::Failure => 0.0,
    }
}

/// Normalize a single piece of feedback into a `[0, 1]` score: outcome,
/// blended with quality, PR disposition and user rating when present.
#[must_use]
pub fn feedback_score(feedback: &FeedbackData) -> f64 {
    let mut score = outcome_base(feedback.outcome);

    if let Some(quality) = feedback.quality_score {
        score = f64::midpoint(score, quality);
    }

    if feedback.pr_merged {
        score += PR_MERGED_BONUS;
    }
    if feedback.pr_reverted {
        score += PR_REVERTED_PENALTY;
    }

    if let Some(rating) = feedback.user_rating {
        let rating_score = f64::from(rating.saturating_sub(1)) / 4.0;
        score = f64::midpoint(score, rating_score);
    }

    score.clamp(0.0, 1.0)
}

/// A running two-armed A/B test.
struct AbTest {
    model_a: String,
    model_b: String,
    task_type: TaskType,
    traffic_split: f64,
    min_samples: usize,
    duration: Duration,
    started_at: Instant,
    results_a: Vec<FeedbackData>,
    results_b: Vec<FeedbackData>,
}

impl AbTest {
    fn is_active(&self) -> bool {
        self.started_at.elapsed() < self.duration
    }
}

/// Per-variant summary statistics for an A/B test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantStats {
    pub samples: usize,
    pub avg_score: f64,
    pub success_rate: f64,
    pub avg_cost: Option<f64>,
    pub avg_quality: Option<f64>,
}

fn variant_stats(results: &[FeedbackData]) -> VariantStats {
    if results.is_empty() {
        return VariantStats::default();
    }

    let samples = results.len();
    let avg_score = results.iter().map(feedback_score).sum::<f64>() / samples as f64;
    let successes = results.iter().filter(|r| r.outcome == Outcome::Success).count();
    let success_rate = successes as f64 / samples as f64;

    let costs: Vec<f64> = results.iter().filter_map(|r| r.actual_cost).collect();
    let avg_cost = (!costs.is_empty()).then(|| costs.iter().sum::<f64>() / costs.len() as f64);

    let qualities: Vec<f64> = results.iter().filter_map(|r| r.quality_score).collect();
    let avg_quality = (!qualities.is_empty()).then(|| qualities.iter().sum::<f64>() / qualities.len() as f64);

    VariantStats { samples, avg_score, success_rate, avg_cost, avg_quality }
}

/// The outcome of comparing an A/B test's two variants.
#[derive(Debug, Clone)]
pub struct AbTestAnalysis {
    pub model_a: String,
    pub model_b: String,
    pub task_type: TaskType,
    pub active: bool,
    pub variant_a: VariantStats,
    pub variant_b: VariantStats,
    pub winner: Option<String>,
    pub confidence: Option<f64>,
    pub recommendation: String,
}

/// Manages learned per-(model, task_type) weights and A/B tests.
///
/// `model_weights` and `ab_tests` are independently lock-free
/// (`DashMap`), matching the tracker's sharded-map idiom.
#[derive(Default)]
pub struct LearningLoop {
    model_weights: DashMap<(String, TaskType), f64>,
    ab_tests: DashMap<String, AbTest>,
    next_test_id: AtomicU64,
}

impl LearningLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the learned weight for `feedback`'s (model, task_type) key and
    /// fold the sample into any active A/B test it matches. Returns the new
    /// weight.
    pub fn record_feedback(&self, feedback: &FeedbackData) -> f64 {
        let key = (feedback.model_id.clone(), feedback.task_type);
        let score = feedback_score(feedback);

        let mut weight = self.model_weights.entry(key).or_insert(0.5);
        let previous = *weight;
        let updated = (ALPHA * score + (1.0 - ALPHA) * previous).clamp(0.0, 1.0);
        *weight = updated;
        drop(weight);

        for mut test in self.ab_tests.iter_mut() {
            if test.task_type != feedback.task_type {
                continue;
            }
            if feedback.model_id == test.model_a {
                test.results_a.push(feedback.clone());
            } else if feedback.model_id == test.model_b {
                test.results_b.push(feedback.clone());
            }
        }

        tracing::debug!(model = %feedback.model_id, task_type = ?feedback.task_type, previous, updated, "updated learned weight");
        updated
    }

    /// The learned weight for a (model, task_type) key, or the neutral
    /// `0.5` default if no feedback has been recorded yet.
    #[must_use]
    pub fn model_weight(&self, model_id: &str, task_type: TaskType) -> f64 {
        self.model_weights.get(&(model_id.to_owned(), task_type)).map_or(0.5, |w| *w)
    }

    /// Register a new two-armed A/B test and return its id.
    pub fn start_ab_test(&self, model_a: impl Into<String>, model_b: impl Into<String>, task_type: TaskType, traffic_split: f64, min_samples: usize, duration: Duration) -> String {
        let model_a = model_a.into();
        let model_b = model_b.into();
        let n = self.next_test_id.fetch_add(1, Ordering::Relaxed);
        let test_id = format!("ab_{model_a}_vs_{model_b}_{task_type:?}_{n}");

        tracing::info!(test_id, model_a, model_b, task_type = ?task_type, traffic_split, "started A/B test");

        self.ab_tests.insert(
            test_id.clone(),
            AbTest {
                model_a,
                model_b,
                task_type,
                traffic_split,
                min_samples,
                duration,
                started_at: Instant::now(),
                results_a: Vec::new(),
                results_b: Vec::new(),
            },
        );

        test_id
    }

    /// Pick a model for `task_type` via the first active A/B test, or
    /// `default_model` if none applies.
    #[must_use]
    pub fn assign_arm(&self, task_type: TaskType, default_model: &str) -> String {
        let Some(test) = self.ab_tests.iter().find(|t| t.task_type == task_type && t.is_active()) else {
            return default_model.to_owned();
        };

        if rand::rng().random::<f64>() < test.traffic_split {
            test.model_a.clone()
        } else {
            test.model_b.clone()
        }
    }

    /// Compare an A/B test's two variants. A winner is declared only when
    /// both arms have reached `min_samples` and one arm's average score
    /// beats the other's by more than 5%.
    #[must_use]
    pub fn analyze_ab_test(&self, test_id: &str) -> Option<AbTestAnalysis> {
        let test = self.ab_tests.get(test_id)?;

        let stats_a = variant_stats(&test.results_a);
        let stats_b = variant_stats(&test.results_b);

        let enough_samples = test.results_a.len() >= test.min_samples && test.results_b.len() >= test.min_samples;

        let (winner, confidence) = if enough_samples && stats_a.avg_score > stats_b.avg_score * 1.05 {
            (Some(test.model_a.clone()), Some((stats_a.avg_score - stats_b.avg_score) / stats_b.avg_score))
        } else if enough_samples && stats_b.avg_score > stats_a.avg_score * 1.05 {
            (Some(test.model_b.clone()), Some((stats_b.avg_score - stats_a.avg_score) / stats_a.avg_score))
        } else {
            (None, None)
        };

        let recommendation = match &winner {
            Some(model) => {
                let (winner_stats, loser_stats) = if *model == test.model_a { (&stats_a, &stats_b) } else { (&stats_b, &stats_a) };
                let improvement = (winner_stats.avg_score - loser_stats.avg_score) / loser_stats.avg_score;
                format!("use {model} - shows {:.1}% improvement (score: {:.4} vs {:.4})", improvement * 100.0, winner_stats.avg_score, loser_stats.avg_score)
            }
            None if !enough_samples => "insufficient data - continue test".to_owned(),
            None => "no clear winner - results are statistically similar".to_owned(),
        };

        Some(AbTestAnalysis {
            model_a: test.model_a.clone(),
            model_b: test.model_b.clone(),
            task_type: test.task_type,
            active: test.is_active(),
            variant_a: stats_a,
            variant_b: stats_b,
            winner,
            confidence,
            recommendation,
        })
    }

    /// All learned weights, for export/observability.
    #[must_use]
    pub fn export_weights(&self) -> HashMap<(String, TaskType), f64> {
        self.model_weights.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    /// Reset learned weights matching an optional (model, task_type)
    /// filter back to the neutral `0.5`; `None, None` clears everything.
    pub fn reset(&self, model_id: Option<&str>, task_type: Option<TaskType>) {
        if model_id.is_none() && task_type.is_none() {
            self.model_weights.clear();
            return;
        }

        for mut entry in self.model_weights.iter_mut() {
            let (id, t) = entry.key().clone();
            if model_id.is_none_or(|m| m == id) && task_type.is_none_or(|t2| t2 == t) {
                *entry.value_mut() = 0.5;
            }
        }
    }
}
