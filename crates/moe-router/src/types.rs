//! Request, decision and feedback types shared across the router's modules.

use std::collections::HashMap;

use moe_config::{Capability, Provider};
use serde::{Deserialize, Serialize};

/// The kind of work a routing request is for.
///
/// Drives the hybrid strategy's parallel-eligibility check, the cost
/// predictor's token-estimation table, and task-preference scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeGeneration,
    CodeReview,
    Planning,
    Reasoning,
    SecurityAudit,
    Documentation,
    ToolUse,
    LongContext,
    General,
}

impl TaskType {
    /// Task types that qualify for parallel dispatch regardless of other
    /// eligibility conditions (see §4.5 of the hybrid strategy).
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::SecurityAudit | Self::CodeReview | Self::Planning | Self::Reasoning)
    }
}

/// A single routing request.
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    pub task_type: Option<TaskType>,
    pub task_description: String,
    pub estimated_input_tokens: Option<u32>,
    pub estimated_output_tokens: Option<u32>,
    pub context_size: Option<u32>,
    pub quality_requirement: f64,
    pub cost_budget: Option<f64>,
    pub latency_requirement_ms: Option<u64>,
    pub requires_tools: bool,
    pub requires_vision: bool,
    pub requires_json_mode: bool,
    pub requires_streaming: bool,
    pub vendor_preference: Option<Provider>,
    pub vendor_diversity: bool,
    pub enable_parallel: bool,
    pub metadata: HashMap<String, String>,
}

impl RoutingRequest {
    /// The capability tags this request hard-requires.
    #[must_use]
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::with_capacity(4);
        if self.requires_tools {
            caps.push(Capability::FunctionCalling);
        }
        if self.requires_vision {
            caps.push(Capability::Vision);
        }
        if self.requires_json_mode {
            caps.push(Capability::JsonMode);
        }
        if self.requires_streaming {
            caps.push(Capability::Streaming);
        }
        caps
    }

    /// Whether `metadata["critical"]` is truthy, per the hybrid strategy's
    /// parallel-eligibility rule.
    #[must_use]
    pub fn is_marked_critical(&self) -> bool {
        matches!(
            self.metadata.get("critical").map(String::as_str),
            Some("true" | "1" | "yes")
        )
    }
}

/// A single contributor to a [`Decision`]'s rationale.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub source: String,
    pub description: String,
    pub weight: f64,
}

/// The router's strategy tag for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    Single,
    Parallel,
}

/// The router's output for a single `select_model` call.
#[derive(Debug, Clone)]
pub struct Decision {
    pub selected_model: String,
    pub fallback_models: Vec<String>,
    pub routing_strategy: RoutingStrategy,
    pub parallel_models: Vec<String>,
    pub estimated_cost: f64,
    pub estimated_quality: f64,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub rationale: String,
}

impl Decision {
    /// The reserved decision for "no candidate survived filtering."
    #[must_use]
    pub fn none(rationale: impl Into<String>) -> Self {
        Self {
            selected_model: "none".to_owned(),
            fallback_models: Vec::new(),
            routing_strategy: RoutingStrategy::Single,
            parallel_models: Vec::new(),
            estimated_cost: 0.0,
            estimated_quality: 0.0,
            confidence: 0.0,
            evidence: Vec::new(),
            rationale: rationale.into(),
        }
    }
}

/// The outcome recorded for a completed (or attempted) model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

/// Feedback about a single completed request, consumed by the tracker,
/// circuit breaker and learning loop.
#[derive(Debug, Clone)]
pub struct FeedbackData {
    pub model_id: String,
    pub task_type: TaskType,
    pub outcome: Outcome,
    pub actual_cost: Option<f64>,
    pub actual_latency_ms: Option<u64>,
    pub quality_score: Option<f64>,
    pub user_rating: Option<u8>,
    pub pr_merged: bool,
    pub pr_reverted: bool,
}
