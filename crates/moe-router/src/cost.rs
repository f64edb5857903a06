//! Cost prediction: token estimation and bounded cost forecasting.
//!
//! Pure functions, no state. Grounded on `synapse_routing::analysis`'s
//! cost-forecasting shape, with token estimation following the per-task-type
//! char/ratio table exactly: `input = max(100, chars * ratio_in)`,
//! `output = max(50, input * expansion_ratio)`.

use moe_config::ModelDefinition;

use crate::types::{RoutingRequest, TaskType};

/// `(tokens_per_char_input, expansion_ratio)` used to derive token counts
/// from `task_description` length and `task_type`.
const fn char_ratio_table(task_type: TaskType) -> (f64, f64) {
    match task_type {
        TaskType::CodeGeneration | TaskType::CodeReview => (0.35, 1.5),
        TaskType::Planning | TaskType::Reasoning | TaskType::SecurityAudit => (0.3, 1.2),
        TaskType::Documentation => (0.3, 2.0),
        TaskType::ToolUse => (0.3, 0.8),
        TaskType::LongContext => (0.25, 0.5),
        TaskType::General => (0.25, 1.0),
    }
}

/// Resolved `(input_tokens, output_tokens)` for a request.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_tokens(request: &RoutingRequest) -> (u32, u32) {
    if let (Some(input), Some(output)) = (request.estimated_input_tokens, request.estimated_output_tokens) {
        return (input, output);
    }

    let task_type = request.task_type.unwrap_or(TaskType::General);
    let (ratio_in, expansion_ratio) = char_ratio_table(task_type);
    let chars = request.task_description.chars().count();

    let input = ((chars as f64 * ratio_in) as u32).max(100);
    let output = ((f64::from(input) * expansion_ratio) as u32).max(50);
    (input, output)
}

/// A bounded cost forecast for dispatching a request to one candidate model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub min: f64,
    pub expected: f64,
    pub max: f64,
}

impl CostEstimate {
    /// Whether `expected` fits within an optional budget.
    #[must_use]
    pub fn within_budget(&self, budget: Option<f64>) -> bool {
        budget.is_none_or(|b| self.expected <= b)
    }
}

/// Forecast the cost of dispatching `request` to `model`.
#[must_use]
pub fn predict(model: &ModelDefinition, request: &RoutingRequest) -> CostEstimate {
    let (input_tokens, output_tokens) = estimate_tokens(request);
    let expected = (f64::from(input_tokens) / 1000.0) * model.cost_per_1k_input
        + (f64::from(output_tokens) / 1000.0) * model.cost_per_1k_output;

    let explicit_tokens = request.estimated_input_tokens.is_some() && request.estimated_output_tokens.is_some();
    let (min, max) = if explicit_tokens {
        (expected * 0.9, expected * 1.25)
    } else {
        (expected * 0.5, expected * 2.0)
    };

    CostEstimate { min, expected, max }
}

/// `clamp01(1 / (1 + expected * 10))` — a smooth monotonic decrease in cost.
#[must_use]
pub fn cost_efficiency(expected: f64) -> f64 {
    (1.0 / (1.0 + expected * 10.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(input: f64, output: f64) -> ModelDefinition {
        moe_config::ConfigDocument::parse_toml(&format!(
            r#"
            [[models]]
            id = "m"
            provider = "openai"
            cost_per_1k_input = {input}
            cost_per_1k_output = {output}
            context_window = 100000
            quality_score = 0.8
            "#
        ))
        .expect("valid")
        .models
        .remove(0)
    }

    #[test]
    fn explicit_tokens_use_tighter_bounds() {
        let request = RoutingRequest {
            estimated_input_tokens: Some(500),
            estimated_output_tokens: Some(1000),
            ..Default::default()
        };
        let estimate = predict(&model(0.015, 0.075), &request);
        assert!((estimate.expected - (0.5 * 0.015 + 1.0 * 0.075)).abs() < 1e-9);
        assert!((estimate.min - estimate.expected * 0.9).abs() < 1e-9);
        assert!((estimate.max - estimate.expected * 1.25).abs() < 1e-9);
    }

    #[test]
    fn estimate_tokens_follows_char_ratio_formula() {
        let request = RoutingRequest {
            task_type: Some(TaskType::CodeGeneration),
            task_description: "x".repeat(400),
            ..Default::default()
        };
        let (input, output) = estimate_tokens(&request);
        // CodeGeneration: ratio_in = 0.35, expansion_ratio = 1.5.
        assert_eq!(input, 140);
        assert_eq!(output, 210);
    }

    #[test]
    fn estimate_tokens_enforces_minimums() {
        let request = RoutingRequest { task_type: Some(TaskType::General), task_description: "hi".to_owned(), ..Default::default() };
        let (input, output) = estimate_tokens(&request);
        assert_eq!(input, 100);
        assert_eq!(output, 100);
    }

    #[test]
    fn derived_tokens_use_wider_bounds() {
        let request = RoutingRequest {
            task_type: Some(TaskType::General),
            task_description: "x".repeat(400),
            ..Default::default()
        };
        let estimate = predict(&model(0.01, 0.02), &request);
        assert!((estimate.min - estimate.expected * 0.5).abs() < 1e-9);
        assert!((estimate.max - estimate.expected * 2.0).abs() < 1e-9);
    }

    #[test]
    fn cost_efficiency_decreases_with_cost() {
        assert!(cost_efficiency(0.0) > cost_efficiency(0.01));
        assert!(cost_efficiency(0.01) > cost_efficiency(1.0));
        assert!((cost_efficiency(0.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn within_budget_respects_absent_budget() {
        let estimate = CostEstimate { min: 0.0, expected: 5.0, max: 10.0 };
        assert!(estimate.within_budget(None));
        assert!(!estimate.within_budget(Some(1.0)));
        assert!(estimate.within_budget(Some(5.0)));
    }
}
