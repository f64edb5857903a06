//! Read-only view over the loaded model definitions.

use moe_config::ModelDefinition;

use crate::types::TaskType;

/// Immutable, load-once registry of model definitions and task preferences.
///
/// Mirrors the shape of `synapse_routing::registry::ModelRegistry`: owned
/// `Vec` behind shared references, lock-free reads, sorted-view helpers.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDefinition>,
    task_preferences: std::collections::HashMap<TaskType, Vec<String>>,
}

impl ModelRegistry {
    #[must_use]
    pub const fn new(models: Vec<ModelDefinition>, task_preferences: std::collections::HashMap<TaskType, Vec<String>>) -> Self {
        Self { models, task_preferences }
    }

    /// Build a registry from a parsed configuration document.
    #[must_use]
    pub fn from_document(document: &moe_config::ConfigDocument) -> Self {
        let models = document.models.clone();
        let task_preferences = document
            .task_preferences
            .iter()
            .filter_map(|(task, pref)| parse_task_type(task).map(|t| (t, pref.preferred.clone())))
            .collect();
        Self { models, task_preferences }
    }

    /// All loaded model definitions, in load order.
    #[must_use]
    pub fn all(&self) -> &[ModelDefinition] {
        &self.models
    }

    /// Find a model definition by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.id == id)
    }

    /// The ordered list of preferred model ids for a task type, if any were
    /// configured.
    #[must_use]
    pub fn task_preferences(&self, task_type: TaskType) -> Option<&[String]> {
        self.task_preferences.get(&task_type).map(Vec::as_slice)
    }

    /// Whether `model_id` appears in `task_type`'s preference list.
    #[must_use]
    pub fn is_preferred(&self, task_type: TaskType, model_id: &str) -> bool {
        self.task_preferences(task_type)
            .is_some_and(|preferred| preferred.iter().any(|id| id == model_id))
    }

    /// Definitions sorted by quality, highest first.
    #[must_use]
    pub fn by_quality(&self) -> Vec<&ModelDefinition> {
        let mut sorted: Vec<&ModelDefinition> = self.models.iter().collect();
        sorted.sort_by(|a, b| b.quality_score.partial_cmp(&a.quality_score).unwrap_or(std::cmp::Ordering::Equal));
        sorted
    }
}

fn parse_task_type(s: &str) -> Option<TaskType> {
    match s {
        "code_generation" => Some(TaskType::CodeGeneration),
        "code_review" => Some(TaskType::CodeReview),
        "planning" => Some(TaskType::Planning),
        "reasoning" => Some(TaskType::Reasoning),
        "security_audit" => Some(TaskType::SecurityAudit),
        "documentation" => Some(TaskType::Documentation),
        "tool_use" => Some(TaskType::ToolUse),
        "long_context" => Some(TaskType::LongContext),
        "general" => Some(TaskType::General),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> moe_config::ConfigDocument {
        moe_config::ConfigDocument::parse_toml(
            r#"
            [[models]]
            id = "claude-3-opus"
            provider = "anthropic"
            cost_per_1k_input = 0.015
            cost_per_1k_output = 0.075
            context_window = 200000
            quality_score = 0.95

            [[models]]
            id = "gemini-pro"
            provider = "google"
            cost_per_1k_input = 0.0003
            cost_per_1k_output = 0.0015
            context_window = 32000
            quality_score = 0.78

            [task_preferences.code_generation]
            preferred = ["claude-3-opus"]
            "#,
        )
        .expect("valid document")
    }

    #[test]
    fn finds_by_id() {
        let registry = ModelRegistry::from_document(&document());
        assert_eq!(registry.find("gemini-pro").unwrap().provider.as_str(), "google");
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn reports_task_preferences() {
        let registry = ModelRegistry::from_document(&document());
        assert!(registry.is_preferred(TaskType::CodeGeneration, "claude-3-opus"));
        assert!(!registry.is_preferred(TaskType::CodeGeneration, "gemini-pro"));
        assert!(!registry.is_preferred(TaskType::Planning, "claude-3-opus"));
    }

    #[test]
    fn sorts_by_quality() {
        let registry = ModelRegistry::from_document(&document());
        let sorted = registry.by_quality();
        assert_eq!(sorted[0].id, "claude-3-opus");
    }

    #[test]
    fn empty_registry_has_no_models() {
        let registry = ModelRegistry::default();
        assert!(registry.all().is_empty());
    }
}
