use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::model::ModelDefinition;

/// Soft preference bias for a task type: an ordered list of preferred model
/// ids, used in scoring rather than filtering.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPreference {
    #[serde(default)]
    pub preferred: Vec<String>,
}

/// The configuration document's two top-level keys: `models` and
/// `task_preferences`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
    #[serde(default)]
    pub task_preferences: HashMap<String, TaskPreference>,
}

impl ConfigDocument {
    /// Parse and validate a configuration document from TOML source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML (including an unknown
    /// provider or capability tag, both rejected at the `serde` layer) or a
    /// validation failure: duplicate id, out-of-range quality, negative
    /// cost, or a zero context window.
    pub fn parse_toml(source: &str) -> Result<Self, ConfigError> {
        let document: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Load and validate a configuration document from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file cannot be read, in
    /// addition to the failures of [`Self::parse_toml`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("failed to read {}: {e}", path.display())))?;
        Self::parse_toml(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::with_capacity(self.models.len());
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(ConfigError::DuplicateId { id: model.id.clone() });
            }
            if !(0.0..=1.0).contains(&model.quality_score) {
                return Err(ConfigError::QualityOutOfRange {
                    id: model.id.clone(),
                    quality: model.quality_score,
                });
            }
            if model.cost_per_1k_input < 0.0 {
                return Err(ConfigError::NegativeCost {
                    id: model.id.clone(),
                    kind: "input",
                    value: model.cost_per_1k_input,
                });
            }
            if model.cost_per_1k_output < 0.0 {
                return Err(ConfigError::NegativeCost {
                    id: model.id.clone(),
                    kind: "output",
                    value: model.cost_per_1k_output,
                });
            }
            if model.context_window == 0 {
                return Err(ConfigError::ZeroContextWindow { id: model.id.clone() });
            }
        }
        Ok(())
    }
}

/// Load a document, falling back to an empty one on any failure.
///
/// A missing or malformed document yields an empty registry rather than a
/// crash; the router then returns `"none"` decisions with a rationale
/// explaining the configuration failure.
#[must_use]
pub fn load_or_empty(path: &Path) -> ConfigDocument {
    match ConfigDocument::load(path) {
        Ok(document) => document,
        Err(error) => {
            warn!(%error, path = %path.display(), "failed to load configuration document, starting with an empty registry");
            ConfigDocument::default()
        }
    }
}
