use std::collections::HashSet;

use serde::Deserialize;

/// Organization or operator of one or more models; the unit the circuit
/// breaker acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Mistral,
    Cohere,
    Ibm,
    Local,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Mistral => "mistral",
            Self::Cohere => "cohere",
            Self::Ibm => "ibm",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tag drawn from a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    Code,
    Vision,
    JsonMode,
    FunctionCalling,
    LongContext,
    Streaming,
}

/// Immutable model definition, validated once at load and never mutated
/// afterward.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDefinition {
    pub id: String,
    pub provider: Provider,
    #[serde(default)]
    pub capabilities: HashSet<Capability>,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
    pub context_window: u32,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    pub quality_score: f64,
    #[serde(default)]
    pub latency_p50_ms: Option<u64>,
    #[serde(default)]
    pub latency_p95_ms: Option<u64>,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub supports_system_prompt: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}
