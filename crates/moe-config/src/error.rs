use thiserror::Error;

/// Failures raised while parsing or validating a configuration document.
///
/// A broken document is always recoverable: the router falls back to an
/// empty registry and continues (see [`crate::load_or_empty`]).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration document: {0}")]
    Parse(String),
    #[error("duplicate model id: {id}")]
    DuplicateId { id: String },
    #[error("model {id} has quality_score {quality} out of range [0,1]")]
    QualityOutOfRange { id: String, quality: f64 },
    #[error("model {id} has negative cost_per_1k_{kind}: {value}")]
    NegativeCost {
        id: String,
        kind: &'static str,
        value: f64,
    },
    #[error("model {id} has zero context_window")]
    ZeroContextWindow { id: String },
}
