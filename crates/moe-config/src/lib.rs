//! Configuration document types and loader for the model router.
//!
//! Owns the external, open-world configuration schema: model definitions
//! and task preferences. Nothing here is mutated after load.

mod document;
mod error;
mod model;

pub use document::{ConfigDocument, TaskPreference, load_or_empty};
pub use error::ConfigError;
pub use model::{Capability, ModelDefinition, Provider};
