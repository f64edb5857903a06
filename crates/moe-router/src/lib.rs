//! The model router core: registry, cost prediction, performance tracking,
//! circuit breaking, hybrid parallel execution and the learning loop.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::cast_precision_loss,
    clippy::struct_excessive_bools,
    clippy::duration_suboptimal_units,
    clippy::suboptimal_flops
)]

pub mod breaker;
pub mod cost;
pub mod error;
pub mod hybrid;
pub mod learning;
pub mod registry;
pub mod router;
pub mod store;
pub mod tracker;
pub mod types;

pub use breaker::{CircuitBreaker, Snapshot as BreakerSnapshot, State as BreakerState};
pub use cost::{estimate_tokens, predict, CostEstimate};
pub use error::RoutingError;
pub use hybrid::{apply_consensus, execute_parallel, judge_responses, select_judge, select_parallel_set, should_parallelize, ChildResult, ConsensusStrategy, JudgeVerdict};
pub use learning::{feedback_score, AbTestAnalysis, LearningLoop, VariantStats};
pub use registry::ModelRegistry;
pub use router::{Router, RoutingStats, ScoringWeights};
pub use store::{NoopStore, PersistenceStore, StoreError};
pub use tracker::{PerformanceTracker, RecordedOutcome};
pub use types::{Decision, Evidence, FeedbackData, Outcome, RoutingRequest, RoutingStrategy, TaskType};
