//! Router error types.

use thiserror::Error;

/// Failures the router can surface as `Err`.
///
/// Routine selection never throws: `NoEligibleModel` and friends are
/// encoded as a `Decision` value instead. Only [`ExecuteParallel`] and the
/// judge callback have a genuine failure mode.
///
/// [`ExecuteParallel`]: crate::hybrid::execute_parallel
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Every child call in a parallel dispatch failed or timed out.
    #[error("all {attempted} parallel model calls failed")]
    AllParallelFailed { attempted: usize },

    /// The judge callback failed or returned a malformed result.
    #[error("judge call failed: {0}")]
    JudgeError(String),
}
