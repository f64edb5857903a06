//! Telemetry for the model router.
//!
//! Grounded on `synapse_telemetry::init`, scoped down to a library: no OTLP
//! exporters, no resource/metadata builder — just the `tracing-subscriber`
//! fmt layer, plus a small [`TelemetrySink`] trait the router's caller can
//! inject to observe selections, breaker transitions, and A/B samples.

use moe_router::{BreakerState, Decision};

/// Observes router events. Implementations must never block or panic — a
/// telemetry failure must not affect a selection or a feedback call.
pub trait TelemetrySink: Send + Sync {
    /// A `select_model` call completed with `decision`.
    fn record_selection(&self, decision: &Decision);

    /// A provider's circuit breaker changed state.
    fn record_breaker_transition(&self, provider: &str, from: BreakerState, to: BreakerState);

    /// An A/B test recorded a new sample for one of its arms.
    fn record_ab_sample(&self, test_id: &str, arm_model_id: &str);
}

/// Default sink: every event becomes a single structured `tracing` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_selection(&self, decision: &Decision) {
        tracing::info!(
            selected_model = %decision.selected_model,
            strategy = ?decision.routing_strategy,
            estimated_cost = decision.estimated_cost,
            confidence = decision.confidence,
            "router selection"
        );
    }

    fn record_breaker_transition(&self, provider: &str, from: BreakerState, to: BreakerState) {
        tracing::warn!(provider, from = from.as_str(), to = to.as_str(), "circuit breaker transition");
    }

    fn record_ab_sample(&self, test_id: &str, arm_model_id: &str) {
        tracing::debug!(test_id, arm_model_id, "A/B test sample recorded");
    }
}

/// Initialize a `tracing-subscriber` fmt layer filtered by `log_filter`
/// (an `EnvFilter` directive string, e.g. `"info"` or `"moe_router=debug"`).
///
/// Intended for binaries embedding the router; library code should never
/// call this itself.
pub fn init_fmt_subscriber(log_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
