//! Per-provider circuit breaker.
//!
//! The teacher's `FailoverState` tracks providers as simply up or down; this
//! implements the full closed/open/half_open machine, keeping its
//! `DashMap<String, _>` + `Instant` + `tracing` transition-log idiom.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// The circuit breaker's three states for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// A snapshot of one provider's breaker state, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub failure_count: u32,
    pub success_count: u32,
}

#[derive(Debug)]
struct Entry {
    state: State,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            state: State::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }
}

/// Per-provider failure-isolation state machine.
///
/// `failure_threshold` consecutive failures trip a provider from `closed`
/// to `open`; after `open_duration` the next availability check moves it to
/// `half_open`; `half_open_success_required` consecutive successes from
/// `half_open` close it again, any failure reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    entries: DashMap<String, Entry>,
    failure_threshold: u32,
    open_duration: Duration,
    half_open_success_required: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60), 2)
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, open_duration: Duration, half_open_success_required: u32) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold,
            open_duration,
            half_open_success_required,
        }
    }

    /// Whether `provider` currently admits candidates.
    ///
    /// Side-effect-free except for the time-based `open` -> `half_open`
    /// transition.
    #[must_use]
    pub fn is_available(&self, provider: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(provider) else {
            return true;
        };

        if entry.state == State::Open
            && let Some(opened_at) = entry.opened_at
            && opened_at.elapsed() >= self.open_duration
        {
            tracing::info!(provider, "circuit breaker open duration elapsed, probing");
            entry.state = State::HalfOpen;
            entry.success_count = 0;
        }

        entry.state != State::Open
    }

    pub fn record_success(&self, provider: &str) {
        let mut entry = self.entries.entry(provider.to_owned()).or_default();
        match entry.state {
            State::Closed => {
                entry.failure_count = 0;
            }
            State::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= self.half_open_success_required {
                    tracing::info!(provider, "circuit breaker closing after successful probes");
                    entry.state = State::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    entry.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let mut entry = self.entries.entry(provider.to_owned()).or_default();
        match entry.state {
            State::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.failure_threshold {
                    tracing::warn!(provider, failures = entry.failure_count, "circuit breaker opening");
                    entry.state = State::Open;
                    entry.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                tracing::warn!(provider, "probe failed, circuit breaker reopening");
                entry.state = State::Open;
                entry.opened_at = Some(Instant::now());
                entry.success_count = 0;
            }
            State::Open => {}
        }
    }

    /// Per-provider state snapshot, for observability.
    #[must_use]
    pub fn snapshot(&self) -> std::collections::HashMap<String, Snapshot> {
        self.entries
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    Snapshot {
                        state: entry.state,
                        failure_count: entry.failure_count,
                        success_count: entry.success_count,
                    },
                )
            })
            .collect()
    }

    /// Force a provider back to `closed` (operator override).
    pub fn reset(&self, provider: &str) {
        self.entries.remove(provider);
    }
}
