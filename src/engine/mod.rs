//! Decision engine: the idle evaluator and the naptime state machine.
//!
//! The engine consumes one merged metric sample per tick and emits a snooze
//! verdict. State is exclusively owned by the control loop; nothing else
//! mutates it.

pub mod idle;

use crate::config::Config;
use crate::monitor::MetricsSample;
use crate::types::Verdict;

/// Engine state across ticks.
///
/// Invariant: `idle_since` is set iff the last tick reported idle; it is
/// cleared atomically with the transition back to `Awake`.
#[derive(Debug, Clone)]
pub struct NaptimeState {
    /// First observation of the current continuous idle stretch.
    pub idle_since: Option<u64>,
    pub last_verdict: Verdict,
    pub last_reason: String,
}

impl Default for NaptimeState {
    fn default() -> Self {
        Self {
            idle_since: None,
            last_verdict: Verdict::Awake,
            last_reason: String::new(),
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
}

/// Idle evaluator + naptime state machine.
pub struct DecisionEngine {
    state: NaptimeState,
    paused: bool,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self {
            state: NaptimeState::default(),
            paused: false,
        }
    }

    /// Advance one tick at time `now` with snapshot `sample`.
    pub fn advance(&mut self, sample: &MetricsSample, config: &Config, now: u64) -> Decision {
        if self.paused {
            // External pause tag: idle ticks are treated as awake.
            return self.go_awake("suspended by external pause tag".to_string());
        }

        if let Some(failure) = idle::first_failure(sample, config) {
            return self.go_awake(failure);
        }

        let idle_since = *self.state.idle_since.get_or_insert(now);
        let idle_for = now.saturating_sub(idle_since);
        crate::telemetry::record_idle_seconds(idle_for);

        let verdict = if idle_for >= config.naptime_seconds() {
            Verdict::ShouldSnooze
        } else {
            Verdict::Idle
        };
        let reason = format!("idle for {}s below thresholds", idle_for);

        self.state.last_verdict = verdict;
        self.state.last_reason = reason.clone();
        Decision { verdict, reason }
    }

    fn go_awake(&mut self, reason: String) -> Decision {
        self.state.idle_since = None;
        self.state.last_verdict = Verdict::Awake;
        self.state.last_reason = reason.clone();
        crate::telemetry::record_idle_seconds(0);
        Decision {
            verdict: Verdict::Awake,
            reason,
        }
    }

    /// Reset to `Awake` after the stop handoff. The next tick re-evaluates
    /// from scratch, which makes transient stop failures safe to retry.
    pub fn reset(&mut self) {
        self.state = NaptimeState::default();
    }

    /// Suspend or resume verdict production (external pause tag).
    pub fn set_paused(&mut self, paused: bool) {
        if paused && !self.paused {
            tracing::info!("engine suspended by external pause tag");
        } else if !paused && self.paused {
            tracing::info!("engine resumed, pause tag cleared");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> &NaptimeState {
        &self.state
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}
