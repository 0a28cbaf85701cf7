//! Growth-trigger policy.
//!
//! A collector with growth trigger `T` lets the heap grow to `live * (1 + T/100)`
//! before collecting. Solving that for `T` with a target ceiling gives the
//! largest trigger that keeps the heap under the ceiling if the live set stays
//! constant until the next collection:
//!
//! ```text
//! T = (ceiling / live - 1) * 100
//! ```
//!
//! The functions here are pure so they can be exercised without a runtime.

use crate::tuner_config::{ValidatedConfig, BASELINE_TRIGGER};

/// Below this fraction of the safety limit the peak ceiling may be used.
pub const PEAK_HEADROOM_FRACTION: f64 = 0.5;

/// Ceilings derived from the resolved memory limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ceilings {
    /// Steady-state ceiling: `limit * safety_factor`.
    pub safety_limit: f64,
    /// Override ceiling: `safety_limit * peak_threshold`.
    pub peak_limit: f64,
}

impl Ceilings {
    pub fn new(memory_limit: u64, config: &ValidatedConfig) -> Self {
        let safety_limit = memory_limit as f64 * config.safety_factor;
        Self {
            safety_limit,
            peak_limit: safety_limit * config.peak_threshold,
        }
    }
}

/// Which policy rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyBranch {
    /// No live bytes reported; baseline trigger.
    ColdStart,
    /// Live set above the safety limit; minimum trigger.
    OverBudget,
    /// Plenty of slack; headroom measured against the peak ceiling.
    PeakHeadroom,
    /// Headroom measured against the safety limit.
    SteadyHeadroom,
}

impl PolicyBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyBranch::ColdStart => "cold_start",
            PolicyBranch::OverBudget => "over_budget",
            PolicyBranch::PeakHeadroom => "peak_headroom",
            PolicyBranch::SteadyHeadroom => "steady_headroom",
        }
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub branch: PolicyBranch,
    /// Headroom formula result before clamping (headroom branches only).
    pub unclamped: Option<f64>,
    /// Trigger to apply.
    pub trigger: u32,
}

/// `round((ceiling / live - 1) * 100)`. `live` must be non-zero.
pub fn headroom_trigger(ceiling: f64, live_bytes: u64) -> f64 {
    ((ceiling / live_bytes as f64 - 1.0) * 100.0).round()
}

/// Evaluates the policy rules in order; the first match wins.
pub fn decide(live_bytes: u64, ceilings: &Ceilings, config: &ValidatedConfig) -> Decision {
    if live_bytes == 0 {
        return Decision {
            branch: PolicyBranch::ColdStart,
            unclamped: None,
            trigger: BASELINE_TRIGGER,
        };
    }

    let live = live_bytes as f64;
    if live > ceilings.safety_limit {
        return Decision {
            branch: PolicyBranch::OverBudget,
            unclamped: None,
            trigger: config.min_trigger,
        };
    }

    let (branch, ceiling) = if config.allow_peak_override
        && live < ceilings.safety_limit * PEAK_HEADROOM_FRACTION
    {
        (PolicyBranch::PeakHeadroom, ceilings.peak_limit)
    } else {
        (PolicyBranch::SteadyHeadroom, ceilings.safety_limit)
    };

    let raw = headroom_trigger(ceiling, live_bytes);
    Decision {
        branch,
        unclamped: Some(raw),
        trigger: clamp_trigger(raw, config),
    }
}

fn clamp_trigger(raw: f64, config: &ValidatedConfig) -> u32 {
    let min = config.min_trigger as f64;
    let max = config.max_trigger as f64;
    raw.max(min).min(max) as u32
}

/// Whether `candidate` deviates from `current` by more than 10% of `current`.
///
/// Exact integer form of `|candidate - current| / current > 0.10`, so a change
/// of exactly 10% is "no change".
pub fn exceeds_hysteresis(candidate: u32, current: u32) -> bool {
    let diff = u64::from(candidate.abs_diff(current));
    diff * 10 > u64::from(current)
}
