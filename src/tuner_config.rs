//! Tuner configuration and its validation.
//!
//! [`TunerConfig`] is raw input: it may come from a file, the command line or
//! a host program and can hold nonsense. [`TunerConfig::validate`] never fails;
//! every out-of-range tunable is replaced with a safe default and reported as a
//! [`Correction`] so the host can log what happened.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SAFETY_FACTOR: f64 = 0.7;
pub const DEFAULT_MIN_TRIGGER: u32 = 25;
pub const DEFAULT_MAX_TRIGGER: u32 = 500;
pub const DEFAULT_PEAK_THRESHOLD: f64 = 1.5;
/// Collector default growth trigger, also restored on stop.
pub const BASELINE_TRIGGER: u32 = 100;
pub const DEFAULT_FORCED_COLLECTION_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Raw tuner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Hard memory limit in bytes. `None` or `0` means unset.
    #[serde(alias = "memory-hard-limit")]
    pub memory_hard_limit: Option<u64>,

    /// Container limit signal supplied by the host, consulted when no hard
    /// limit is configured.
    #[serde(alias = "container-memory-limit")]
    pub container_memory_limit: Option<u64>,

    /// Trigger value the collector is currently running with, if known.
    #[serde(alias = "initial-trigger")]
    pub initial_trigger: Option<i64>,

    /// Fraction of the hard limit used as the steady-state ceiling, in (0, 1].
    #[serde(alias = "safety-factor")]
    pub safety_factor: f64,

    #[serde(alias = "min-trigger")]
    pub min_trigger: i64,

    #[serde(alias = "max-trigger")]
    pub max_trigger: i64,

    /// Allow a looser ceiling while the live set is far below the safety limit.
    #[serde(alias = "allow-peak-override")]
    pub allow_peak_override: bool,

    /// Multiplier (>= 1.0) applied to the safety limit when the override fires.
    #[serde(alias = "peak-threshold")]
    pub peak_threshold: f64,

    /// Emit adjustment records at info level instead of debug.
    pub debug: bool,

    #[serde(alias = "forced-collection-interval-secs")]
    pub forced_collection_interval_secs: u64,

    /// Poll interval used when the runtime offers no completion notifier.
    #[serde(alias = "poll-interval-secs")]
    pub poll_interval_secs: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            memory_hard_limit: None,
            container_memory_limit: None,
            initial_trigger: None,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            min_trigger: DEFAULT_MIN_TRIGGER as i64,
            max_trigger: DEFAULT_MAX_TRIGGER as i64,
            allow_peak_override: false,
            peak_threshold: DEFAULT_PEAK_THRESHOLD,
            debug: false,
            forced_collection_interval_secs: DEFAULT_FORCED_COLLECTION_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// A tunable that was replaced during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub field: &'static str,
    pub supplied: String,
    pub applied: String,
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} replaced with {}",
            self.field, self.supplied, self.applied
        )
    }
}

/// Configuration after defaulting. Immutable for the lifetime of a tuner.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub safety_factor: f64,
    pub min_trigger: u32,
    pub max_trigger: u32,
    pub allow_peak_override: bool,
    pub peak_threshold: f64,
    pub debug: bool,
    pub forced_collection_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for ValidatedConfig {
    fn default() -> Self {
        TunerConfig::default().validate().0
    }
}

impl TunerConfig {
    /// Applies the defaulting rules and reports every replaced value.
    pub fn validate(&self) -> (ValidatedConfig, Vec<Correction>) {
        let mut corrections = Vec::new();

        let safety_factor = if self.safety_factor > 0.0 && self.safety_factor <= 1.0 {
            self.safety_factor
        } else {
            corrections.push(Correction {
                field: "safety_factor",
                supplied: self.safety_factor.to_string(),
                applied: DEFAULT_SAFETY_FACTOR.to_string(),
            });
            DEFAULT_SAFETY_FACTOR
        };

        let min_trigger = positive_trigger(
            "min_trigger",
            self.min_trigger,
            DEFAULT_MIN_TRIGGER,
            &mut corrections,
        );
        let mut max_trigger = positive_trigger(
            "max_trigger",
            self.max_trigger,
            DEFAULT_MAX_TRIGGER,
            &mut corrections,
        );
        if max_trigger < min_trigger {
            corrections.push(Correction {
                field: "max_trigger",
                supplied: max_trigger.to_string(),
                applied: min_trigger.to_string(),
            });
            max_trigger = min_trigger;
        }

        let peak_threshold = if !self.allow_peak_override {
            1.0
        } else if self.peak_threshold.is_finite() && self.peak_threshold >= 1.0 {
            self.peak_threshold
        } else {
            corrections.push(Correction {
                field: "peak_threshold",
                supplied: self.peak_threshold.to_string(),
                applied: DEFAULT_PEAK_THRESHOLD.to_string(),
            });
            DEFAULT_PEAK_THRESHOLD
        };

        let forced_secs = nonzero_secs(
            "forced_collection_interval_secs",
            self.forced_collection_interval_secs,
            DEFAULT_FORCED_COLLECTION_SECS,
            &mut corrections,
        );
        let poll_secs = nonzero_secs(
            "poll_interval_secs",
            self.poll_interval_secs,
            DEFAULT_POLL_INTERVAL_SECS,
            &mut corrections,
        );

        let validated = ValidatedConfig {
            safety_factor,
            min_trigger,
            max_trigger,
            allow_peak_override: self.allow_peak_override,
            peak_threshold,
            debug: self.debug,
            forced_collection_interval: Duration::from_secs(forced_secs),
            poll_interval: Duration::from_secs(poll_secs),
        };

        (validated, corrections)
    }

    /// Explicit hard limit, with `0` treated as unset.
    pub fn explicit_limit(&self) -> Option<u64> {
        self.memory_hard_limit.filter(|&v| v > 0)
    }

    /// Container limit signal, with `0` treated as absent.
    pub fn container_limit(&self) -> Option<u64> {
        self.container_memory_limit.filter(|&v| v > 0)
    }

    /// Initial knob value; non-positive values are treated as absent.
    pub fn initial_trigger(&self) -> u32 {
        self.initial_trigger
            .filter(|&v| v > 0)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(BASELINE_TRIGGER)
    }
}

fn positive_trigger(
    field: &'static str,
    value: i64,
    default: u32,
    corrections: &mut Vec<Correction>,
) -> u32 {
    if value > 0 {
        u32::try_from(value).unwrap_or(u32::MAX)
    } else {
        corrections.push(Correction {
            field,
            supplied: value.to_string(),
            applied: default.to_string(),
        });
        default
    }
}

fn nonzero_secs(
    field: &'static str,
    value: u64,
    default: u64,
    corrections: &mut Vec<Correction>,
) -> u64 {
    if value > 0 {
        value
    } else {
        corrections.push(Correction {
            field,
            supplied: value.to_string(),
            applied: default.to_string(),
        });
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_no_corrections() {
        let (cfg, corrections) = TunerConfig::default().validate();
        assert!(corrections.is_empty());
        assert_eq!(cfg.safety_factor, 0.7);
        assert_eq!(cfg.min_trigger, 25);
        assert_eq!(cfg.max_trigger, 500);
        assert_eq!(cfg.forced_collection_interval, Duration::from_secs(120));
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_safety_factor_out_of_range() {
        for bad in [0.0, -0.3, 1.01, f64::NAN] {
            let config = TunerConfig {
                safety_factor: bad,
                ..TunerConfig::default()
            };
            let (cfg, corrections) = config.validate();
            assert_eq!(cfg.safety_factor, 0.7, "input {bad}");
            assert_eq!(corrections.len(), 1);
            assert_eq!(corrections[0].field, "safety_factor");
        }

        let config = TunerConfig {
            safety_factor: 1.0,
            ..TunerConfig::default()
        };
        assert_eq!(config.validate().0.safety_factor, 1.0);
    }

    #[test]
    fn test_non_positive_trigger_bounds() {
        let config = TunerConfig {
            min_trigger: 0,
            max_trigger: -10,
            ..TunerConfig::default()
        };
        let (cfg, corrections) = config.validate();
        assert_eq!(cfg.min_trigger, 25);
        assert_eq!(cfg.max_trigger, 500);
        assert_eq!(corrections.len(), 2);
    }

    #[test]
    fn test_inverted_bounds_collapse_to_min() {
        let config = TunerConfig {
            min_trigger: 300,
            max_trigger: 200,
            ..TunerConfig::default()
        };
        let (cfg, corrections) = config.validate();
        assert_eq!(cfg.min_trigger, 300);
        assert_eq!(cfg.max_trigger, 300);
        assert_eq!(corrections[0].field, "max_trigger");
    }

    #[test]
    fn test_peak_threshold_forced_to_one_without_override() {
        let config = TunerConfig {
            allow_peak_override: false,
            peak_threshold: 3.0,
            ..TunerConfig::default()
        };
        let (cfg, corrections) = config.validate();
        assert_eq!(cfg.peak_threshold, 1.0);
        assert!(corrections.is_empty());
    }

    #[test]
    fn test_peak_threshold_below_one_with_override() {
        let config = TunerConfig {
            allow_peak_override: true,
            peak_threshold: 0.8,
            ..TunerConfig::default()
        };
        let (cfg, corrections) = config.validate();
        assert_eq!(cfg.peak_threshold, 1.5);
        assert_eq!(corrections[0].to_string(), "peak_threshold: 0.8 replaced with 1.5");

        let config = TunerConfig {
            allow_peak_override: true,
            peak_threshold: 2.0,
            ..TunerConfig::default()
        };
        assert_eq!(config.validate().0.peak_threshold, 2.0);
    }

    #[test]
    fn test_zero_intervals_are_defaulted() {
        let config = TunerConfig {
            forced_collection_interval_secs: 0,
            poll_interval_secs: 0,
            ..TunerConfig::default()
        };
        let (cfg, corrections) = config.validate();
        assert_eq!(cfg.forced_collection_interval, Duration::from_secs(120));
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(corrections.len(), 2);
    }

    #[test]
    fn test_external_signals() {
        let config = TunerConfig {
            memory_hard_limit: Some(0),
            container_memory_limit: Some(0),
            initial_trigger: Some(-1),
            ..TunerConfig::default()
        };
        assert_eq!(config.explicit_limit(), None);
        assert_eq!(config.container_limit(), None);
        assert_eq!(config.initial_trigger(), 100);

        let config = TunerConfig {
            initial_trigger: Some(80),
            ..TunerConfig::default()
        };
        assert_eq!(config.initial_trigger(), 80);
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = "safety_factor: 0.5\nallow-peak-override: true\n";
        let config: TunerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.safety_factor, 0.5);
        assert!(config.allow_peak_override);
        assert_eq!(config.min_trigger, 25);
        assert_eq!(config.peak_threshold, 1.5);
    }
}
