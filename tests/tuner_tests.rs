//! Integration tests for the adjustment policy and the synchronous tuner API.
//!
//! These tests drive `Tuner::adjust()`, `metrics()` and `stop()` against a
//! scripted runtime whose live heap size is set directly by each test.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use heap_trigger_tuner::policy::{decide, exceeds_hysteresis};
use heap_trigger_tuner::{
    Ceilings, CollectorControl, MemoryOracle, MemorySample, OracleError, PolicyBranch,
    RuntimeHooks, Tuner, TunerConfig,
};

const MB: u64 = 1024 * 1024;

/// Runtime whose heap statistics are set by the test.
#[derive(Default)]
struct ScriptedRuntime {
    live: AtomicU64,
    cycles: AtomicU64,
    offline: AtomicBool,
    writes: Mutex<Vec<u32>>,
}

impl ScriptedRuntime {
    fn set_live(&self, bytes: u64) {
        self.live.store(bytes, Ordering::SeqCst);
    }

    fn writes(&self) -> Vec<u32> {
        self.writes.lock().unwrap().clone()
    }
}

impl MemoryOracle for ScriptedRuntime {
    fn sample(&self) -> Result<MemorySample, OracleError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(OracleError::Unavailable("scripted runtime offline".into()));
        }
        Ok(MemorySample {
            live_bytes: self.live.load(Ordering::SeqCst),
            object_count: 42,
            cycle_count: self.cycles.load(Ordering::SeqCst),
            reserved_bytes: 1024 * MB,
        })
    }
}

impl CollectorControl for ScriptedRuntime {
    fn set_growth_trigger(&self, percent: u32) {
        self.writes.lock().unwrap().push(percent);
    }

    fn force_collection(&self) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }
}

/// Helper function for the 500MB / 0.7 / peak override setup.
fn budget_500mb() -> TunerConfig {
    TunerConfig {
        memory_hard_limit: Some(500 * MB),
        allow_peak_override: true,
        ..TunerConfig::default()
    }
}

fn tuner(config: &TunerConfig) -> (Arc<ScriptedRuntime>, Tuner) {
    let runtime = Arc::new(ScriptedRuntime::default());
    let tuner = Tuner::new(config, RuntimeHooks::new(runtime.clone(), runtime.clone())).unwrap();
    (runtime, tuner)
}

#[test]
fn test_worked_example_peak_headroom() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(100 * MB);

    assert_eq!(tuner.adjust(), Some(425));
    assert_eq!(tuner.current_trigger(), 425);
    assert_eq!(runtime.writes(), vec![425]);
}

#[test]
fn test_worked_example_over_budget() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(400 * MB);

    assert_eq!(tuner.adjust(), Some(25));
    assert_eq!(runtime.writes(), vec![25]);
}

#[test]
fn test_empty_heap_returns_baseline() {
    let config = TunerConfig {
        initial_trigger: Some(200),
        ..budget_500mb()
    };
    let (runtime, tuner) = tuner(&config);
    runtime.set_live(0);

    assert_eq!(tuner.adjust(), Some(100));

    // Baseline is not clamped even when it sits outside the bounds
    let validated = TunerConfig {
        min_trigger: 150,
        max_trigger: 300,
        ..budget_500mb()
    }
    .validate()
    .0;
    let decision = decide(0, &Ceilings::new(500 * MB, &validated), &validated);
    assert_eq!(decision.trigger, 100);
    assert_eq!(decision.branch, PolicyBranch::ColdStart);
}

#[test]
fn test_over_budget_is_exactly_min_trigger() {
    let config = TunerConfig {
        min_trigger: 40,
        ..budget_500mb()
    };
    let (runtime, tuner) = tuner(&config);
    for live in [351 * MB, 500 * MB, 2048 * MB] {
        runtime.set_live(live);
        tuner.adjust();
        assert_eq!(tuner.current_trigger(), 40, "live {}MB", live / MB);
    }
}

#[test]
fn test_results_stay_within_bounds() {
    let config = TunerConfig {
        min_trigger: 50,
        max_trigger: 300,
        ..budget_500mb()
    };
    let (runtime, tuner) = tuner(&config);
    for live_mb in [1, 10, 60, 120, 200, 340, 349, 350, 360, 900] {
        runtime.set_live(live_mb * MB);
        tuner.adjust();
        let trigger = tuner.current_trigger();
        assert!(
            (50..=300).contains(&trigger),
            "live {}MB gave trigger {}",
            live_mb,
            trigger
        );
    }
}

#[test]
fn test_peak_override_widens_headroom() {
    let without = TunerConfig {
        memory_hard_limit: Some(500 * MB),
        max_trigger: 10_000,
        ..TunerConfig::default()
    }
    .validate()
    .0;
    let with = TunerConfig {
        allow_peak_override: true,
        ..TunerConfig {
            memory_hard_limit: Some(500 * MB),
            max_trigger: 10_000,
            ..TunerConfig::default()
        }
    }
    .validate()
    .0;

    let plain = decide(100 * MB, &Ceilings::new(500 * MB, &without), &without);
    let widened = decide(100 * MB, &Ceilings::new(500 * MB, &with), &with);
    assert_eq!(plain.branch, PolicyBranch::SteadyHeadroom);
    assert_eq!(widened.branch, PolicyBranch::PeakHeadroom);
    assert!(widened.unclamped.unwrap() >= plain.unclamped.unwrap());
    assert_eq!(plain.trigger, 250);
    assert_eq!(widened.trigger, 425);
}

#[test]
fn test_exactly_ten_percent_is_no_change() {
    // safety ceiling 2100 bytes: live 1000 -> 110, live 995 -> 111
    let config = TunerConfig {
        memory_hard_limit: Some(2100),
        safety_factor: 1.0,
        initial_trigger: Some(100),
        ..TunerConfig::default()
    };
    let (runtime, tuner) = tuner(&config);

    runtime.set_live(1000);
    assert_eq!(tuner.adjust(), None);
    assert_eq!(tuner.current_trigger(), 100);
    assert!(runtime.writes().is_empty());

    runtime.set_live(995);
    assert_eq!(tuner.adjust(), Some(111));

    assert!(!exceeds_hysteresis(90, 100));
    assert!(exceeds_hysteresis(89, 100));
}

#[test]
fn test_small_drift_is_ignored() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(100 * MB);
    assert_eq!(tuner.adjust(), Some(425));

    // 105MB -> 400, within 10% of 425
    runtime.set_live(105 * MB);
    assert_eq!(tuner.adjust(), None);
    assert_eq!(tuner.current_trigger(), 425);
    assert_eq!(tuner.metrics().unwrap().adjustments, 1);
}

#[test]
fn test_metrics_snapshot() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(125 * MB);
    tuner.adjust();

    let first = tuner.metrics().unwrap();
    let second = tuner.metrics().unwrap();
    assert_eq!(first, second);

    assert_eq!(first.memory_limit_bytes, 500 * MB);
    assert_eq!(first.heap_live_bytes, 125 * MB);
    assert_eq!(first.heap_objects, 42);
    assert_eq!(first.memory_usage_ratio, 0.25);
    assert_eq!(first.safety_factor, 0.7);
    assert!(first.enabled);
    assert_eq!(first.current_trigger, tuner.current_trigger());
}

#[test]
fn test_stop_restores_baseline_once() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(100 * MB);
    tuner.adjust();

    tuner.stop();
    assert_eq!(runtime.writes(), vec![425, 100]);
    assert_eq!(tuner.current_trigger(), 100);
    assert!(!tuner.metrics().unwrap().enabled);

    tuner.stop();
    assert_eq!(runtime.writes(), vec![425, 100]);
}

#[test]
fn test_stopped_tuner_refuses_adjustment() {
    let (runtime, tuner) = tuner(&budget_500mb());
    tuner.stop();

    runtime.set_live(400 * MB);
    assert_eq!(tuner.adjust(), None);
    assert_eq!(runtime.writes(), vec![100]);
}

#[test]
fn test_oracle_outage_skips_rounds() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(100 * MB);
    runtime.offline.store(true, Ordering::SeqCst);

    assert_eq!(tuner.adjust(), None);
    assert!(tuner.metrics().is_err());

    runtime.offline.store(false, Ordering::SeqCst);
    assert_eq!(tuner.adjust(), Some(425));
}

#[test]
fn test_corrected_tunables_still_construct() {
    let config = TunerConfig {
        memory_hard_limit: Some(500 * MB),
        safety_factor: 3.0,
        min_trigger: 400,
        max_trigger: 100,
        ..TunerConfig::default()
    };
    let (runtime, tuner) = tuner(&config);
    assert_eq!(tuner.config().safety_factor, 0.7);
    assert_eq!(tuner.config().max_trigger, 400);

    runtime.set_live(100 * MB);
    assert_eq!(tuner.adjust(), Some(400));
}

#[test]
fn test_concurrent_adjustments_are_serialised() {
    let (runtime, tuner) = tuner(&budget_500mb());
    runtime.set_live(100 * MB);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tuner = tuner.clone();
            thread::spawn(move || tuner.adjust())
        })
        .collect();
    let applied: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(applied, vec![425]);
    assert_eq!(runtime.writes(), vec![425]);
    assert_eq!(tuner.metrics().unwrap().adjustments, 1);
}
