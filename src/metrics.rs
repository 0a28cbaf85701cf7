//! Tuner metrics snapshot and its Prometheus representation.
//!
//! [`TunerMetrics`] is what `Tuner::metrics()` returns. [`TunerGauges`] mirrors
//! a snapshot into a caller-owned Prometheus registry; exposing that registry
//! (HTTP, push gateway, ...) is left to the host.

use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use serde::Serialize;

/// Point-in-time view of the tuner and the heap it controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerMetrics {
    pub current_trigger: u32,
    pub memory_limit_bytes: u64,
    pub heap_live_bytes: u64,
    pub heap_objects: u64,
    pub gc_cycles: u64,
    /// `heap_live_bytes / memory_limit_bytes`, 0 when no limit is known.
    pub memory_usage_ratio: f64,
    pub safety_factor: f64,
    pub enabled: bool,
    /// Number of trigger changes applied so far.
    pub adjustments: u64,
}

/// Prometheus gauges fed from [`TunerMetrics`] snapshots.
#[derive(Clone)]
pub struct TunerGauges {
    pub current_trigger: Gauge,
    pub memory_limit_bytes: Gauge,
    pub heap_live_bytes: Gauge,
    pub heap_objects: Gauge,
    pub gc_cycles: Gauge,
    pub memory_usage_ratio: Gauge,
    pub safety_factor: Gauge,
    pub enabled: Gauge,
    pub adjustments: Gauge,
}

impl TunerGauges {
    /// Creates and registers all tuner gauges with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let current_trigger = Gauge::new(
            "gctuner_current_trigger_percent",
            "Growth-trigger percentage last written to the collector",
        )?;
        let memory_limit_bytes = Gauge::new(
            "gctuner_memory_limit_bytes",
            "Resolved memory hard limit in bytes",
        )?;
        let heap_live_bytes = Gauge::new(
            "gctuner_heap_live_bytes",
            "Bytes allocated on the managed heap",
        )?;
        let heap_objects = Gauge::new("gctuner_heap_objects", "Objects on the managed heap")?;
        let gc_cycles = Gauge::new(
            "gctuner_gc_cycles",
            "Completed collection cycles since process start",
        )?;
        let memory_usage_ratio = Gauge::new(
            "gctuner_memory_usage_ratio",
            "Live heap bytes divided by the memory limit (0.0-1.0+)",
        )?;
        let safety_factor = Gauge::new(
            "gctuner_safety_factor",
            "Configured fraction of the limit used as steady-state ceiling",
        )?;
        let enabled = Gauge::new(
            "gctuner_enabled",
            "Whether the tuner is enabled (1) or stopped (0)",
        )?;
        let adjustments = Gauge::new(
            "gctuner_adjustments",
            "Trigger changes applied since the tuner was created",
        )?;

        registry.register(Box::new(current_trigger.clone()))?;
        registry.register(Box::new(memory_limit_bytes.clone()))?;
        registry.register(Box::new(heap_live_bytes.clone()))?;
        registry.register(Box::new(heap_objects.clone()))?;
        registry.register(Box::new(gc_cycles.clone()))?;
        registry.register(Box::new(memory_usage_ratio.clone()))?;
        registry.register(Box::new(safety_factor.clone()))?;
        registry.register(Box::new(enabled.clone()))?;
        registry.register(Box::new(adjustments.clone()))?;

        Ok(Self {
            current_trigger,
            memory_limit_bytes,
            heap_live_bytes,
            heap_objects,
            gc_cycles,
            memory_usage_ratio,
            safety_factor,
            enabled,
            adjustments,
        })
    }

    /// Copies a snapshot into the gauges.
    pub fn observe(&self, metrics: &TunerMetrics) {
        self.current_trigger.set(metrics.current_trigger as f64);
        self.memory_limit_bytes.set(metrics.memory_limit_bytes as f64);
        self.heap_live_bytes.set(metrics.heap_live_bytes as f64);
        self.heap_objects.set(metrics.heap_objects as f64);
        self.gc_cycles.set(metrics.gc_cycles as f64);
        self.memory_usage_ratio.set(metrics.memory_usage_ratio);
        self.safety_factor.set(metrics.safety_factor);
        self.enabled.set(if metrics.enabled { 1.0 } else { 0.0 });
        self.adjustments.set(metrics.adjustments as f64);
    }
}

/// Renders every metric in `registry` in the text exposition format.
pub fn render_text(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
