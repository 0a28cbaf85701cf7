//! Stress command implementation.
//!
//! Hosts a tuner over a simulated heap and drives an allocation pattern
//! against it, logging a metrics report line at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use heap_trigger_tuner::metrics::render_text;
use heap_trigger_tuner::{
    usage_ratio, MemoryOracle, RuntimeHooks, SimulatedHeap, Tuner, TunerGauges, TunerMetrics,
    BASELINE_TRIGGER,
};
use prometheus::Registry;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::workload::{run_cleanup, Workload};

/// Formats one metrics report line. `analyze` parses exactly this shape.
pub fn format_report(metrics: &TunerMetrics) -> String {
    format!(
        "metrics report - trigger: {}, heap: {}MB, objects: {}, cycles: {}, usage: {:.2}%",
        metrics.current_trigger,
        metrics.heap_live_bytes >> 20,
        metrics.heap_objects,
        metrics.gc_cycles,
        metrics.memory_usage_ratio * 100.0
    )
}

/// Snapshot of the heap when no tuner is attached.
fn untuned_snapshot(heap: &SimulatedHeap, memory_limit: u64) -> anyhow::Result<TunerMetrics> {
    let sample = heap.sample()?;
    Ok(TunerMetrics {
        current_trigger: heap.trigger(),
        memory_limit_bytes: memory_limit,
        heap_live_bytes: sample.live_bytes,
        heap_objects: sample.object_count,
        gc_cycles: sample.cycle_count,
        memory_usage_ratio: usage_ratio(sample.live_bytes, memory_limit),
        safety_factor: 0.0,
        enabled: false,
        adjustments: 0,
    })
}

fn snapshot(
    tuner: Option<&Tuner>,
    heap: &SimulatedHeap,
    memory_limit: u64,
) -> anyhow::Result<TunerMetrics> {
    match tuner {
        Some(tuner) => Ok(tuner.metrics()?),
        None => untuned_snapshot(heap, memory_limit),
    }
}

async fn run_reporter(
    tuner: Option<Tuner>,
    heap: Arc<SimulatedHeap>,
    memory_limit: u64,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    // First tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                match snapshot(tuner.as_ref(), &heap, memory_limit) {
                    Ok(metrics) => info!("{}", format_report(&metrics)),
                    Err(e) => warn!("Metrics report skipped: {}", e),
                }
            }
        }
    }
}

/// Runs the stress harness until the configured duration elapses or Ctrl+C.
pub async fn command_stress(config: &AppConfig, prometheus: bool) -> anyhow::Result<()> {
    let stress = &config.stress;
    let heap = Arc::new(SimulatedHeap::new());

    info!(
        "Stress configuration: load={:?}, objects={}-{}MB, duration={}s, hold={}s, tuner={}",
        stress.load,
        stress.min_object_mb,
        stress.max_object_mb,
        stress.duration_secs,
        stress.hold_secs,
        if stress.enable_tuner { "enabled" } else { "disabled" }
    );

    let tuner = if stress.enable_tuner {
        let tuner = Tuner::new(&config.tuner, RuntimeHooks::from_runtime(heap.clone()))
            .context("Tuner initialisation failed")?;
        tuner.start().context("Tuner start failed")?;
        info!(
            "Tuner started with memory limit {}MB",
            tuner.memory_limit() >> 20
        );
        Some(tuner)
    } else {
        info!(
            "Tuner disabled, collector runs with trigger {}",
            BASELINE_TRIGGER
        );
        None
    };

    let memory_limit = match &tuner {
        Some(tuner) => tuner.memory_limit(),
        None => config
            .tuner
            .explicit_limit()
            .or_else(|| config.tuner.container_limit())
            .unwrap_or(0),
    };

    let workload = Arc::new(Workload::new(
        heap.clone(),
        stress.min_object_mb,
        stress.max_object_mb,
        Duration::from_secs(stress.hold_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = tokio::spawn(run_cleanup(workload.clone(), shutdown_rx.clone()));
    let reporter = tokio::spawn(run_reporter(
        tuner.clone(),
        heap.clone(),
        memory_limit,
        Duration::from_secs(stress.report_interval_secs),
        shutdown_rx,
    ));

    tokio::select! {
        _ = workload.run(stress.load, Duration::from_secs(stress.duration_secs)) => {
            info!("Stress run completed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), stopping stress run...");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = cleanup.await {
        warn!("Cleanup task ended abnormally: {}", e);
    }
    if let Err(e) = reporter.await {
        warn!("Reporter task ended abnormally: {}", e);
    }

    let final_metrics = snapshot(tuner.as_ref(), &heap, memory_limit)?;
    info!("final {}", format_report(&final_metrics));

    if let Some(tuner) = &tuner {
        tuner.stop();
    }

    if prometheus {
        let registry = Registry::new();
        let gauges = TunerGauges::new(&registry)?;
        gauges.observe(&final_metrics);
        print!("{}", render_text(&registry)?);
    }

    info!("Releasing {} objects still held", workload.held_objects());
    workload.release_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LoadPattern;

    #[test]
    fn test_format_report() {
        let metrics = TunerMetrics {
            current_trigger: 425,
            memory_limit_bytes: 500 << 20,
            heap_live_bytes: 100 << 20,
            heap_objects: 12,
            gc_cycles: 4,
            memory_usage_ratio: 0.2,
            safety_factor: 0.7,
            enabled: true,
            adjustments: 1,
        };
        assert_eq!(
            format_report(&metrics),
            "metrics report - trigger: 425, heap: 100MB, objects: 12, cycles: 4, usage: 20.00%"
        );
    }

    #[test]
    fn test_untuned_snapshot_uses_heap_trigger() {
        let heap = SimulatedHeap::new();
        heap.allocate(50 << 20);
        let metrics = untuned_snapshot(&heap, 200 << 20).unwrap();
        assert_eq!(metrics.current_trigger, 100);
        assert_eq!(metrics.memory_usage_ratio, 0.25);
        assert!(!metrics.enabled);
    }

    #[test]
    fn test_untuned_snapshot_without_limit() {
        let heap = SimulatedHeap::new();
        heap.allocate(50 << 20);
        let metrics = untuned_snapshot(&heap, 0).unwrap();
        assert_eq!(metrics.memory_limit_bytes, 0);
        assert_eq!(metrics.memory_usage_ratio, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_stress_run() {
        let mut config = AppConfig::default();
        config.stress.load = LoadPattern::Constant;
        config.stress.duration_secs = 3;
        config.stress.hold_secs = 1;
        command_stress(&config, true).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_stress_run_without_tuner() {
        let mut config = AppConfig::default();
        config.stress.load = LoadPattern::Spike;
        config.stress.duration_secs = 2;
        config.stress.enable_tuner = false;
        command_stress(&config, false).await.unwrap();
    }
}
