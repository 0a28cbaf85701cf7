//! Allocation workloads for the stress harness.
//!
//! A [`Workload`] allocates objects on a [`SimulatedHeap`] following a
//! [`LoadPattern`] and keeps each one reachable for a hold period. The cleanup
//! task releases expired objects once per second so they turn into garbage for
//! the next collection.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::cli::LoadPattern;
use heap_trigger_tuner::sim::ObjectId;
use heap_trigger_tuner::SimulatedHeap;

const MB: u64 = 1024 * 1024;

/// Length of one wave cycle.
pub const WAVE_CYCLE: Duration = Duration::from_secs(10);
const CONSTANT_PAUSE: Duration = Duration::from_millis(200);
const SPIKE_QUIET_PAUSE: Duration = Duration::from_millis(500);
const SPIKE_BURST_PAUSE: Duration = Duration::from_millis(50);
const SPIKE_REST: Duration = Duration::from_secs(2);
/// Share of spike-pattern steps that stay quiet.
const SPIKE_QUIET_SHARE: f64 = 0.8;
const CLEANUP_PERIOD: Duration = Duration::from_secs(1);

/// Allocation rate in `[0.1, 1.0]` at `position` (0..1) within a wave cycle.
pub fn wave_rate(position: f64) -> f64 {
    0.1 + 0.9 * (((position * 2.0 * PI).sin() + 1.0) / 2.0)
}

/// Pause after an allocation at the given wave rate.
pub fn wave_pause(rate: f64) -> Duration {
    Duration::from_secs_f64((1.0 - rate).clamp(0.0, 1.0))
}

/// Drives allocations against a simulated heap.
pub struct Workload {
    heap: Arc<SimulatedHeap>,
    min_object_mb: u64,
    max_object_mb: u64,
    hold: Duration,
    held: Mutex<VecDeque<(ObjectId, Instant)>>,
}

impl Workload {
    pub fn new(heap: Arc<SimulatedHeap>, min_object_mb: u64, max_object_mb: u64, hold: Duration) -> Self {
        Self {
            heap,
            min_object_mb,
            max_object_mb: max_object_mb.max(min_object_mb),
            hold,
            held: Mutex::new(VecDeque::new()),
        }
    }

    fn held(&self) -> MutexGuard<'_, VecDeque<(ObjectId, Instant)>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Objects currently kept reachable.
    pub fn held_objects(&self) -> usize {
        self.held().len()
    }

    /// Allocates one object whose size is drawn from `[min_mb, max_mb)` MB.
    pub fn allocate_between(&self, min_mb: u64, max_mb: u64) -> u64 {
        let min_mb = min_mb.max(1);
        let size_mb = if max_mb > min_mb {
            rand::thread_rng().gen_range(min_mb..max_mb)
        } else {
            min_mb
        };

        let id = self.heap.allocate(size_mb * MB);
        let held = {
            let mut held = self.held();
            held.push_back((id, Instant::now()));
            held.len()
        };
        debug!(
            "Allocated {}MB object, reachable heap: {}MB, held objects: {}",
            size_mb,
            self.heap.reachable_bytes() >> 20,
            held
        );
        size_mb
    }

    /// Releases every object held longer than the hold period.
    pub fn release_expired(&self, now: Instant) -> usize {
        let mut held = self.held();
        let mut removed = 0;
        while let Some(&(id, created)) = held.front() {
            if now.duration_since(created) < self.hold {
                break;
            }
            held.pop_front();
            self.heap.release(id);
            removed += 1;
        }
        removed
    }

    /// Releases everything still held.
    pub fn release_all(&self) {
        let mut held = self.held();
        for (id, _) in held.drain(..) {
            self.heap.release(id);
        }
    }

    /// Runs `pattern` until `duration` has elapsed.
    pub async fn run(&self, pattern: LoadPattern, duration: Duration) {
        info!("Generating {:?} load for {:?}", pattern, duration);
        let start = Instant::now();
        let end = start + duration;

        match pattern {
            LoadPattern::Constant => {
                while Instant::now() < end {
                    self.allocate_between(self.min_object_mb, self.max_object_mb);
                    sleep(CONSTANT_PAUSE).await;
                }
            }
            LoadPattern::Wave => {
                while Instant::now() < end {
                    let elapsed = start.elapsed().as_secs_f64();
                    let cycle = elapsed / WAVE_CYCLE.as_secs_f64();
                    let rate = wave_rate(cycle.fract());
                    self.allocate_between(self.min_object_mb, self.max_object_mb);
                    sleep(wave_pause(rate)).await;
                }
            }
            LoadPattern::Spike => {
                while Instant::now() < end {
                    let quiet = rand::thread_rng().gen_bool(SPIKE_QUIET_SHARE);
                    if quiet {
                        self.allocate_between(self.min_object_mb, self.min_object_mb + 1);
                        sleep(SPIKE_QUIET_PAUSE).await;
                        continue;
                    }

                    let burst = Duration::from_secs(rand::thread_rng().gen_range(1..=3));
                    info!("Load spike for {:?}", burst);
                    let burst_start = Instant::now();
                    let low = self.max_object_mb.saturating_sub(2).max(self.min_object_mb);
                    while burst_start.elapsed() < burst {
                        self.allocate_between(low, self.max_object_mb);
                        sleep(SPIKE_BURST_PAUSE).await;
                    }
                    sleep(SPIKE_REST).await;
                }
            }
        }
    }
}

/// Releases expired objects every second until shutdown.
pub async fn run_cleanup(workload: Arc<Workload>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(CLEANUP_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                let removed = workload.release_expired(Instant::now());
                if removed > 0 {
                    debug!("Released {} expired objects", removed);
                }
            }
        }
    }
}
