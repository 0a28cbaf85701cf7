//! Simulated growth-trigger collector.
//!
//! A deterministic stand-in for a managed runtime, used by the stress harness
//! and the tests. It follows the usual pacing model of a growth-trigger
//! collector:
//!
//! - every allocation adds to the heap; released objects stay on the heap as
//!   garbage until the next collection
//! - a collection runs when the heap reaches the goal
//!   `max(marked * (1 + trigger / 100), MIN_HEAP_GOAL)`, where `marked` is
//!   the heap size left by the previous collection
//! - after each collection every registered completion callback fires once
//!
//! `live_bytes` reports everything still on the heap, garbage included, the
//! same quantity a real runtime exposes as allocated heap bytes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::OracleError;
use crate::runtime::{
    CollectionCallback, CollectionNotifier, CollectorControl, MemoryOracle, MemorySample,
};
use crate::tuner_config::BASELINE_TRIGGER;

/// Smallest heap goal, so tiny heaps do not collect constantly.
pub const MIN_HEAP_GOAL: u64 = 4 * 1024 * 1024;

/// Memory the simulated runtime reserves beyond the heap itself.
pub const RUNTIME_OVERHEAD_BYTES: u64 = 8 * 1024 * 1024;

/// Identifier of a simulated heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

#[derive(Default)]
struct HeapInner {
    next_id: u64,
    reachable: HashMap<ObjectId, u64>,
    reachable_bytes: u64,
    garbage_bytes: u64,
    garbage_objects: u64,
    marked_bytes: u64,
    high_water: u64,
    cycles: u64,
    trigger: u32,
    trigger_writes: Vec<u32>,
    callbacks: Vec<CollectionCallback>,
    available: bool,
}

impl HeapInner {
    fn heap_bytes(&self) -> u64 {
        self.reachable_bytes + self.garbage_bytes
    }

    fn goal(&self) -> u64 {
        let growth = self.marked_bytes as f64 * (1.0 + self.trigger as f64 / 100.0);
        (growth as u64).max(MIN_HEAP_GOAL)
    }

    /// Reclaims garbage and hands back the callbacks to run.
    fn collect(&mut self) -> Vec<CollectionCallback> {
        self.garbage_bytes = 0;
        self.garbage_objects = 0;
        self.marked_bytes = self.reachable_bytes;
        self.cycles += 1;
        trace!(
            "Simulated collection #{}: marked={} bytes, next goal={} bytes",
            self.cycles,
            self.marked_bytes,
            self.goal()
        );
        std::mem::take(&mut self.callbacks)
    }
}

/// Thread-safe simulated heap implementing all runtime collaborator traits.
pub struct SimulatedHeap {
    inner: Mutex<HeapInner>,
}

impl Default for SimulatedHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHeap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HeapInner {
                trigger: BASELINE_TRIGGER,
                available: true,
                ..HeapInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeapInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a reachable object, collecting first if the goal is reached.
    pub fn allocate(&self, bytes: u64) -> ObjectId {
        let (id, callbacks) = {
            let mut inner = self.lock();
            let id = ObjectId(inner.next_id);
            inner.next_id += 1;
            inner.reachable.insert(id, bytes);
            inner.reachable_bytes += bytes;
            let heap = inner.heap_bytes();
            inner.high_water = inner.high_water.max(heap);

            let callbacks = if heap >= inner.goal() {
                inner.collect()
            } else {
                Vec::new()
            };
            (id, callbacks)
        };
        run_callbacks(callbacks);
        id
    }

    /// Drops the reference to an object; its bytes become garbage.
    ///
    /// Returns false when the object is unknown or already released.
    pub fn release(&self, id: ObjectId) -> bool {
        let mut inner = self.lock();
        match inner.reachable.remove(&id) {
            Some(bytes) => {
                inner.reachable_bytes -= bytes;
                inner.garbage_bytes += bytes;
                inner.garbage_objects += 1;
                true
            }
            None => false,
        }
    }

    /// Runs a collection cycle and fires completion callbacks.
    pub fn collect(&self) {
        let callbacks = self.lock().collect();
        run_callbacks(callbacks);
    }

    /// Makes `sample()` fail, as an unreachable runtime would.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn trigger(&self) -> u32 {
        self.lock().trigger
    }

    /// Every trigger written through `set_growth_trigger`, in order.
    pub fn trigger_writes(&self) -> Vec<u32> {
        self.lock().trigger_writes.clone()
    }

    /// Completion callbacks currently waiting for the next collection.
    pub fn pending_callbacks(&self) -> usize {
        self.lock().callbacks.len()
    }

    /// Bytes still reachable from the workload.
    pub fn reachable_bytes(&self) -> u64 {
        self.lock().reachable_bytes
    }

    /// Heap size at which the next collection starts.
    pub fn next_goal(&self) -> u64 {
        self.lock().goal()
    }
}

fn run_callbacks(callbacks: Vec<CollectionCallback>) {
    for callback in callbacks {
        callback();
    }
}

impl MemoryOracle for SimulatedHeap {
    fn sample(&self) -> Result<MemorySample, OracleError> {
        let inner = self.lock();
        if !inner.available {
            return Err(OracleError::Unavailable(
                "simulated runtime offline".to_string(),
            ));
        }
        Ok(MemorySample {
            live_bytes: inner.heap_bytes(),
            object_count: inner.reachable.len() as u64 + inner.garbage_objects,
            cycle_count: inner.cycles,
            reserved_bytes: inner.high_water + RUNTIME_OVERHEAD_BYTES,
        })
    }
}

impl CollectorControl for SimulatedHeap {
    fn set_growth_trigger(&self, percent: u32) {
        let mut inner = self.lock();
        inner.trigger = percent;
        inner.trigger_writes.push(percent);
    }

    fn force_collection(&self) {
        self.collect();
    }
}

impl CollectionNotifier for SimulatedHeap {
    fn on_collection_complete(&self, callback: CollectionCallback) {
        self.lock().callbacks.push(callback);
    }
}
