//! Collaborator contracts between the tuner and the managed runtime.
//!
//! The tuner never talks to a collector directly. A host wires three
//! capabilities into a [`RuntimeHooks`] bundle:
//!
//! - [`MemoryOracle`]: cheap synchronous reads of heap statistics
//! - [`CollectorControl`]: writes the growth trigger and forces collections
//! - [`CollectionNotifier`]: optional one-shot "a collection finished" hook
//!
//! Without a notifier the tuner falls back to polling (see `Tuner::start`).

use std::sync::Arc;

use crate::error::OracleError;

/// Point-in-time memory statistics of the managed heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Bytes currently allocated on the heap and not yet reclaimed.
    pub live_bytes: u64,
    /// Number of heap objects.
    pub object_count: u64,
    /// Cumulative number of completed collection cycles.
    pub cycle_count: u64,
    /// Bytes the runtime has reserved from the operating system.
    pub reserved_bytes: u64,
}

/// Reports heap statistics.
pub trait MemoryOracle: Send + Sync {
    fn sample(&self) -> Result<MemorySample, OracleError>;
}

/// Applies collector settings.
pub trait CollectorControl: Send + Sync {
    /// Sets the growth-trigger percentage on the live collector.
    ///
    /// Called while the tuner holds its state lock. When the new trigger makes
    /// a collection due, implementations must defer it (for example to the
    /// next allocation) and must not run completion callbacks from inside
    /// this call.
    fn set_growth_trigger(&self, percent: u32);

    /// Runs a full collection cycle immediately.
    ///
    /// The tuner calls this without holding its lock, so completion
    /// callbacks may fire inline.
    fn force_collection(&self);
}

/// Callback run once after the next completed collection.
pub type CollectionCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot collection-completion hook.
///
/// Each registration fires at most once. Implementations must not invoke the
/// callback from inside `on_collection_complete` itself, and must not hold
/// their own locks while running it: the callback reads the oracle and may
/// re-register.
pub trait CollectionNotifier: Send + Sync {
    fn on_collection_complete(&self, callback: CollectionCallback);
}

/// The set of collaborators a tuner is wired to.
#[derive(Clone)]
pub struct RuntimeHooks {
    pub oracle: Arc<dyn MemoryOracle>,
    pub control: Arc<dyn CollectorControl>,
    pub notifier: Option<Arc<dyn CollectionNotifier>>,
}

impl RuntimeHooks {
    /// Hooks without a completion notifier (reduced-fidelity polling mode).
    pub fn new(oracle: Arc<dyn MemoryOracle>, control: Arc<dyn CollectorControl>) -> Self {
        Self {
            oracle,
            control,
            notifier: None,
        }
    }

    /// Adds a collection-completion notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn CollectionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Wires every hook to a single runtime object.
    pub fn from_runtime<R>(runtime: Arc<R>) -> Self
    where
        R: MemoryOracle + CollectorControl + CollectionNotifier + 'static,
    {
        Self {
            oracle: runtime.clone(),
            control: runtime.clone(),
            notifier: Some(runtime),
        }
    }
}
