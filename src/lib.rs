//! Heap Trigger Tuner Library
//!
//! An adaptive controller that keeps a garbage collector's growth trigger
//! tuned to the live working set, so a process stays inside an external memory
//! budget (for example a container limit) without collecting more often than
//! it has to.
//!
//! # Features
//!
//! - **Feedback policy**: inverts the growth-trigger definition to pick the
//!   largest trigger that keeps the heap under a safety ceiling
//! - **Peak override**: a looser ceiling while the live set is far below budget
//! - **Hysteresis**: changes of 10% or less are ignored
//! - **Two trigger paths**: a periodic timer and a collection-completed hook,
//!   serialised by one lock
//! - **Defensive configuration**: bad tunables are corrected, never rejected
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use heap_trigger_tuner::{RuntimeHooks, SimulatedHeap, Tuner, TunerConfig};
//!
//! let heap = Arc::new(SimulatedHeap::new());
//! let config = TunerConfig {
//!     memory_hard_limit: Some(500 * 1024 * 1024),
//!     allow_peak_override: true,
//!     ..TunerConfig::default()
//! };
//! let tuner = Tuner::new(&config, RuntimeHooks::from_runtime(heap.clone())).unwrap();
//!
//! heap.allocate(100 * 1024 * 1024);
//! assert_eq!(tuner.adjust(), Some(425));
//!
//! let metrics = tuner.metrics().unwrap();
//! println!("trigger={} usage={:.2}", metrics.current_trigger, metrics.memory_usage_ratio);
//!
//! tuner.stop();
//! assert_eq!(heap.trigger(), 100);
//! ```
//!
//! A real host implements [`MemoryOracle`], [`CollectorControl`] and,
//! when its runtime has one, [`CollectionNotifier`] for its collector.

pub mod error;
pub mod metrics;
pub mod policy;
pub mod runtime;
pub mod sim;
pub mod tuner;
pub mod tuner_config;

// Re-export main types for convenience
pub use error::{OracleError, TunerError};
pub use metrics::{TunerGauges, TunerMetrics};
pub use policy::{Ceilings, Decision, PolicyBranch};
pub use runtime::{
    CollectionCallback, CollectionNotifier, CollectorControl, MemoryOracle, MemorySample,
    RuntimeHooks,
};
pub use sim::SimulatedHeap;
pub use tuner::{usage_ratio, Lifecycle, LimitSource, Tuner};
pub use tuner_config::{Correction, TunerConfig, ValidatedConfig, BASELINE_TRIGGER};
