//! The adaptive growth-trigger tuner.
//!
//! A [`Tuner`] owns its validated configuration, the resolved memory limit and
//! a single mutex around its mutable state. Two independent paths call the same
//! adjustment routine:
//!
//! - a periodic Tokio task that adjusts and then forces a collection
//! - a one-shot collection-completed callback that adjusts and re-registers
//!
//! Both paths carry the registration generation they were armed with; a stop
//! or restart bumps the generation so stale timers and callbacks retire
//! themselves instead of adjusting.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use heap_trigger_tuner::{RuntimeHooks, SimulatedHeap, Tuner, TunerConfig};
//!
//! let heap = Arc::new(SimulatedHeap::new());
//! let config = TunerConfig {
//!     memory_hard_limit: Some(512 * 1024 * 1024),
//!     ..TunerConfig::default()
//! };
//! let tuner = Tuner::new(&config, RuntimeHooks::from_runtime(heap.clone())).unwrap();
//!
//! heap.allocate(64 * 1024 * 1024);
//! tuner.adjust();
//! println!("trigger now {}%", tuner.current_trigger());
//! tuner.stop();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::TunerError;
use crate::metrics::TunerMetrics;
use crate::policy::{self, Ceilings};
use crate::runtime::RuntimeHooks;
use crate::tuner_config::{TunerConfig, ValidatedConfig, BASELINE_TRIGGER};

/// Share of reserved memory used as the limit when nothing else is known.
pub const RESERVED_MEMORY_FALLBACK_RATIO: f64 = 0.8;

/// Lifecycle of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, not started. Manual `adjust()` calls are honoured.
    Idle,
    /// Timer and notification paths are armed.
    Running,
    /// Stopped; adjustments are refused until the next `start()`.
    Stopped,
}

/// Where the memory limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSource {
    Configured,
    Container,
    ReservedFallback,
}

/// Handle to the periodic timer task.
struct TimerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Mutable tuner state, guarded by the tuner lock.
struct TunerState {
    current_trigger: u32,
    last_adjust: Instant,
    lifecycle: Lifecycle,
    generation: u64,
    adjustments: u64,
    timer: Option<TimerSlot>,
}

impl TunerState {
    fn enabled(&self) -> bool {
        self.lifecycle != Lifecycle::Stopped
    }
}

struct TunerCore {
    config: ValidatedConfig,
    memory_limit: u64,
    limit_source: LimitSource,
    ceilings: Ceilings,
    hooks: RuntimeHooks,
    state: Mutex<TunerState>,
}

/// Adaptive growth-trigger controller. Cloning yields another handle to the
/// same tuner.
#[derive(Clone)]
pub struct Tuner {
    core: Arc<TunerCore>,
}

impl Tuner {
    /// Validates `config`, resolves the memory limit and the initial trigger.
    ///
    /// Fails only when the memory oracle cannot be read.
    pub fn new(config: &TunerConfig, hooks: RuntimeHooks) -> Result<Self, TunerError> {
        let (validated, corrections) = config.validate();
        for correction in &corrections {
            warn!("Tuner config corrected: {}", correction);
        }

        let sample = hooks.oracle.sample()?;

        let (memory_limit, limit_source) = if let Some(limit) = config.explicit_limit() {
            (limit, LimitSource::Configured)
        } else if let Some(limit) = config.container_limit() {
            (limit, LimitSource::Container)
        } else {
            let fallback = (sample.reserved_bytes as f64 * RESERVED_MEMORY_FALLBACK_RATIO) as u64;
            warn!(
                "No memory limit configured, using {:.0}% of reserved memory: {} bytes",
                RESERVED_MEMORY_FALLBACK_RATIO * 100.0,
                fallback
            );
            (fallback, LimitSource::ReservedFallback)
        };

        let current_trigger = config.initial_trigger();
        let ceilings = Ceilings::new(memory_limit, &validated);

        let initialised = format!(
            "Tuner initialised: memory_limit={} bytes ({:?}), safety_factor={:.2}, trigger={}",
            memory_limit, limit_source, validated.safety_factor, current_trigger
        );
        if validated.debug {
            info!("{}", initialised);
        } else {
            debug!("{}", initialised);
        }

        Ok(Self {
            core: Arc::new(TunerCore {
                config: validated,
                memory_limit,
                limit_source,
                ceilings,
                hooks,
                state: Mutex::new(TunerState {
                    current_trigger,
                    last_adjust: Instant::now(),
                    lifecycle: Lifecycle::Idle,
                    generation: 0,
                    adjustments: 0,
                    timer: None,
                }),
            }),
        })
    }

    /// Arms the periodic timer and the collection-completed callback, then
    /// adjusts once. Does nothing when already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), TunerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TunerError::NoAsyncRuntime)?;

        let generation = {
            let mut state = self.core.lock_state();
            if state.lifecycle == Lifecycle::Running {
                debug!("Tuner already running, start ignored");
                return Ok(());
            }
            state.lifecycle = Lifecycle::Running;
            state.generation += 1;
            let generation = state.generation;

            let (period, forced_every) = self.core.timer_schedule();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let core = Arc::downgrade(&self.core);
            let handle = runtime.spawn(async move {
                run_timer(core, generation, period, forced_every, shutdown_rx).await;
            });
            state.timer = Some(TimerSlot {
                handle,
                shutdown_tx,
            });
            generation
        };

        if self.core.hooks.notifier.is_some() {
            TunerCore::arm_notification(&self.core, generation);
        } else {
            info!(
                "No collection notifier available, polling every {:?} (reduced fidelity)",
                self.core.config.poll_interval
            );
        }

        info!(
            "Tuner started: forced collection every {:?}",
            self.core.config.forced_collection_interval
        );
        self.adjust();
        Ok(())
    }

    /// Cancels the timer, disables adjustment and restores the baseline
    /// trigger. No-op when already stopped.
    pub fn stop(&self) {
        let mut state = self.core.lock_state();
        if state.lifecycle == Lifecycle::Stopped {
            return;
        }

        if let Some(slot) = state.timer.take() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
        }
        state.lifecycle = Lifecycle::Stopped;
        state.generation += 1;

        self.core.hooks.control.set_growth_trigger(BASELINE_TRIGGER);
        state.current_trigger = BASELINE_TRIGGER;

        if self.core.config.debug {
            info!("Tuner stopped, trigger restored to {}", BASELINE_TRIGGER);
        } else {
            debug!("Tuner stopped, trigger restored to {}", BASELINE_TRIGGER);
        }
    }

    /// Runs one adjustment round. Returns the trigger written to the
    /// collector, or `None` when nothing changed.
    pub fn adjust(&self) -> Option<u32> {
        let mut state = self.core.lock_state();
        self.core.adjust_locked(&mut state)
    }

    /// Consistent snapshot of tuner state and heap statistics.
    pub fn metrics(&self) -> Result<TunerMetrics, TunerError> {
        let state = self.core.lock_state();
        let sample = self.core.hooks.oracle.sample()?;
        Ok(TunerMetrics {
            current_trigger: state.current_trigger,
            memory_limit_bytes: self.core.memory_limit,
            heap_live_bytes: sample.live_bytes,
            heap_objects: sample.object_count,
            gc_cycles: sample.cycle_count,
            memory_usage_ratio: usage_ratio(sample.live_bytes, self.core.memory_limit),
            safety_factor: self.core.config.safety_factor,
            enabled: state.enabled(),
            adjustments: state.adjustments,
        })
    }

    /// Trigger value last written to the collector.
    pub fn current_trigger(&self) -> u32 {
        self.core.lock_state().current_trigger
    }

    /// Resolved memory limit in bytes.
    pub fn memory_limit(&self) -> u64 {
        self.core.memory_limit
    }

    pub fn limit_source(&self) -> LimitSource {
        self.core.limit_source
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.lock_state().lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.core.config
    }
}

impl TunerCore {
    fn lock_state(&self) -> MutexGuard<'_, TunerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer period and how often a tick forces a collection.
    ///
    /// With a notifier every tick forces a collection. Without one the timer
    /// is the only trigger path, so it ticks at the poll interval.
    fn timer_schedule(&self) -> (Duration, Duration) {
        let forced = self.config.forced_collection_interval;
        if self.hooks.notifier.is_some() {
            (forced, forced)
        } else {
            (self.config.poll_interval.min(forced), forced)
        }
    }

    fn adjust_locked(&self, state: &mut TunerState) -> Option<u32> {
        if !state.enabled() {
            return None;
        }

        let sample = match self.hooks.oracle.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Skipping adjustment, memory sample failed: {}", e);
                return None;
            }
        };

        let decision = policy::decide(sample.live_bytes, &self.ceilings, &self.config);
        if !policy::exceeds_hysteresis(decision.trigger, state.current_trigger) {
            trace!(
                "Trigger {} within hysteresis of {} ({}), unchanged",
                decision.trigger,
                state.current_trigger,
                decision.branch.as_str()
            );
            return None;
        }

        self.hooks.control.set_growth_trigger(decision.trigger);

        let now = Instant::now();
        let interval = now.duration_since(state.last_adjust);
        state.current_trigger = decision.trigger;
        state.last_adjust = now;
        state.adjustments += 1;

        let ratio = usage_ratio(sample.live_bytes, self.memory_limit);
        if self.config.debug {
            info!(
                "Adjusted trigger={} ({}), live={}MB, limit={}MB, usage={:.2}%, since_last={:?}",
                decision.trigger,
                decision.branch.as_str(),
                sample.live_bytes >> 20,
                self.memory_limit >> 20,
                ratio * 100.0,
                interval
            );
        } else {
            debug!(
                "Adjusted trigger={} ({}), live={} bytes, usage={:.4}",
                decision.trigger,
                decision.branch.as_str(),
                sample.live_bytes,
                ratio
            );
        }

        Some(decision.trigger)
    }

    /// Adjusts if `generation` is still the running one.
    fn adjust_if_current(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        if state.lifecycle != Lifecycle::Running || state.generation != generation {
            return false;
        }
        self.adjust_locked(&mut state);
        true
    }

    /// Registers a one-shot completion callback that adjusts and re-registers
    /// itself for as long as `generation` stays current.
    fn arm_notification(core: &Arc<TunerCore>, generation: u64) {
        let Some(notifier) = core.hooks.notifier.clone() else {
            return;
        };
        let weak = Arc::downgrade(core);
        notifier.on_collection_complete(Box::new(move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            if core.adjust_if_current(generation) {
                TunerCore::arm_notification(&core, generation);
            } else {
                trace!("Collection callback from retired generation {}", generation);
            }
        }));
    }
}

/// Periodic timer body. Collections are forced outside the tuner lock.
async fn run_timer(
    core: Weak<TunerCore>,
    generation: u64,
    period: Duration,
    forced_every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut since_forced = Duration::ZERO;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(period) => {}
        }

        let Some(tuner) = core.upgrade() else {
            break;
        };
        if !tuner.adjust_if_current(generation) {
            break;
        }

        since_forced += period;
        if since_forced >= forced_every {
            since_forced = Duration::ZERO;
            trace!("Forcing collection");
            tuner.hooks.control.force_collection();
        }
    }
    trace!("Timer for generation {} exited", generation);
}

/// Live heap as a fraction of `memory_limit`; 0 when no limit is known.
pub fn usage_ratio(live_bytes: u64, memory_limit: u64) -> f64 {
    if memory_limit == 0 {
        0.0
    } else {
        live_bytes as f64 / memory_limit as f64
    }
}
