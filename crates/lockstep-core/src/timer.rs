//! Wall-clock pacing of the simulation loop.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lockstep_types::{Error, Result, TimePoint};

/// Sleep requests shorter than this are skipped.
const MIN_SLEEP: std::time::Duration = std::time::Duration::from_micros(100);

const DEFAULT_STEPS_TO_MONITOR: u32 = 5;

/// Configuration and metrics shared between the driver thread and API
/// callers. All fields are atomic scalars: reads never block, and each
/// field has a single logical writer at a time.
struct SharedState {
    real_time_simulation: AtomicBool,
    real_time_factor_target: AtomicU64,
    steps_to_monitor: AtomicU32,
    rolling_average_factor: AtomicU64,
    total_average_factor: AtomicU64,
    /// Bumped whenever the configuration changes, so the driver restarts
    /// its reference points.
    generation: AtomicU64,
}

fn store_f64(cell: &AtomicU64, value: f64) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

/// A handle for reading and changing real-time pacing settings while a
/// simulation is running.
#[derive(Clone)]
pub struct RealTimeConfig {
    shared: Arc<SharedState>,
}

impl RealTimeConfig {
    /// Enables pacing of the simulation against the wall clock.
    pub fn enable_real_time_simulation(&self) {
        self.shared.real_time_simulation.store(true, Ordering::Relaxed);
        self.shared.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Disables wall-clock pacing; the simulation runs as fast as it can.
    pub fn disable_real_time_simulation(&self) {
        self.shared
            .real_time_simulation
            .store(false, Ordering::Relaxed);
    }

    /// Whether wall-clock pacing is enabled.
    pub fn is_real_time_simulation(&self) -> bool {
        self.shared.real_time_simulation.load(Ordering::Relaxed)
    }

    /// Sets the target real-time factor (simulated seconds per wall-clock
    /// second). Must be positive. Changing the target restarts the pacing
    /// reference points.
    pub fn set_real_time_factor_target(&self, factor: f64) -> Result<()> {
        if !(factor > 0.0) {
            return Err(Error::logic("the real-time factor target must be positive"));
        }
        store_f64(&self.shared.real_time_factor_target, factor);
        self.shared.generation.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the target real-time factor.
    pub fn real_time_factor_target(&self) -> f64 {
        load_f64(&self.shared.real_time_factor_target)
    }

    /// Sets how many steps make up one rolling-average measurement window.
    pub fn set_steps_to_monitor(&self, steps: u32) -> Result<()> {
        if steps < 1 {
            return Err(Error::logic("steps_to_monitor must be at least 1"));
        }
        self.shared.steps_to_monitor.store(steps, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the rolling-average measurement window, in steps.
    pub fn steps_to_monitor(&self) -> u32 {
        self.shared.steps_to_monitor.load(Ordering::Relaxed)
    }

    /// Returns the real-time factor measured over the last monitoring
    /// window.
    pub fn rolling_average_real_time_factor(&self) -> f64 {
        load_f64(&self.shared.rolling_average_factor)
    }

    /// Returns the real-time factor measured since pacing started.
    pub fn total_average_real_time_factor(&self) -> f64 {
        load_f64(&self.shared.total_average_factor)
    }
}

/// Paces the simulation loop against the wall clock and publishes measured
/// real-time factors.
///
/// Used from the driver thread only: [`RealTimeTimer::start`] once at
/// simulation start, then [`RealTimeTimer::sleep`] after every macro step.
/// Configuration changes arrive through the shared [`RealTimeConfig`].
pub struct RealTimeTimer {
    shared: Arc<SharedState>,
    reference: Option<Reference>,
    generation_seen: u64,
    step_counter: u32,
}

struct Reference {
    /// Wall-clock and simulation time when pacing (re)started.
    total_wall: Instant,
    total_sim: TimePoint,
    /// Wall-clock and simulation time at the start of the current rolling
    /// window.
    rolling_wall: Instant,
    rolling_sim: TimePoint,
}

impl Default for RealTimeTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTimeTimer {
    pub fn new() -> Self {
        RealTimeTimer {
            shared: Arc::new(SharedState {
                real_time_simulation: AtomicBool::new(false),
                real_time_factor_target: AtomicU64::new(1.0f64.to_bits()),
                steps_to_monitor: AtomicU32::new(DEFAULT_STEPS_TO_MONITOR),
                rolling_average_factor: AtomicU64::new(1.0f64.to_bits()),
                total_average_factor: AtomicU64::new(1.0f64.to_bits()),
                generation: AtomicU64::new(0),
            }),
            reference: None,
            generation_seen: 0,
            step_counter: 0,
        }
    }

    /// Returns a cloneable configuration/metrics handle.
    pub fn config(&self) -> RealTimeConfig {
        RealTimeConfig {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Captures the pacing reference points at simulation time
    /// `current_time`.
    pub fn start(&mut self, current_time: TimePoint) {
        let now = Instant::now();
        self.reference = Some(Reference {
            total_wall: now,
            total_sim: current_time,
            rolling_wall: now,
            rolling_sim: current_time,
        });
        self.generation_seen = self.shared.generation.load(Ordering::Relaxed);
        self.step_counter = 0;
    }

    /// Updates the measured real-time factors and, when real-time pacing is
    /// enabled, sleeps long enough to hold the configured target factor.
    pub fn sleep(&mut self, current_time: TimePoint) {
        let generation = self.shared.generation.load(Ordering::Relaxed);
        if self.reference.is_none() || generation != self.generation_seen {
            self.start(current_time);
        }
        let reference = self.reference.as_mut().expect("reference set above");

        let now = Instant::now();
        let target = load_f64(&self.shared.real_time_factor_target);

        self.step_counter += 1;
        if self.step_counter >= self.shared.steps_to_monitor.load(Ordering::Relaxed) {
            let expected = (current_time - reference.rolling_sim).nanos() as f64;
            let elapsed = now.duration_since(reference.rolling_wall).as_nanos() as f64;
            if elapsed > 0.0 {
                store_f64(&self.shared.rolling_average_factor, expected / elapsed);
            }
            reference.rolling_wall = now;
            reference.rolling_sim = current_time;
            self.step_counter = 0;
        }
        let total_expected = (current_time - reference.total_sim).nanos() as f64;
        let total_elapsed = now.duration_since(reference.total_wall).as_nanos() as f64;
        if total_elapsed > 0.0 {
            store_f64(&self.shared.total_average_factor, total_expected / total_elapsed);
        }

        if self.shared.real_time_simulation.load(Ordering::Relaxed) {
            let elapsed = now.duration_since(reference.total_wall);
            let expected_nanos = (current_time - reference.total_sim).nanos() as f64 / target;
            if expected_nanos > 0.0 {
                let expected = std::time::Duration::from_nanos(expected_nanos as u64);
                if expected > elapsed && expected - elapsed > MIN_SLEEP {
                    std::thread::sleep(expected - elapsed);
                }
            }
        }
    }
}
