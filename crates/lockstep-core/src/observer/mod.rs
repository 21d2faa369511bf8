//! Observers: passive listeners notified on simulation lifecycle events.
//!
//! Observers may query simulators through the [`Observable`] surface for
//! the duration of a callback; between `step_complete` notifications a
//! simulator's values reflect the just-completed step. No references are
//! retained across callbacks.

pub mod last_value;
pub mod time_series;

use lockstep_types::{Duration, Result, SimulatorIndex, StepNumber, TimePoint, VariableId};

use crate::registry::SimulatorRegistry;
use crate::simulator::Observable;

pub use last_value::LastValueObserver;
pub use time_series::TimeSeriesObserver;

/// The observer capability.
///
/// Every method has a no-op default so implementations only handle the
/// events they care about.
#[allow(unused_variables)]
pub trait Observer: Send {
    /// A simulator was added to the execution.
    fn simulator_added(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Observable,
        current_time: TimePoint,
    ) -> Result<()> {
        Ok(())
    }

    /// A simulator was removed from the execution.
    fn simulator_removed(&mut self, index: SimulatorIndex, current_time: TimePoint) {}

    /// A variable connection was established.
    fn variables_connected(
        &mut self,
        output: VariableId,
        input: VariableId,
        current_time: TimePoint,
    ) {
    }

    /// A variable connection was broken.
    fn variable_disconnected(&mut self, input: VariableId, current_time: TimePoint) {}

    /// The simulation was initialized, and stepping will start.
    fn simulation_initialized(
        &mut self,
        first_step: StepNumber,
        start_time: TimePoint,
    ) -> Result<()> {
        Ok(())
    }

    /// A macro step is complete, and a communication point was reached.
    fn step_complete(
        &mut self,
        last_step: StepNumber,
        last_step_size: Duration,
        current_time: TimePoint,
    ) {
    }

    /// A simulator completed a step; called once per stepped simulator per
    /// macro step, before `step_complete`.
    fn simulator_step_complete(
        &mut self,
        index: SimulatorIndex,
        last_step: StepNumber,
        last_step_size: Duration,
        current_time: TimePoint,
        simulator: &dyn Observable,
    ) {
    }

    /// The simulation was restored to a previously saved state.
    ///
    /// Observers must be able to rebuild their internal state from what is
    /// observable through `simulators`; those that cannot must fail with
    /// [`UnsupportedFeature`], which fails the whole restore.
    ///
    /// [`UnsupportedFeature`]: lockstep_types::Error::UnsupportedFeature
    fn state_restored(
        &mut self,
        current_step: StepNumber,
        current_time: TimePoint,
        simulators: &dyn SimulatorRegistry,
    ) -> Result<()> {
        Ok(())
    }
}
