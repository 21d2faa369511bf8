//! Manipulators: active participants allowed to install and remove value
//! modifiers on simulator variables.
//!
//! A manipulator reacts to simulation events and may modify variable
//! values through the [`Manipulable`] surface during its callbacks. Value
//! writes submitted during `step_commencing` take effect on the imminent
//! step.

pub mod override_manipulator;
pub mod scenario;
pub mod scenario_manager;

use lockstep_types::{Result, SimulatorIndex, TimePoint};

use crate::registry::SimulatorRegistry;
use crate::simulator::Manipulable;

pub use override_manipulator::OverrideManipulator;
pub use scenario::{Event, Scenario, VariableAction, VariableModifier};
pub use scenario_manager::ScenarioManager;

/// The manipulator capability.
#[allow(unused_variables)]
pub trait Manipulator: Send {
    /// A simulator was added to the execution.
    fn simulator_added(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Manipulable,
        current_time: TimePoint,
    ) -> Result<()> {
        Ok(())
    }

    /// A simulator was removed from the execution.
    fn simulator_removed(&mut self, index: SimulatorIndex, current_time: TimePoint) {}

    /// A macro step is commencing. Called exactly once per macro step,
    /// before output values are transferred to inputs.
    fn step_commencing(
        &mut self,
        current_time: TimePoint,
        simulators: &mut dyn SimulatorRegistry,
    ) -> Result<()> {
        Ok(())
    }
}
