//! An observer that buffers the last observed value of every variable.

use std::collections::HashMap;

use lockstep_types::{
    Duration, Result, SimulatorIndex, StepNumber, TimePoint, ValueReference, VariableType,
};

use crate::registry::SimulatorRegistry;
use crate::simulator::Observable;

use super::Observer;

#[derive(Default)]
struct SimulatorValues {
    real: HashMap<ValueReference, f64>,
    integer: HashMap<ValueReference, i32>,
    boolean: HashMap<ValueReference, bool>,
    string: HashMap<ValueReference, String>,
}

/// Buffers the most recently committed value of every variable of every
/// simulator. Values are refreshed each time a simulator completes a step,
/// so for decimated simulators the buffer holds the value from their last
/// communication point.
#[derive(Default)]
pub struct LastValueObserver {
    variables: HashMap<SimulatorIndex, Vec<(VariableType, ValueReference)>>,
    values: HashMap<SimulatorIndex, SimulatorValues>,
}

impl LastValueObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last observed value of a real variable.
    pub fn real_value(&self, simulator: SimulatorIndex, reference: ValueReference) -> Option<f64> {
        self.values.get(&simulator)?.real.get(&reference).copied()
    }

    /// Returns the last observed value of an integer variable.
    pub fn integer_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
    ) -> Option<i32> {
        self.values.get(&simulator)?.integer.get(&reference).copied()
    }

    /// Returns the last observed value of a boolean variable.
    pub fn boolean_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
    ) -> Option<bool> {
        self.values.get(&simulator)?.boolean.get(&reference).copied()
    }

    /// Returns the last observed value of a string variable.
    pub fn string_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
    ) -> Option<String> {
        self.values.get(&simulator)?.string.get(&reference).cloned()
    }

    fn sample(&mut self, index: SimulatorIndex, simulator: &dyn Observable) {
        let Some(variables) = self.variables.get(&index) else {
            return;
        };
        let values = self.values.entry(index).or_default();
        for &(variable_type, reference) in variables {
            match variable_type {
                VariableType::Real => {
                    if let Ok(v) = simulator.get_real(reference) {
                        values.real.insert(reference, v);
                    }
                }
                VariableType::Integer => {
                    if let Ok(v) = simulator.get_integer(reference) {
                        values.integer.insert(reference, v);
                    }
                }
                VariableType::Boolean => {
                    if let Ok(v) = simulator.get_boolean(reference) {
                        values.boolean.insert(reference, v);
                    }
                }
                VariableType::String => {
                    if let Ok(v) = simulator.get_string(reference) {
                        values.string.insert(reference, v.to_string());
                    }
                }
            }
        }
    }
}

impl Observer for LastValueObserver {
    fn simulator_added(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Observable,
        _current_time: TimePoint,
    ) -> Result<()> {
        let variables: Vec<(VariableType, ValueReference)> = simulator
            .model_description()
            .variables
            .iter()
            .map(|v| (v.variable_type, v.reference))
            .collect();
        for &(variable_type, reference) in &variables {
            simulator.expose_for_getting(variable_type, reference)?;
        }
        self.variables.insert(index, variables);
        self.values.insert(index, SimulatorValues::default());
        Ok(())
    }

    fn simulator_removed(&mut self, index: SimulatorIndex, _current_time: TimePoint) {
        self.variables.remove(&index);
        self.values.remove(&index);
    }

    fn simulator_step_complete(
        &mut self,
        index: SimulatorIndex,
        _last_step: StepNumber,
        _last_step_size: Duration,
        _current_time: TimePoint,
        simulator: &dyn Observable,
    ) {
        self.sample(index, simulator);
    }

    fn state_restored(
        &mut self,
        _current_step: StepNumber,
        _current_time: TimePoint,
        simulators: &dyn SimulatorRegistry,
    ) -> Result<()> {
        // Everything in the buffer can be re-read from the restored
        // simulators.
        let indices: Vec<SimulatorIndex> = self.variables.keys().copied().collect();
        for index in indices {
            if let Some(simulator) = simulators.simulator(index) {
                self.sample(index, simulator);
            }
        }
        Ok(())
    }
}
