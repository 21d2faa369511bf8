//! A manipulator for direct variable overrides.

use std::collections::HashMap;

use lockstep_types::{
    Error, ModelDescription, Result, SimulatorIndex, TimePoint, ValueReference, VariableType,
};
use parking_lot::Mutex;

use crate::registry::SimulatorRegistry;
use crate::simulator::{Manipulable, Observable};

use super::scenario::{VariableAction, VariableModifier};
use super::Manipulator;

/// Overrides variable values by installing constant-returning modifiers.
///
/// Override requests may arrive from any thread at any time; they are
/// queued under a lock and drained at the next `step_commencing`, so a
/// value written while a step is in flight takes effect on the following
/// step.
#[derive(Default)]
pub struct OverrideManipulator {
    descriptions: Mutex<HashMap<SimulatorIndex, ModelDescription>>,
    pending: Mutex<Vec<VariableAction>>,
}

fn is_input(
    description: &ModelDescription,
    variable_type: VariableType,
    reference: ValueReference,
) -> Result<bool> {
    let variable = description
        .find_variable_by_ref(variable_type, reference)
        .ok_or_else(|| {
            Error::invalid_structure(format!(
                "model '{}' has no {variable_type} variable with reference {reference}",
                description.name
            ))
        })?;
    Ok(variable.causality.is_writable())
}

impl OverrideManipulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(
        &self,
        simulator: SimulatorIndex,
        variable: ValueReference,
        modifier: VariableModifier,
    ) -> Result<()> {
        let is_input = {
            let descriptions = self.descriptions.lock();
            let description = descriptions.get(&simulator).ok_or_else(|| {
                Error::invalid_structure(format!("no simulator with index {simulator}"))
            })?;
            is_input(description, modifier.variable_type(), variable)?
        };
        self.pending.lock().push(VariableAction {
            simulator,
            variable,
            modifier,
            is_input,
        });
        Ok(())
    }

    /// Overrides a real variable with a constant value.
    pub fn override_real_variable(
        &self,
        simulator: SimulatorIndex,
        variable: ValueReference,
        value: f64,
    ) -> Result<()> {
        self.queue(simulator, variable, VariableModifier::real_override(value))
    }

    /// Overrides an integer variable with a constant value.
    pub fn override_integer_variable(
        &self,
        simulator: SimulatorIndex,
        variable: ValueReference,
        value: i32,
    ) -> Result<()> {
        self.queue(
            simulator,
            variable,
            VariableModifier::integer_override(value),
        )
    }

    /// Overrides a boolean variable with a constant value.
    pub fn override_boolean_variable(
        &self,
        simulator: SimulatorIndex,
        variable: ValueReference,
        value: bool,
    ) -> Result<()> {
        self.queue(
            simulator,
            variable,
            VariableModifier::boolean_override(value),
        )
    }

    /// Overrides a string variable with a constant value.
    pub fn override_string_variable(
        &self,
        simulator: SimulatorIndex,
        variable: ValueReference,
        value: impl Into<String>,
    ) -> Result<()> {
        self.queue(simulator, variable, VariableModifier::string_override(value))
    }

    /// Removes the override from a variable, returning it to its original
    /// trajectory.
    pub fn reset_variable(
        &self,
        simulator: SimulatorIndex,
        variable_type: VariableType,
        variable: ValueReference,
    ) -> Result<()> {
        let modifier = match variable_type {
            VariableType::Real => VariableModifier::Real(None),
            VariableType::Integer => VariableModifier::Integer(None),
            VariableType::Boolean => VariableModifier::Boolean(None),
            VariableType::String => VariableModifier::String(None),
        };
        self.queue(simulator, variable, modifier)
    }
}

impl Manipulator for OverrideManipulator {
    fn simulator_added(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Manipulable,
        _current_time: TimePoint,
    ) -> Result<()> {
        self.descriptions
            .lock()
            .insert(index, simulator.model_description().clone());
        Ok(())
    }

    fn simulator_removed(&mut self, index: SimulatorIndex, _current_time: TimePoint) {
        self.descriptions.lock().remove(&index);
        self.pending
            .lock()
            .retain(|action| action.simulator != index);
    }

    fn step_commencing(
        &mut self,
        _current_time: TimePoint,
        simulators: &mut dyn SimulatorRegistry,
    ) -> Result<()> {
        let actions = std::mem::take(&mut *self.pending.lock());
        for action in actions {
            let simulator = simulators.simulator_mut(action.simulator).ok_or_else(|| {
                Error::invalid_structure(format!(
                    "no simulator with index {}",
                    action.simulator
                ))
            })?;
            let variable_type = action.modifier.variable_type();
            if action.is_input {
                simulator.expose_for_setting(variable_type, action.variable)?;
                match action.modifier {
                    VariableModifier::Real(m) => {
                        simulator.set_real_input_modifier(action.variable, m)?
                    }
                    VariableModifier::Integer(m) => {
                        simulator.set_integer_input_modifier(action.variable, m)?
                    }
                    VariableModifier::Boolean(m) => {
                        simulator.set_boolean_input_modifier(action.variable, m)?
                    }
                    VariableModifier::String(m) => {
                        simulator.set_string_input_modifier(action.variable, m)?
                    }
                }
            } else {
                simulator.expose_for_getting(variable_type, action.variable)?;
                match action.modifier {
                    VariableModifier::Real(m) => {
                        simulator.set_real_output_modifier(action.variable, m)?
                    }
                    VariableModifier::Integer(m) => {
                        simulator.set_integer_output_modifier(action.variable, m)?
                    }
                    VariableModifier::Boolean(m) => {
                        simulator.set_boolean_output_modifier(action.variable, m)?
                    }
                    VariableModifier::String(m) => {
                        simulator.set_string_output_modifier(action.variable, m)?
                    }
                }
            }
        }
        Ok(())
    }
}
