//! Executes a [`Scenario`] against a running simulation.

use std::collections::BTreeMap;

use lockstep_types::{Error, Result, SimulatorIndex, TimePoint, ValueReference, VariableType};
use tracing::info;

use crate::registry::SimulatorRegistry;
use crate::simulator::{Manipulable, Observable};

use super::scenario::{Event, Scenario, VariableAction, VariableModifier};
use super::Manipulator;

/// Identifies a modifier that a scenario installed, so it can be reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstalledModifier {
    simulator: SimulatorIndex,
    variable: ValueReference,
    variable_type: VariableType,
    is_input: bool,
}

#[derive(Default)]
struct ScenarioState {
    remaining: BTreeMap<usize, Event>,
    executed: Vec<InstalledModifier>,
    start_time: TimePoint,
    end: Option<lockstep_types::Duration>,
    running: bool,
    previous_step_time: Option<TimePoint>,
}

/// A manipulator that runs timed scenario events and reverts every
/// modifier it installed when the scenario completes or is aborted.
#[derive(Default)]
pub struct ScenarioManager {
    state: ScenarioState,
    abort_pending: bool,
}

fn install(
    simulators: &mut dyn SimulatorRegistry,
    action: VariableAction,
) -> Result<InstalledModifier> {
    let simulator = simulators.simulator_mut(action.simulator).ok_or_else(|| {
        Error::invalid_structure(format!("no simulator with index {}", action.simulator))
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
    Ok(InstalledModifier {
        simulator: action.simulator,
        variable: action.variable,
        variable_type,
        is_input: action.is_input,
    })
}

fn revert(simulators: &mut dyn SimulatorRegistry, installed: InstalledModifier) {
    let Some(simulator) = simulators.simulator_mut(installed.simulator) else {
        return;
    };
    // Clearing an already-clear modifier is a no-op, which keeps the
    // cleanup idempotent.
    let result = if installed.is_input {
        match installed.variable_type {
            VariableType::Real => simulator.set_real_input_modifier(installed.variable, None),
            VariableType::Integer => {
                simulator.set_integer_input_modifier(installed.variable, None)
            }
            VariableType::Boolean => {
                simulator.set_boolean_input_modifier(installed.variable, None)
            }
            VariableType::String => simulator.set_string_input_modifier(installed.variable, None),
        }
    } else {
        match installed.variable_type {
            VariableType::Real => simulator.set_real_output_modifier(installed.variable, None),
            VariableType::Integer => {
                simulator.set_integer_output_modifier(installed.variable, None)
            }
            VariableType::Boolean => {
                simulator.set_boolean_output_modifier(installed.variable, None)
            }
            VariableType::String => {
                simulator.set_string_output_modifier(installed.variable, None)
            }
        }
    };
    if result.is_err() {
        info!(
            simulator = installed.simulator,
            variable = installed.variable,
            "could not reset a scenario-modified variable"
        );
    }
}

impl ScenarioManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a scenario. Event trigger times are taken relative to
    /// `current_time`. Replaces any previously loaded scenario without
    /// reverting its modifiers; call [`ScenarioManager::abort_scenario`]
    /// first to revert.
    pub fn load_scenario(&mut self, scenario: Scenario, current_time: TimePoint) {
        let mut state = ScenarioState {
            start_time: current_time,
            end: scenario.end,
            running: true,
            ..ScenarioState::default()
        };
        for (index, event) in scenario.events.into_iter().enumerate() {
            state.remaining.insert(index, event);
        }
        self.state = state;
        info!("successfully loaded scenario");
    }

    /// Whether a scenario is loaded and has not yet finished.
    pub fn is_scenario_running(&self) -> bool {
        self.state.running
    }

    /// Stops the scenario. No further events fire, and every modifier it
    /// installed is reverted at the next step commencement.
    pub fn abort_scenario(&mut self) {
        info!("scenario aborted, cleanup happens at the next step");
        self.state.running = false;
        self.state.remaining.clear();
        self.abort_pending = true;
    }
}

impl Manipulator for ScenarioManager {
    fn simulator_removed(&mut self, index: SimulatorIndex, _current_time: TimePoint) {
        self.state
            .remaining
            .retain(|_, event| event.action.simulator != index);
        self.state
            .executed
            .retain(|installed| installed.simulator != index);
    }

    fn step_commencing(
        &mut self,
        current_time: TimePoint,
        simulators: &mut dyn SimulatorRegistry,
    ) -> Result<()> {
        if self.abort_pending {
            self.abort_pending = false;
            let executed = std::mem::take(&mut self.state.executed);
            for installed in executed {
                revert(simulators, installed);
            }
        }
        if !self.state.running {
            return Ok(());
        }
        let relative_time = current_time - self.state.start_time;

        let timed_out = self.state.end.is_none_or(|end| relative_time >= end);
        if self.state.remaining.is_empty() && timed_out {
            info!(
                "scenario finished at relative time {}, performing cleanup",
                relative_time
            );
            self.state.running = false;
            let executed = std::mem::take(&mut self.state.executed);
            for installed in executed {
                revert(simulators, installed);
            }
            return Ok(());
        }

        // An event takes effect on the step that reaches its trigger time,
        // so the window extends to the end of the imminent step. The step
        // length is estimated from the previous step commencement.
        let step_estimate = self
            .state
            .previous_step_time
            .map(|previous| current_time - previous)
            .unwrap_or(lockstep_types::Duration::ZERO);
        self.state.previous_step_time = Some(current_time);
        let horizon = relative_time + step_estimate;
        let due: Vec<usize> = self
            .state
            .remaining
            .iter()
            .filter(|(_, event)| horizon >= event.time)
            .map(|(&index, _)| index)
            .collect();
        for index in due {
            let event = self
                .state
                .remaining
                .remove(&index)
                .expect("due event exists");
            info!(
                simulator = event.action.simulator,
                variable = event.action.variable,
                "executing scenario action at relative time {}",
                relative_time
            );
            let installed = install(simulators, event.action)?;
            self.state.executed.push(installed);
        }
        Ok(())
    }
}
