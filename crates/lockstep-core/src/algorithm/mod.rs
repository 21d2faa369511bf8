//! Co-simulation algorithms.
//!
//! An algorithm is responsible for transferring output values to connected
//! input variables and for stepping simulators. The methods are called in a
//! fixed order: entity and connection registration, then `setup`, then
//! `initialize`, then `do_step` repeatedly. No entities or connections are
//! added or removed after `initialize`.
//!
//! The algorithm never owns the entities it drives; the execution owns them
//! and lends the tables to each call.

pub mod fixed_step;

use std::any::Any;
use std::collections::BTreeSet;

use lockstep_types::{
    Duration, FunctionIndex, FunctionIoId, Node, Result, SimulatorIndex, TimePoint, VariableId,
};
use serde::{Deserialize, Serialize};

use crate::function::Function;
use crate::registry::{FunctionTable, SimulatorTable};
use crate::simulator::Simulator;

pub use fixed_step::FixedStepAlgorithm;

/// A linear value transform `y = factor * x + offset`, attachable to
/// connections between real variables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTransform {
    pub factor: f64,
    pub offset: f64,
}

impl LinearTransform {
    /// The identity transform.
    pub const IDENTITY: LinearTransform = LinearTransform {
        factor: 1.0,
        offset: 0.0,
    };

    /// Applies the transform to a value.
    pub fn apply(&self, value: f64) -> f64 {
        self.factor * value + self.offset
    }
}

/// The capability implemented by co-simulation algorithms.
///
/// Only the fixed-step variant ships with this crate, but the execution
/// facade is written against this trait so alternatives can slot in.
pub trait Algorithm: Send {
    /// Registers a simulator under `index`.
    ///
    /// `step_size_hint` is the recommended co-simulation step size for this
    /// simulator; the algorithm is free to choose whether and how it is
    /// taken into account. Zero means no recommendation.
    fn add_simulator(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Simulator,
        step_size_hint: Duration,
    ) -> Result<()>;

    /// Removes a simulator and all connections incident to its variables.
    fn remove_simulator(&mut self, index: SimulatorIndex) -> Result<()>;

    /// Registers a function under `index`.
    fn add_function(&mut self, index: FunctionIndex, function: &mut dyn Function) -> Result<()>;

    /// Removes a function and all connections incident to its variables.
    fn remove_function(&mut self, index: FunctionIndex) -> Result<()>;

    /// Connects a simulator output to a simulator input. The input may have
    /// at most one source. A transform may be attached when both variables
    /// are of real type.
    fn connect_variables(
        &mut self,
        output: VariableId,
        input: VariableId,
        transform: Option<LinearTransform>,
        simulators: &mut SimulatorTable,
    ) -> Result<()>;

    /// Connects a simulator output to a function input.
    fn connect_variable_to_function(
        &mut self,
        output: VariableId,
        input: FunctionIoId,
        simulators: &mut SimulatorTable,
    ) -> Result<()>;

    /// Connects a function output to a simulator input.
    fn connect_function_to_variable(
        &mut self,
        output: FunctionIoId,
        input: VariableId,
        transform: Option<LinearTransform>,
        simulators: &mut SimulatorTable,
    ) -> Result<()>;

    /// Breaks the connection to a simulator input, if any.
    fn disconnect_variable(&mut self, input: VariableId) -> Result<()>;

    /// Breaks the connection to a function input, if any.
    fn disconnect_function_input(&mut self, input: FunctionIoId) -> Result<()>;

    /// Stores the simulation start and stop times. Called before
    /// `initialize`.
    fn setup(&mut self, start_time: TimePoint, stop_time: Option<TimePoint>);

    /// Initializes the co-simulation: sets up every simulator, iterates the
    /// initial value propagation to a fixed point or a bound, and starts
    /// the simulation on every simulator.
    fn initialize(
        &mut self,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<()>;

    /// Performs a single macro step starting at `current_t`. Returns the
    /// step length and the set of simulators that were stepped.
    fn do_step(
        &mut self,
        current_t: TimePoint,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<(Duration, BTreeSet<SimulatorIndex>)>;

    /// Exports the algorithm's internal state (step bookkeeping, not system
    /// structure) as a serializable tree.
    fn export_current_state(&self) -> Result<Node>;

    /// Imports a previously exported algorithm state. The system structure
    /// is assumed to be unchanged or already restored. Never called before
    /// `initialize`.
    fn import_state(&mut self, state: &Node) -> Result<()>;

    /// Returns the algorithm as [`Any`], so algorithm-specific
    /// configuration (e.g. fixed-step decimation factors) stays reachable
    /// after the algorithm has been handed to an execution.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
