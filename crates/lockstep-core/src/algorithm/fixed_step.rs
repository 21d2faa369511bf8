//! A fixed-stepsize co-simulation algorithm.
//!
//! The simulation progresses at a fixed base step size. Simulators are
//! stepped in parallel on a worker pool, each at an optional integer
//! multiple of the base step (its decimation factor). Output-to-input
//! transfers happen before the parallel phase and therefore always observe
//! the values committed by the previous step, which keeps the transfer
//! deterministic regardless of thread scheduling.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

use lockstep_types::{
    Duration, Error, FunctionIndex, FunctionIoId, Node, Result, SimulatorIndex, StepNumber,
    TimePoint, VariableId, VariableType,
};
use rayon::prelude::*;
use tracing::debug;

use crate::function::Function;
use crate::registry::{FunctionTable, SimulatorTable};
use crate::simulator::{Manipulable, Observable, Simulator};
use crate::slave::StepResult;

use super::{Algorithm, LinearTransform};

struct SimInfo {
    decimation_factor: i64,
}

/// A connection targeting a simulator input.
struct SimInputConnection {
    source: SourceEndpoint,
    variable_type: VariableType,
    transform: Option<LinearTransform>,
}

enum SourceEndpoint {
    Simulator(VariableId),
    Function(FunctionIoId),
}

/// A fixed-step algorithm with per-simulator decimation and a worker pool.
pub struct FixedStepAlgorithm {
    base_step: Option<Duration>,
    start_time: TimePoint,
    stop_time: Option<TimePoint>,
    pool: rayon::ThreadPool,
    simulators: BTreeMap<SimulatorIndex, SimInfo>,
    functions: BTreeSet<FunctionIndex>,
    /// Connections keyed by the simulator input they drive.
    sim_inputs: HashMap<VariableId, SimInputConnection>,
    /// Connections keyed by the function input they drive.
    function_inputs: HashMap<FunctionIoId, VariableId>,
    initialized: bool,
    step_number: StepNumber,
}

fn build_pool(worker_thread_count: Option<usize>) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(worker_thread_count.unwrap_or(0))
        .build()
        .map_err(|e| Error::Io(io::Error::other(e)))
}

fn target_simulator<'a>(
    simulators: &'a mut SimulatorTable,
    target: VariableId,
) -> Result<&'a mut Box<dyn Simulator>> {
    simulators
        .get_mut(target.simulator)
        .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", target.simulator)))
}

impl FixedStepAlgorithm {
    /// Creates an algorithm with the given base step size.
    ///
    /// `worker_thread_count` bounds the worker pool; `None` uses the
    /// hardware concurrency.
    pub fn new(base_step: Duration, worker_thread_count: Option<usize>) -> Result<Self> {
        if !base_step.is_positive() {
            return Err(Error::logic("base step size must be positive"));
        }
        Self::with_step(Some(base_step), worker_thread_count)
    }

    /// Creates an algorithm whose base step will be taken from the first
    /// positive step size hint given to [`Algorithm::add_simulator`].
    pub fn with_default_step(worker_thread_count: Option<usize>) -> Result<Self> {
        Self::with_step(None, worker_thread_count)
    }

    fn with_step(
        base_step: Option<Duration>,
        worker_thread_count: Option<usize>,
    ) -> Result<Self> {
        Ok(FixedStepAlgorithm {
            base_step,
            start_time: TimePoint::ZERO,
            stop_time: None,
            pool: build_pool(worker_thread_count)?,
            simulators: BTreeMap::new(),
            functions: BTreeSet::new(),
            sim_inputs: HashMap::new(),
            function_inputs: HashMap::new(),
            initialized: false,
            step_number: 0,
        })
    }

    /// Returns the base step size, when configured or derived.
    pub fn base_step_size(&self) -> Option<Duration> {
        self.base_step
    }

    /// Sets the step size decimation factor for a simulator, making its
    /// effective step size `factor` times the base step. The default factor
    /// is 1. Must be called after the simulator has been added and before
    /// initialization.
    pub fn set_stepsize_decimation_factor(
        &mut self,
        simulator: SimulatorIndex,
        factor: i64,
    ) -> Result<()> {
        if factor < 1 {
            return Err(Error::logic("decimation factor must be at least 1"));
        }
        if self.initialized {
            return Err(Error::logic(
                "decimation factors cannot change after initialization",
            ));
        }
        match self.simulators.get_mut(&simulator) {
            Some(info) => {
                info.decimation_factor = factor;
                Ok(())
            }
            None => Err(Error::invalid_structure(format!(
                "no simulator with index {simulator}"
            ))),
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.initialized {
            return Err(Error::logic(
                "the system structure cannot change after initialization",
            ));
        }
        Ok(())
    }

    fn check_new_sim_input(&self, input: VariableId) -> Result<()> {
        if self.sim_inputs.contains_key(&input) {
            return Err(Error::invalid_structure(format!(
                "input variable {input} already has a source"
            )));
        }
        Ok(())
    }

    /// Transfers one value across a simulator-input connection, using the
    /// source's most recently committed value.
    fn transfer_sim_input(
        target: VariableId,
        connection: &SimInputConnection,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<()> {
        let transform = connection.transform;
        macro_rules! read_source {
            ($get:ident) => {
                match connection.source {
                    SourceEndpoint::Simulator(src) => simulators
                        .get(src.simulator)
                        .ok_or_else(|| {
                            Error::invalid_structure(format!("no simulator {}", src.simulator))
                        })?
                        .$get(src.reference)?,
                    SourceEndpoint::Function(src) => functions
                        .get(src.function)
                        .ok_or_else(|| {
                            Error::invalid_structure(format!("no function {}", src.function))
                        })?
                        .$get(src.reference)?,
                }
            };
        }
        match connection.variable_type {
            VariableType::Real => {
                let mut value = read_source!(get_real);
                if let Some(t) = transform {
                    value = t.apply(value);
                }
                target_simulator(simulators, target)?.set_real(target.reference, value)
            }
            VariableType::Integer => {
                let value = read_source!(get_integer);
                target_simulator(simulators, target)?.set_integer(target.reference, value)
            }
            VariableType::Boolean => {
                let value = read_source!(get_boolean);
                target_simulator(simulators, target)?.set_boolean(target.reference, value)
            }
            VariableType::String => {
                let value = read_source!(get_string).to_string();
                target_simulator(simulators, target)?.set_string(target.reference, &value)
            }
        }
    }

    /// Transfers one value from a simulator output to a function input.
    fn transfer_function_input(
        target: FunctionIoId,
        source: VariableId,
        simulators: &SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<()> {
        let sim = simulators
            .get(source.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", source.simulator)))?;
        let function = functions
            .get_mut(target.function)
            .ok_or_else(|| Error::invalid_structure(format!("no function {}", target.function)))?;
        match target.variable_type {
            VariableType::Real => function.set_real(target.reference, sim.get_real(source.reference)?),
            VariableType::Integer => {
                function.set_integer(target.reference, sim.get_integer(source.reference)?)
            }
            VariableType::Boolean => {
                function.set_boolean(target.reference, sim.get_boolean(source.reference)?)
            }
            VariableType::String => {
                function.set_string(target.reference, sim.get_string(source.reference)?)
            }
        }
    }

    /// Whether every connected input of `function` is driven by a simulator
    /// in `stepping`. Functions with no connected inputs are always due.
    fn function_is_due(
        &self,
        function: FunctionIndex,
        stepping: &BTreeSet<SimulatorIndex>,
    ) -> bool {
        self.function_inputs
            .iter()
            .filter(|(input, _)| input.function == function)
            .all(|(_, source)| stepping.contains(&source.simulator))
    }

    /// Evaluates a function and pushes its outputs to the simulator inputs
    /// they drive.
    fn calculate_and_push(
        &self,
        function: FunctionIndex,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<()> {
        functions
            .get_mut(function)
            .ok_or_else(|| Error::invalid_structure(format!("no function {function}")))?
            .calculate()?;
        for (&target, connection) in &self.sim_inputs {
            if matches!(connection.source, SourceEndpoint::Function(src) if src.function == function)
            {
                Self::transfer_sim_input(target, connection, simulators, functions)?;
            }
        }
        Ok(())
    }
}

impl Algorithm for FixedStepAlgorithm {
    fn add_simulator(
        &mut self,
        index: SimulatorIndex,
        simulator: &mut dyn Simulator,
        step_size_hint: Duration,
    ) -> Result<()> {
        self.ensure_mutable()?;
        if self.simulators.contains_key(&index) {
            return Err(Error::invalid_structure(format!(
                "a simulator with index {index} was already added"
            )));
        }
        if step_size_hint.is_positive() {
            match self.base_step {
                None => {
                    debug!(
                        simulator = simulator.name(),
                        "deriving base step size {} from step size hint", step_size_hint
                    );
                    self.base_step = Some(step_size_hint);
                }
                Some(base) if step_size_hint.nanos() % base.nanos() == 0 => {
                    // A matching hint would allow a decimation factor of
                    // hint/base, but the factor stays 1 until requested.
                    debug!(
                        simulator = simulator.name(),
                        factor = step_size_hint.nanos() / base.nanos(),
                        "step size hint is a multiple of the base step"
                    );
                }
                Some(base) => {
                    debug!(
                        simulator = simulator.name(),
                        "step size hint {} is not a multiple of the base step {}",
                        step_size_hint,
                        base
                    );
                }
            }
        }
        self.simulators.insert(
            index,
            SimInfo {
                decimation_factor: 1,
            },
        );
        Ok(())
    }

    fn remove_simulator(&mut self, index: SimulatorIndex) -> Result<()> {
        self.ensure_mutable()?;
        self.simulators.remove(&index);
        self.sim_inputs.retain(|target, connection| {
            target.simulator != index
                && !matches!(connection.source, SourceEndpoint::Simulator(src) if src.simulator == index)
        });
        self.function_inputs
            .retain(|_, source| source.simulator != index);
        Ok(())
    }

    fn add_function(&mut self, index: FunctionIndex, _function: &mut dyn Function) -> Result<()> {
        self.ensure_mutable()?;
        self.functions.insert(index);
        Ok(())
    }

    fn remove_function(&mut self, index: FunctionIndex) -> Result<()> {
        self.ensure_mutable()?;
        self.functions.remove(&index);
        self.function_inputs
            .retain(|target, _| target.function != index);
        self.sim_inputs.retain(|_, connection| {
            !matches!(connection.source, SourceEndpoint::Function(src) if src.function == index)
        });
        Ok(())
    }

    fn connect_variables(
        &mut self,
        output: VariableId,
        input: VariableId,
        transform: Option<LinearTransform>,
        simulators: &mut SimulatorTable,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.check_new_sim_input(input)?;
        simulators
            .get_mut(output.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", output.simulator)))?
            .expose_for_getting(output.variable_type, output.reference)?;
        simulators
            .get_mut(input.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", input.simulator)))?
            .expose_for_setting(input.variable_type, input.reference)?;
        self.sim_inputs.insert(
            input,
            SimInputConnection {
                source: SourceEndpoint::Simulator(output),
                variable_type: input.variable_type,
                transform,
            },
        );
        Ok(())
    }

    fn connect_variable_to_function(
        &mut self,
        output: VariableId,
        input: FunctionIoId,
        simulators: &mut SimulatorTable,
    ) -> Result<()> {
        self.ensure_mutable()?;
        if self.function_inputs.contains_key(&input) {
            return Err(Error::invalid_structure(format!(
                "function input {input} already has a source"
            )));
        }
        simulators
            .get_mut(output.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", output.simulator)))?
            .expose_for_getting(output.variable_type, output.reference)?;
        self.function_inputs.insert(input, output);
        Ok(())
    }

    fn connect_function_to_variable(
        &mut self,
        output: FunctionIoId,
        input: VariableId,
        transform: Option<LinearTransform>,
        simulators: &mut SimulatorTable,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.check_new_sim_input(input)?;
        simulators
            .get_mut(input.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", input.simulator)))?
            .expose_for_setting(input.variable_type, input.reference)?;
        self.sim_inputs.insert(
            input,
            SimInputConnection {
                source: SourceEndpoint::Function(output),
                variable_type: input.variable_type,
                transform,
            },
        );
        Ok(())
    }

    fn disconnect_variable(&mut self, input: VariableId) -> Result<()> {
        self.ensure_mutable()?;
        self.sim_inputs.remove(&input);
        Ok(())
    }

    fn disconnect_function_input(&mut self, input: FunctionIoId) -> Result<()> {
        self.ensure_mutable()?;
        self.function_inputs.remove(&input);
        Ok(())
    }

    fn setup(&mut self, start_time: TimePoint, stop_time: Option<TimePoint>) {
        self.start_time = start_time;
        self.stop_time = stop_time;
    }

    fn initialize(
        &mut self,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<()> {
        if self.base_step.is_none() {
            return Err(Error::logic(
                "no base step size was configured and no step size hint provided one",
            ));
        }
        for (_, sim) in simulators.iter_mut() {
            sim.setup(self.start_time, self.stop_time, None)?;
        }
        // One propagation pass: push seeded inputs, pull the resulting
        // outputs, and stage them on the connected inputs so the first
        // macro step transfers consistent values. Cyclic graphs have no
        // stable fixed point to iterate towards, so the pass count is one;
        // acyclic chains settle over the first few macro steps.
        for (_, sim) in simulators.iter_mut() {
            sim.do_iteration()?;
        }
        for (&target, connection) in &self.sim_inputs {
            if matches!(connection.source, SourceEndpoint::Simulator(_)) {
                Self::transfer_sim_input(target, connection, simulators, functions)?;
            }
        }
        for (_, sim) in simulators.iter_mut() {
            sim.start_simulation()?;
        }
        self.initialized = true;
        self.step_number = 0;
        debug!(simulators = simulators.len(), "simulation initialized");
        Ok(())
    }

    fn do_step(
        &mut self,
        current_t: TimePoint,
        simulators: &mut SimulatorTable,
        functions: &mut FunctionTable,
    ) -> Result<(Duration, BTreeSet<SimulatorIndex>)> {
        if !self.initialized {
            return Err(Error::logic("do_step called before initialize"));
        }
        let base = self.base_step.expect("initialized implies a base step");

        let stepping: BTreeSet<SimulatorIndex> = self
            .simulators
            .iter()
            .filter(|(_, info)| self.step_number % info.decimation_factor == 0)
            .map(|(&i, _)| i)
            .collect();

        // Transfer committed outputs to the inputs of everything that is
        // about to be stepped or evaluated.
        for (&target, connection) in &self.sim_inputs {
            if stepping.contains(&target.simulator)
                && matches!(connection.source, SourceEndpoint::Simulator(_))
            {
                Self::transfer_sim_input(target, connection, simulators, functions)?;
            }
        }
        for (&target, &source) in &self.function_inputs {
            if stepping.contains(&source.simulator) {
                Self::transfer_function_input(target, source, simulators, functions)?;
            }
        }

        // Parallel phase: one worker per due simulator.
        let decimation: HashMap<SimulatorIndex, i64> = self
            .simulators
            .iter()
            .map(|(&i, info)| (i, info.decimation_factor))
            .collect();
        let mut due: Vec<(SimulatorIndex, Duration, &mut Box<dyn Simulator>)> = simulators
            .iter_mut()
            .filter(|(i, _)| stepping.contains(i))
            .map(|(i, sim)| (i, base * decimation[&i], sim))
            .collect();
        let results: Vec<(SimulatorIndex, String, Result<StepResult>)> =
            self.pool.install(|| {
                due.par_iter_mut()
                    .map(|(index, delta_t, sim)| {
                        let name = sim.name().to_string();
                        let result = sim.do_step(current_t, *delta_t);
                        (*index, name, result)
                    })
                    .collect()
            });
        drop(due);

        for (index, name, result) in results {
            match result {
                Ok(StepResult::Complete) => {}
                Ok(StepResult::Failed) => {
                    return Err(Error::model_in(
                        name,
                        format!("simulator {index} failed to complete its step at {current_t}"),
                    ));
                }
                Err(Error::Model { simulator, message }) => {
                    return Err(Error::Model {
                        simulator: simulator.or(Some(name)),
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // Synchronous function phase.
        let function_indices: Vec<FunctionIndex> = self.functions.iter().copied().collect();
        for function in function_indices {
            if self.function_is_due(function, &stepping) {
                self.calculate_and_push(function, simulators, functions)?;
            }
        }

        self.step_number += 1;
        Ok((base, stepping))
    }

    fn export_current_state(&self) -> Result<Node> {
        let mut factors = BTreeMap::new();
        for (&index, info) in &self.simulators {
            factors.insert(index.to_string(), Node::I64(info.decimation_factor));
        }
        let mut state = BTreeMap::new();
        state.insert("step_number".to_string(), Node::I64(self.step_number));
        state.insert("decimation_factors".to_string(), Node::Map(factors));
        Ok(Node::Map(state))
    }

    fn import_state(&mut self, state: &Node) -> Result<()> {
        let malformed = || Error::logic("malformed fixed-step algorithm state");
        let step_number = state
            .get("step_number")
            .and_then(Node::as_i64)
            .ok_or_else(malformed)?;
        let factors = state
            .get("decimation_factors")
            .and_then(Node::as_map)
            .ok_or_else(malformed)?;
        let mut parsed = BTreeMap::new();
        for (key, value) in factors {
            let index: SimulatorIndex = key.parse().map_err(|_| malformed())?;
            let factor = value.as_i64().filter(|&f| f >= 1).ok_or_else(malformed)?;
            parsed.insert(index, factor);
        }
        for (index, factor) in parsed {
            if let Some(info) = self.simulators.get_mut(&index) {
                info.decimation_factor = factor;
            }
        }
        self.step_number = step_number;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
