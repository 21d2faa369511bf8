//! The execution facade: the top-level owner of a co-simulation run.
//!
//! An [`Execution`] composes the algorithm, the slave wrappers, the
//! function instances, observers, manipulators and the real-time pacer,
//! and exposes the high-level API for building the system and driving it
//! forward in time.
//!
//! The stepping state lives in an internal kernel behind a mutex. Manual
//! stepping locks the kernel per call; [`Execution::simulate_until`] hands
//! it to a background driver thread, which re-acquires it for every macro
//! step so that lock-free accessors ([`Execution::current_time`],
//! [`Execution::stop_simulation`], the real-time controls) stay responsive
//! while the simulation runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use lockstep_types::{
    Causality, Duration, Error, FunctionIndex, FunctionIoId, Node, Result, SimulatorIndex,
    StateIndex, StepNumber, TimePoint, ValueReference, VariableId, VariableType,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::algorithm::{Algorithm, FixedStepAlgorithm, LinearTransform};
use crate::config::ExecutionConfig;
use crate::function::Function;
use crate::manipulator::Manipulator;
use crate::observer::Observer;
use crate::registry::{FunctionTable, SimulatorTable};
use crate::simulator::{Manipulable, Observable, Simulator, SlaveSimulator};
use crate::slave::Slave;
use crate::timer::{RealTimeConfig, RealTimeTimer};

/// One saved simulation state: the algorithm payload plus a state handle
/// per slave.
struct SavedState {
    algorithm: Node,
    slaves: BTreeMap<SimulatorIndex, StateIndex>,
    time: TimePoint,
    step_number: StepNumber,
}

struct Kernel {
    simulators: SimulatorTable,
    functions: FunctionTable,
    algorithm: Box<dyn Algorithm>,
    observers: Vec<Arc<Mutex<dyn Observer>>>,
    manipulators: Vec<Arc<Mutex<dyn Manipulator>>>,
    timer: RealTimeTimer,
    start_time: TimePoint,
    stop_time: Option<TimePoint>,
    current_time: TimePoint,
    step_number: StepNumber,
    initialized: bool,
    errored: bool,
    saved_states: Vec<Option<SavedState>>,
}

impl Kernel {
    fn initialize(&mut self) -> Result<()> {
        self.algorithm.setup(self.start_time, self.stop_time);
        self.algorithm
            .initialize(&mut self.simulators, &mut self.functions)?;
        self.initialized = true;
        self.timer.start(self.current_time);
        for observer in &self.observers {
            observer
                .lock()
                .simulation_initialized(self.step_number, self.current_time)?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Duration> {
        if self.errored {
            return Err(Error::logic(
                "the execution is in an error state and cannot step further",
            ));
        }
        if !self.initialized {
            self.initialize()?;
        }
        for manipulator in &self.manipulators {
            manipulator
                .lock()
                .step_commencing(self.current_time, &mut self.simulators)?;
        }
        let (step_size, stepped) = match self.algorithm.do_step(
            self.current_time,
            &mut self.simulators,
            &mut self.functions,
        ) {
            Ok(result) => result,
            Err(e) => {
                if e.is_fatal() {
                    self.errored = true;
                }
                return Err(e);
            }
        };
        self.current_time += step_size;
        self.step_number += 1;
        for &index in &stepped {
            if let Some(simulator) = self.simulators.get(index) {
                for observer in &self.observers {
                    observer.lock().simulator_step_complete(
                        index,
                        self.step_number,
                        step_size,
                        self.current_time,
                        simulator,
                    );
                }
            }
        }
        for observer in &self.observers {
            observer
                .lock()
                .step_complete(self.step_number, step_size, self.current_time);
        }
        self.timer.sleep(self.current_time);
        Ok(step_size)
    }

    fn validate_readable(&self, id: VariableId) -> Result<()> {
        self.validate_variable(id, false)
    }

    fn validate_writable(&self, id: VariableId) -> Result<()> {
        self.validate_variable(id, true)
    }

    fn validate_variable(&self, id: VariableId, writing: bool) -> Result<()> {
        let simulator = self
            .simulators
            .get(id.simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {}", id.simulator)))?;
        let variable = simulator
            .model_description()
            .find_variable_by_ref(id.variable_type, id.reference)
            .ok_or_else(|| {
                Error::invalid_structure(format!(
                    "simulator '{}' has no variable {id}",
                    simulator.name()
                ))
            })?;
        if writing && !variable.causality.is_writable() {
            return Err(Error::invalid_structure(format!(
                "variable {id} has causality {} and cannot be driven",
                variable.causality
            )));
        }
        if !writing && !variable.causality.is_readable() {
            return Err(Error::invalid_structure(format!(
                "variable {id} has causality {} and cannot be read",
                variable.causality
            )));
        }
        Ok(())
    }

    /// Checks that a function variable exists with the given type and
    /// causality.
    fn validate_function_io(&self, id: FunctionIoId, causality: Causality) -> Result<()> {
        let function = self
            .functions
            .get(id.function)
            .ok_or_else(|| Error::invalid_structure(format!("no function {}", id.function)))?;
        let io = function.description().find_io(id.reference).ok_or_else(|| {
            Error::invalid_structure(format!("function variable {id} does not exist"))
        })?;
        if io.io_type != id.variable_type {
            return Err(Error::invalid_structure(format!(
                "function variable {id} has type {}",
                io.io_type
            )));
        }
        if io.causality != causality {
            return Err(Error::invalid_structure(format!(
                "function variable {id} has causality {}",
                io.causality
            )));
        }
        Ok(())
    }

    fn save_state(&mut self) -> Result<StateIndex> {
        if !self.initialized {
            return Err(Error::logic(
                "the simulation state cannot be saved before initialization",
            ));
        }
        if self.errored {
            return Err(Error::logic("the execution is in an error state"));
        }
        let indices: Vec<SimulatorIndex> = self.simulators.indices().collect();
        let mut slaves = BTreeMap::new();
        for index in indices {
            let result = self
                .simulators
                .get_mut(index)
                .expect("index taken from the table")
                .save_state();
            match result {
                Ok(state) => {
                    slaves.insert(index, state);
                }
                Err(e) => {
                    for (&i, &state) in &slaves {
                        if let Some(simulator) = self.simulators.get_mut(i) {
                            let _ = simulator.release_state(state);
                        }
                    }
                    return Err(e);
                }
            }
        }
        let entry = SavedState {
            algorithm: self.algorithm.export_current_state()?,
            slaves,
            time: self.current_time,
            step_number: self.step_number,
        };
        let index = match self.saved_states.iter().position(Option::is_none) {
            Some(slot) => {
                self.saved_states[slot] = Some(entry);
                slot
            }
            None => {
                self.saved_states.push(Some(entry));
                self.saved_states.len() - 1
            }
        };
        debug!(handle = index, time = %self.current_time, "saved simulation state");
        Ok(index as StateIndex)
    }

    fn saved_state(&self, index: StateIndex) -> Result<&SavedState> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.saved_states.get(i))
            .and_then(Option::as_ref)
            .ok_or(Error::StateIndexInvalid(index))
    }

    fn restore_state(&mut self, index: StateIndex) -> Result<()> {
        let entry = self.saved_state(index)?;
        let slaves = entry.slaves.clone();
        let algorithm_state = entry.algorithm.clone();
        let time = entry.time;
        let step_number = entry.step_number;

        for (&simulator_index, &state) in &slaves {
            self.simulators
                .get_mut(simulator_index)
                .ok_or_else(|| {
                    Error::invalid_structure(format!(
                        "saved state refers to missing simulator {simulator_index}"
                    ))
                })?
                .restore_state(state)?;
        }
        self.algorithm.import_state(&algorithm_state)?;
        self.current_time = time;
        self.step_number = step_number;
        self.errored = false;
        for observer in &self.observers {
            observer
                .lock()
                .state_restored(self.step_number, self.current_time, &self.simulators)?;
        }
        debug!(handle = index, time = %self.current_time, "restored simulation state");
        Ok(())
    }

    fn release_state(&mut self, index: StateIndex) -> Result<()> {
        self.saved_state(index)?;
        let entry = self.saved_states[index as usize]
            .take()
            .expect("checked above");
        for (&simulator_index, &state) in &entry.slaves {
            if let Some(simulator) = self.simulators.get_mut(simulator_index) {
                let _ = simulator.release_state(state);
            }
        }
        Ok(())
    }

    fn modified_variables(&self) -> Vec<VariableId> {
        let mut result = Vec::new();
        for (index, simulator) in self.simulators.iter() {
            for &reference in simulator.modified_real_variables() {
                result.push(VariableId {
                    simulator: index,
                    variable_type: VariableType::Real,
                    reference,
                });
            }
            for &reference in simulator.modified_integer_variables() {
                result.push(VariableId {
                    simulator: index,
                    variable_type: VariableType::Integer,
                    reference,
                });
            }
            for &reference in simulator.modified_boolean_variables() {
                result.push(VariableId {
                    simulator: index,
                    variable_type: VariableType::Boolean,
                    reference,
                });
            }
            for &reference in simulator.modified_string_variables() {
                result.push(VariableId {
                    simulator: index,
                    variable_type: VariableType::String,
                    reference,
                });
            }
        }
        result
    }
}

/// The result handle of a background simulation run started with
/// [`Execution::simulate_until`].
pub struct SimulationHandle {
    receiver: mpsc::Receiver<Result<bool>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SimulationHandle {
    /// Blocks until the run ends. Returns `true` when the target time was
    /// reached, `false` when the run was stopped early.
    pub fn join(mut self) -> Result<bool> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| Error::logic("the simulation driver thread terminated abnormally"));
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result?
    }

    /// Returns the run result if it is already available, without blocking.
    pub fn try_result(&self) -> Option<Result<bool>> {
        self.receiver.try_recv().ok()
    }
}

/// A co-simulation run.
pub struct Execution {
    kernel: Arc<Mutex<Kernel>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    current_time_nanos: Arc<AtomicI64>,
    real_time: RealTimeConfig,
}

impl Execution {
    /// Creates an execution starting at `start_time`, driven by the given
    /// algorithm. One algorithm object may only be used with one execution.
    pub fn new(start_time: TimePoint, algorithm: Box<dyn Algorithm>) -> Execution {
        let timer = RealTimeTimer::new();
        let real_time = timer.config();
        Execution {
            kernel: Arc::new(Mutex::new(Kernel {
                simulators: SimulatorTable::new(),
                functions: FunctionTable::new(),
                algorithm,
                observers: Vec::new(),
                manipulators: Vec::new(),
                timer,
                start_time,
                stop_time: None,
                current_time: start_time,
                step_number: 0,
                initialized: false,
                errored: false,
                saved_states: Vec::new(),
            })),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            current_time_nanos: Arc::new(AtomicI64::new(start_time.nanos())),
            real_time: real_time.clone(),
        }
    }

    /// Creates an execution with a fixed-step algorithm from a
    /// configuration.
    pub fn with_config(config: ExecutionConfig) -> Result<Execution> {
        config.validate()?;
        let algorithm = FixedStepAlgorithm::new(
            config.base_step_size,
            config.worker_thread_count.map(|n| n as usize),
        )?;
        let execution = Execution::new(config.start_time, Box::new(algorithm));
        execution.kernel.lock().stop_time = config.stop_time;
        execution
            .real_time
            .set_real_time_factor_target(config.real_time.factor_target)?;
        execution
            .real_time
            .set_steps_to_monitor(config.real_time.steps_to_monitor)?;
        if config.real_time.enabled {
            execution.real_time.enable_real_time_simulation();
        }
        Ok(execution)
    }

    fn lock_for_mutation(&self) -> Result<parking_lot::MutexGuard<'_, Kernel>> {
        if self.is_running() {
            return Err(Error::logic(
                "the system cannot be modified while a simulation run is in progress",
            ));
        }
        Ok(self.kernel.lock())
    }

    /// Adds a slave to the execution under an execution-specific name and
    /// returns its index. `step_size_hint` is passed to the algorithm;
    /// zero means no recommendation.
    pub fn add_slave(
        &self,
        slave: Box<dyn Slave>,
        name: &str,
        step_size_hint: Duration,
    ) -> Result<SimulatorIndex> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if kernel.simulators.iter().any(|(_, s)| s.name() == name) {
            return Err(Error::invalid_structure(format!(
                "a simulator named '{name}' was already added"
            )));
        }
        let index = kernel
            .simulators
            .insert(Box::new(SlaveSimulator::new(slave, name)));
        let result = kernel.algorithm.add_simulator(
            index,
            kernel
                .simulators
                .get_mut(index)
                .expect("just inserted")
                .as_mut(),
            step_size_hint,
        );
        if let Err(e) = result {
            kernel.simulators.remove(index);
            return Err(e);
        }
        let current_time = kernel.current_time;
        for observer in &kernel.observers {
            observer.lock().simulator_added(
                index,
                kernel.simulators.get_mut(index).expect("present").as_mut(),
                current_time,
            )?;
        }
        for manipulator in &kernel.manipulators {
            manipulator.lock().simulator_added(
                index,
                kernel.simulators.get_mut(index).expect("present").as_mut(),
                current_time,
            )?;
        }
        Ok(index)
    }

    /// Removes a slave and all connections incident to its variables.
    pub fn remove_slave(&self, index: SimulatorIndex) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if !kernel.simulators.contains(index) {
            return Err(Error::invalid_structure(format!("no simulator {index}")));
        }
        kernel.algorithm.remove_simulator(index)?;
        kernel.simulators.remove(index);
        let current_time = kernel.current_time;
        for observer in &kernel.observers {
            observer.lock().simulator_removed(index, current_time);
        }
        for manipulator in &kernel.manipulators {
            manipulator.lock().simulator_removed(index, current_time);
        }
        Ok(())
    }

    /// Adds a function to the execution and returns its index.
    pub fn add_function(&self, function: Box<dyn Function>) -> Result<FunctionIndex> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        let index = kernel.functions.insert(function);
        let result = kernel.algorithm.add_function(
            index,
            kernel
                .functions
                .get_mut(index)
                .expect("just inserted")
                .as_mut(),
        );
        if let Err(e) = result {
            kernel.functions.remove(index);
            return Err(e);
        }
        Ok(index)
    }

    /// Removes a function and all connections incident to its variables.
    pub fn remove_function(&self, index: FunctionIndex) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if !kernel.functions.contains(index) {
            return Err(Error::invalid_structure(format!("no function {index}")));
        }
        kernel.algorithm.remove_function(index)?;
        kernel.functions.remove(index);
        Ok(())
    }

    /// Adds an observer. The observer is immediately notified of every
    /// simulator already in the execution.
    pub fn add_observer(&self, observer: Arc<Mutex<dyn Observer>>) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        {
            let mut locked = observer.lock();
            let indices: Vec<SimulatorIndex> = kernel.simulators.indices().collect();
            for index in indices {
                locked.simulator_added(
                    index,
                    kernel.simulators.get_mut(index).expect("present").as_mut(),
                    kernel.current_time,
                )?;
            }
        }
        kernel.observers.push(observer);
        Ok(())
    }

    /// Adds a manipulator. The manipulator is immediately notified of every
    /// simulator already in the execution.
    pub fn add_manipulator(&self, manipulator: Arc<Mutex<dyn Manipulator>>) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        {
            let mut locked = manipulator.lock();
            let indices: Vec<SimulatorIndex> = kernel.simulators.indices().collect();
            for index in indices {
                locked.simulator_added(
                    index,
                    kernel.simulators.get_mut(index).expect("present").as_mut(),
                    kernel.current_time,
                )?;
            }
        }
        kernel.manipulators.push(manipulator);
        Ok(())
    }

    /// Connects a simulator output variable to a simulator input variable.
    /// The values of the output will be transferred to the input at every
    /// communication point of the input's owner.
    pub fn connect_variables(&self, output: VariableId, input: VariableId) -> Result<()> {
        self.connect_variables_inner(output, input, None)
    }

    /// Like [`Execution::connect_variables`], with a linear transform
    /// `y = factor * x + offset` applied at transfer time. Only real
    /// variables can carry a transform.
    pub fn connect_variables_with_transform(
        &self,
        output: VariableId,
        input: VariableId,
        transform: LinearTransform,
    ) -> Result<()> {
        self.connect_variables_inner(output, input, Some(transform))
    }

    fn connect_variables_inner(
        &self,
        output: VariableId,
        input: VariableId,
        transform: Option<LinearTransform>,
    ) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if output.variable_type != input.variable_type {
            return Err(Error::invalid_structure(format!(
                "cannot connect {output} to {input}: variable types differ"
            )));
        }
        if transform.is_some() && input.variable_type != VariableType::Real {
            return Err(Error::invalid_structure(
                "linear transforms only apply to connections between real variables",
            ));
        }
        kernel.validate_readable(output)?;
        kernel.validate_writable(input)?;
        kernel
            .algorithm
            .connect_variables(output, input, transform, &mut kernel.simulators)?;
        let current_time = kernel.current_time;
        for observer in &kernel.observers {
            observer
                .lock()
                .variables_connected(output, input, current_time);
        }
        Ok(())
    }

    /// Connects a simulator output variable to a function input variable.
    pub fn connect_variable_to_function(
        &self,
        output: VariableId,
        input: FunctionIoId,
    ) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if output.variable_type != input.variable_type {
            return Err(Error::invalid_structure(format!(
                "cannot connect {output} to {input}: variable types differ"
            )));
        }
        kernel.validate_readable(output)?;
        kernel.validate_function_io(input, Causality::Input)?;
        kernel
            .algorithm
            .connect_variable_to_function(output, input, &mut kernel.simulators)
    }

    /// Connects a function output variable to a simulator input variable,
    /// optionally with a linear transform on real values.
    pub fn connect_function_to_variable(
        &self,
        output: FunctionIoId,
        input: VariableId,
        transform: Option<LinearTransform>,
    ) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if output.variable_type != input.variable_type {
            return Err(Error::invalid_structure(format!(
                "cannot connect {output} to {input}: variable types differ"
            )));
        }
        if transform.is_some() && input.variable_type != VariableType::Real {
            return Err(Error::invalid_structure(
                "linear transforms only apply to connections between real variables",
            ));
        }
        kernel.validate_function_io(output, Causality::Output)?;
        kernel.validate_writable(input)?;
        kernel
            .algorithm
            .connect_function_to_variable(output, input, transform, &mut kernel.simulators)
    }

    /// Breaks the connection to a simulator input variable.
    pub fn disconnect_variable(&self, input: VariableId) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        kernel.algorithm.disconnect_variable(input)?;
        let current_time = kernel.current_time;
        for observer in &kernel.observers {
            observer.lock().variable_disconnected(input, current_time);
        }
        Ok(())
    }

    /// Breaks the connection to a function input variable.
    pub fn disconnect_function_input(&self, input: FunctionIoId) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        guard.algorithm.disconnect_function_input(input)
    }

    fn set_initial_value<T>(
        &self,
        simulator: SimulatorIndex,
        variable_type: VariableType,
        reference: ValueReference,
        set: impl FnOnce(&mut dyn Simulator, ValueReference, T) -> Result<()>,
        value: T,
    ) -> Result<()> {
        let mut guard = self.lock_for_mutation()?;
        let kernel = &mut *guard;
        if kernel.initialized {
            return Err(Error::logic(
                "initial values must be set before the simulation is started",
            ));
        }
        let sim = kernel
            .simulators
            .get_mut(simulator)
            .ok_or_else(|| Error::invalid_structure(format!("no simulator {simulator}")))?;
        sim.expose_for_setting(variable_type, reference)?;
        set(sim.as_mut(), reference, value)
    }

    /// Sets the initial value of a real variable. Must be called before
    /// the simulation is started.
    pub fn set_real_initial_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
        value: f64,
    ) -> Result<()> {
        self.set_initial_value(simulator, VariableType::Real, reference, |s, r, v| {
            s.set_real(r, v)
        }, value)
    }

    /// Sets the initial value of an integer variable.
    pub fn set_integer_initial_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
        value: i32,
    ) -> Result<()> {
        self.set_initial_value(simulator, VariableType::Integer, reference, |s, r, v| {
            s.set_integer(r, v)
        }, value)
    }

    /// Sets the initial value of a boolean variable.
    pub fn set_boolean_initial_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
        value: bool,
    ) -> Result<()> {
        self.set_initial_value(simulator, VariableType::Boolean, reference, |s, r, v| {
            s.set_boolean(r, v)
        }, value)
    }

    /// Sets the initial value of a string variable.
    pub fn set_string_initial_value(
        &self,
        simulator: SimulatorIndex,
        reference: ValueReference,
        value: &str,
    ) -> Result<()> {
        self.set_initial_value(simulator, VariableType::String, reference, |s, r, v| {
            s.set_string(r, v)
        }, value)
    }

    /// Advances the co-simulation by one macro step and returns its
    /// duration. The first call initializes the simulation.
    pub fn step(&self) -> Result<Duration> {
        if self.is_running() {
            return Err(Error::logic(
                "cannot step manually while a simulation run is in progress",
            ));
        }
        let mut kernel = self.kernel.lock();
        let result = kernel.step();
        self.current_time_nanos
            .store(kernel.current_time.nanos(), Ordering::Release);
        result
    }

    /// Advances the co-simulation on a background thread until
    /// `target_time` is reached (within one percent of a step), until
    /// [`Execution::stop_simulation`] is called, or until a fatal error
    /// occurs. At most one run may be in flight per execution.
    pub fn simulate_until(&self, target_time: Option<TimePoint>) -> Result<SimulationHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::logic(
                "another simulation run is already in progress",
            ));
        }
        if let Some(target) = target_time {
            if target <= self.current_time() {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::logic(
                    "the target time must be ahead of the current time",
                ));
            }
        }
        self.stop.store(false, Ordering::SeqCst);

        let kernel = Arc::clone(&self.kernel);
        let running = Arc::clone(&self.running);
        let stop = Arc::clone(&self.stop);
        let current_time_nanos = Arc::clone(&self.current_time_nanos);
        let (sender, receiver) = mpsc::channel();

        let thread = thread::spawn(move || {
            let result = loop {
                if stop.load(Ordering::SeqCst) {
                    break Ok(false);
                }
                // Re-acquire per step so configuration reads stay cheap and
                // the stop flag is honored between macro steps.
                let mut guard = kernel.lock();
                match guard.step() {
                    Ok(step_size) => {
                        current_time_nanos.store(guard.current_time.nanos(), Ordering::Release);
                        if let Some(target) = target_time {
                            let epsilon = step_size / 100;
                            if guard.current_time + epsilon >= target {
                                break Ok(true);
                            }
                        }
                    }
                    Err(e) => break Err(e),
                }
            };
            running.store(false, Ordering::SeqCst);
            let _ = sender.send(result);
        });

        Ok(SimulationHandle {
            receiver,
            thread: Some(thread),
        })
    }

    /// Requests that the in-flight simulation run stops. The current macro
    /// step is allowed to complete.
    pub fn stop_simulation(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a background simulation run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the current logical time.
    pub fn current_time(&self) -> TimePoint {
        TimePoint::from_nanos(self.current_time_nanos.load(Ordering::Acquire))
    }

    /// Enables pacing of the simulation against the wall clock.
    pub fn enable_real_time_simulation(&self) {
        self.real_time.enable_real_time_simulation();
    }

    /// Disables wall-clock pacing.
    pub fn disable_real_time_simulation(&self) {
        self.real_time.disable_real_time_simulation();
    }

    /// Whether wall-clock pacing is enabled.
    pub fn is_real_time_simulation(&self) -> bool {
        self.real_time.is_real_time_simulation()
    }

    /// Sets the target real-time factor. Must be positive.
    pub fn set_real_time_factor_target(&self, factor: f64) -> Result<()> {
        self.real_time.set_real_time_factor_target(factor)
    }

    /// Returns the target real-time factor.
    pub fn real_time_factor_target(&self) -> f64 {
        self.real_time.real_time_factor_target()
    }

    /// Sets the size of the rolling real-time-factor measurement window.
    pub fn set_steps_to_monitor(&self, steps: u32) -> Result<()> {
        self.real_time.set_steps_to_monitor(steps)
    }

    /// Returns the real-time factor measured over the last monitoring
    /// window.
    pub fn rolling_average_real_time_factor(&self) -> f64 {
        self.real_time.rolling_average_real_time_factor()
    }

    /// Returns the real-time factor measured since pacing started.
    pub fn total_average_real_time_factor(&self) -> f64 {
        self.real_time.total_average_real_time_factor()
    }

    /// Saves the complete simulation state and returns a handle to it.
    /// Requires every slave to support state saving.
    pub fn save_state(&self) -> Result<StateIndex> {
        self.lock_for_mutation()?.save_state()
    }

    /// Restores a previously saved simulation state and notifies all
    /// observers.
    pub fn restore_state(&self, index: StateIndex) -> Result<()> {
        let mut kernel = self.lock_for_mutation()?;
        let result = kernel.restore_state(index);
        self.current_time_nanos
            .store(kernel.current_time.nanos(), Ordering::Release);
        result
    }

    /// Releases a previously saved simulation state. The handle may be
    /// reused by a later save.
    pub fn release_state(&self, index: StateIndex) -> Result<()> {
        self.lock_for_mutation()?.release_state(index)
    }

    /// Returns all variables that currently have an active modifier.
    pub fn modified_variables(&self) -> Vec<VariableId> {
        self.kernel.lock().modified_variables()
    }

    /// Grants temporary access to the concrete algorithm, e.g. to set
    /// fixed-step decimation factors after simulators have been added.
    pub fn with_algorithm<A: Algorithm + 'static, R>(
        &self,
        f: impl FnOnce(&mut A) -> R,
    ) -> Result<R> {
        let mut guard = self.lock_for_mutation()?;
        let algorithm = guard
            .algorithm
            .as_any_mut()
            .downcast_mut::<A>()
            .ok_or_else(|| {
                Error::logic("the execution does not use the requested algorithm type")
            })?;
        Ok(f(algorithm))
    }
}
