//! The simulator surface exposed to algorithms, observers and
//! manipulators, and the wrapper which adapts a [`Slave`] to it.
//!
//! [`SlaveSimulator`] gives the scheduler a batched, modifier-aware view of
//! one slave: variables are registered up front with `expose_for_getting` /
//! `expose_for_setting`, and at each step boundary the wrapper performs at
//! most one bulk get and one bulk set per data type against the underlying
//! slave.

use std::collections::{HashMap, HashSet};

use lockstep_types::{
    Duration, Error, ModelDescription, Node, Result, StateIndex, TimePoint, ValueReference,
    VariableType,
};
use tracing::warn;

use crate::slave::{Slave, StepResult};

/// A modifier intercepting a real value at transfer time.
pub type RealModifier = Box<dyn FnMut(f64, Duration) -> f64 + Send>;
/// A modifier intercepting an integer value at transfer time.
pub type IntegerModifier = Box<dyn FnMut(i32, Duration) -> i32 + Send>;
/// A modifier intercepting a boolean value at transfer time.
pub type BooleanModifier = Box<dyn FnMut(bool, Duration) -> bool + Send>;
/// A modifier intercepting a string value at transfer time.
pub type StringModifier = Box<dyn FnMut(&str, Duration) -> String + Send>;

/// Read access to an entity in a simulation.
pub trait Observable {
    /// Returns the entity's name.
    fn name(&self) -> &str;

    /// Returns a description of the entity.
    fn model_description(&self) -> &ModelDescription;

    /// Exposes a variable for retrieval with the typed getters.
    ///
    /// This selects which variables are read from the slave at each step
    /// boundary, so that individual getter calls never trigger a separate
    /// data exchange. Calling this more than once for the same variable has
    /// no effect.
    fn expose_for_getting(
        &mut self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Result<()>;

    /// Returns the cached value of a real variable.
    ///
    /// The variable must previously have been exposed with
    /// `expose_for_getting`.
    fn get_real(&self, reference: ValueReference) -> Result<f64>;

    /// Returns the cached value of an integer variable.
    fn get_integer(&self, reference: ValueReference) -> Result<i32>;

    /// Returns the cached value of a boolean variable.
    fn get_boolean(&self, reference: ValueReference) -> Result<bool>;

    /// Returns the cached value of a string variable.
    fn get_string(&self, reference: ValueReference) -> Result<&str>;
}

/// Write access to an entity in a simulation.
pub trait Manipulable: Observable {
    /// Exposes a variable for assignment with the typed setters.
    ///
    /// This selects which variables are transferred to the slave at each
    /// step boundary. Calling this more than once for the same variable has
    /// no effect.
    fn expose_for_setting(
        &mut self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Result<()>;

    /// Caches a value for a real variable, to be written to the slave at
    /// the next step boundary.
    ///
    /// The variable must previously have been exposed with
    /// `expose_for_setting`.
    fn set_real(&mut self, reference: ValueReference, value: f64) -> Result<()>;

    /// Caches a value for an integer variable.
    fn set_integer(&mut self, reference: ValueReference, value: i32) -> Result<()>;

    /// Caches a value for a boolean variable.
    fn set_boolean(&mut self, reference: ValueReference, value: bool) -> Result<()>;

    /// Caches a value for a string variable.
    fn set_string(&mut self, reference: ValueReference, value: &str) -> Result<()>;

    /// Installs or clears the input modifier for a real variable.
    ///
    /// The modifier receives the cached input value and the step size each
    /// time the entity is stepped, and its result is what gets written to
    /// the slave. While a modifier is installed the variable is driven on
    /// every step. Passing `None` clears the modifier and re-drives the
    /// unmodified cached value once.
    fn set_real_input_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<RealModifier>,
    ) -> Result<()>;

    /// Installs or clears the input modifier for an integer variable.
    fn set_integer_input_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<IntegerModifier>,
    ) -> Result<()>;

    /// Installs or clears the input modifier for a boolean variable.
    fn set_boolean_input_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<BooleanModifier>,
    ) -> Result<()>;

    /// Installs or clears the input modifier for a string variable.
    fn set_string_input_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<StringModifier>,
    ) -> Result<()>;

    /// Installs or clears the output modifier for a real variable.
    ///
    /// The modifier is applied to the value read back from the slave after
    /// each step. Installing an output modifier exposes the variable for
    /// getting even when no consumer requested it.
    fn set_real_output_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<RealModifier>,
    ) -> Result<()>;

    /// Installs or clears the output modifier for an integer variable.
    fn set_integer_output_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<IntegerModifier>,
    ) -> Result<()>;

    /// Installs or clears the output modifier for a boolean variable.
    fn set_boolean_output_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<BooleanModifier>,
    ) -> Result<()>;

    /// Installs or clears the output modifier for a string variable.
    fn set_string_output_modifier(
        &mut self,
        reference: ValueReference,
        modifier: Option<StringModifier>,
    ) -> Result<()>;

    /// Returns the real variables that currently have a modifier on either
    /// the input or the output side.
    fn modified_real_variables(&self) -> &HashSet<ValueReference>;

    /// Returns the integer variables that currently have an active modifier.
    fn modified_integer_variables(&self) -> &HashSet<ValueReference>;

    /// Returns the boolean variables that currently have an active modifier.
    fn modified_boolean_variables(&self) -> &HashSet<ValueReference>;

    /// Returns the string variables that currently have an active modifier.
    fn modified_string_variables(&self) -> &HashSet<ValueReference>;
}

/// The simulator interface used by co-simulation algorithms to control one
/// sub-simulator.
pub trait Simulator: Manipulable + Send {
    /// Performs pre-simulation setup and enters initialization mode.
    fn setup(
        &mut self,
        start_time: TimePoint,
        stop_time: Option<TimePoint>,
        relative_tolerance: Option<f64>,
    ) -> Result<()>;

    /// Pushes cached inputs to the slave and pulls outputs back, without
    /// advancing logical time. For use in the initialization phase, between
    /// `setup` and `start_simulation`.
    fn do_iteration(&mut self) -> Result<()>;

    /// Signals that initialization is complete and stepping will begin.
    fn start_simulation(&mut self) -> Result<()>;

    /// Performs a single time step: writes pending inputs (through input
    /// modifiers), steps the slave, and reads outputs back (through output
    /// modifiers).
    fn do_step(&mut self, current_t: TimePoint, delta_t: Duration) -> Result<StepResult>;

    /// Saves the current state, including the wrapper's value caches.
    ///
    /// Requires `model_description().capabilities.can_save_state`.
    fn save_state(&mut self) -> Result<StateIndex>;

    /// Saves the current state, overwriting a previously saved one.
    fn save_state_to(&mut self, index: StateIndex) -> Result<()>;

    /// Restores a previously saved state.
    fn restore_state(&mut self, index: StateIndex) -> Result<()>;

    /// Releases a previously saved state. The index may be reused later.
    fn release_state(&mut self, index: StateIndex) -> Result<()>;

    /// Exports a saved state as a serializable tree.
    fn export_state(&mut self, index: StateIndex) -> Result<Node>;

    /// Imports a previously exported state.
    fn import_state(&mut self, state: &Node) -> Result<StateIndex>;
}

/// A cache of values read from the slave, per data type.
struct GetCache<T, F> {
    index_of: HashMap<ValueReference, usize>,
    references: Vec<ValueReference>,
    values: Vec<T>,
    modifiers: HashMap<ValueReference, F>,
}

impl<T: Clone + Default, F> GetCache<T, F> {
    fn new() -> Self {
        GetCache {
            index_of: HashMap::new(),
            references: Vec::new(),
            values: Vec::new(),
            modifiers: HashMap::new(),
        }
    }

    fn expose(&mut self, reference: ValueReference) {
        if self.index_of.contains_key(&reference) {
            return;
        }
        self.references.push(reference);
        self.values.push(T::default());
        self.index_of.insert(reference, self.references.len() - 1);
    }

    fn get(&self, reference: ValueReference) -> Result<&T> {
        self.index_of
            .get(&reference)
            .map(|&i| &self.values[i])
            .ok_or_else(|| {
                Error::logic(format!("variable {reference} was not exposed for getting"))
            })
    }
}

/// A cache of values pending transfer to the slave, per data type.
struct SetCache<T, F> {
    index_of: HashMap<ValueReference, usize>,
    references: Vec<ValueReference>,
    values: Vec<T>,
    pending: Vec<bool>,
    modifiers: HashMap<ValueReference, F>,
}

impl<T: Clone + Default, F> SetCache<T, F> {
    fn new() -> Self {
        SetCache {
            index_of: HashMap::new(),
            references: Vec::new(),
            values: Vec::new(),
            pending: Vec::new(),
            modifiers: HashMap::new(),
        }
    }

    fn expose(&mut self, reference: ValueReference) {
        if self.index_of.contains_key(&reference) {
            return;
        }
        self.references.push(reference);
        self.values.push(T::default());
        self.pending.push(false);
        self.index_of.insert(reference, self.references.len() - 1);
    }

    fn set(&mut self, reference: ValueReference, value: T) -> Result<()> {
        match self.index_of.get(&reference) {
            Some(&i) => {
                self.values[i] = value;
                self.pending[i] = true;
                Ok(())
            }
            None => Err(Error::logic(format!(
                "variable {reference} was not exposed for setting"
            ))),
        }
    }

    /// Marks a slot pending so its cached value is re-driven on the next
    /// transfer. Used when a modifier is cleared.
    fn touch(&mut self, reference: ValueReference) {
        if let Some(&i) = self.index_of.get(&reference) {
            self.pending[i] = true;
        }
    }
}

/// Snapshot of all value caches, stored alongside a saved slave state so a
/// restore reproduces the wrapper's observable values exactly.
#[derive(Clone)]
struct CacheSnapshot {
    real_out: Vec<f64>,
    integer_out: Vec<i32>,
    boolean_out: Vec<bool>,
    string_out: Vec<String>,
    real_in: (Vec<f64>, Vec<bool>),
    integer_in: (Vec<i32>, Vec<bool>),
    boolean_in: (Vec<bool>, Vec<bool>),
    string_in: (Vec<String>, Vec<bool>),
}

struct SavedEntry {
    slave_state: StateIndex,
    snapshot: Option<CacheSnapshot>,
}

/// Adapts a [`Slave`] to the [`Simulator`] interface.
pub struct SlaveSimulator {
    name: String,
    description: ModelDescription,
    slave: Box<dyn Slave>,

    real_get: GetCache<f64, RealModifier>,
    integer_get: GetCache<i32, IntegerModifier>,
    boolean_get: GetCache<bool, BooleanModifier>,
    string_get: GetCache<String, StringModifier>,

    real_set: SetCache<f64, RealModifier>,
    integer_set: SetCache<i32, IntegerModifier>,
    boolean_set: SetCache<bool, BooleanModifier>,
    string_set: SetCache<String, StringModifier>,

    modified_real: HashSet<ValueReference>,
    modified_integer: HashSet<ValueReference>,
    modified_boolean: HashSet<ValueReference>,
    modified_string: HashSet<ValueReference>,

    saved_states: Vec<Option<SavedEntry>>,
    started: bool,
}

impl Drop for SlaveSimulator {
    fn drop(&mut self) {
        if self.started {
            if let Err(e) = self.slave.end_simulation() {
                warn!(simulator = %self.name, "failed to end simulation cleanly: {e}");
            }
        }
    }
}

impl SlaveSimulator {
    /// Wraps a slave under an execution-specific name.
    pub fn new(slave: Box<dyn Slave>, name: impl Into<String>) -> Self {
        let description = slave.model_description();
        SlaveSimulator {
            name: name.into(),
            description,
            slave,
            real_get: GetCache::new(),
            integer_get: GetCache::new(),
            boolean_get: GetCache::new(),
            string_get: GetCache::new(),
            real_set: SetCache::new(),
            integer_set: SetCache::new(),
            boolean_set: SetCache::new(),
            string_set: SetCache::new(),
            modified_real: HashSet::new(),
            modified_integer: HashSet::new(),
            modified_boolean: HashSet::new(),
            modified_string: HashSet::new(),
            saved_states: Vec::new(),
            started: false,
        }
    }

    fn check_variable(
        &self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Result<()> {
        if self
            .description
            .find_variable_by_ref(variable_type, reference)
            .is_none()
        {
            return Err(Error::invalid_structure(format!(
                "simulator '{}' has no {variable_type} variable with reference {reference}",
                self.name
            )));
        }
        Ok(())
    }

    fn check_can_save_state(&self) -> Result<()> {
        if !self.description.capabilities.can_save_state {
            return Err(Error::unsupported(format!(
                "simulator '{}' does not support state save/restore",
                self.name
            )));
        }
        Ok(())
    }

    /// Writes all pending or modifier-driven inputs to the slave, one bulk
    /// set per type. Non-fatal bad-value reports are aggregated across the
    /// four types into a single warning.
    fn push_inputs(&mut self, delta_t: Duration) -> Result<()> {
        let mut bad_values: Vec<String> = Vec::new();

        macro_rules! push_copy {
            ($cache:expr, $set:ident, $label:literal) => {{
                let cache = &mut $cache;
                let mut refs = Vec::new();
                let mut vals = Vec::new();
                for (i, &vr) in cache.references.iter().enumerate() {
                    let has_modifier = cache.modifiers.contains_key(&vr);
                    if cache.pending[i] || has_modifier {
                        let mut v = cache.values[i].clone();
                        if let Some(m) = cache.modifiers.get_mut(&vr) {
                            v = m(v, delta_t);
                        }
                        refs.push(vr);
                        vals.push(v);
                        cache.pending[i] = false;
                    }
                }
                if !refs.is_empty() {
                    match self.slave.$set(&refs, &vals) {
                        Ok(()) => {}
                        Err(Error::BadValue(m)) => bad_values.push(format!("{}: {m}", $label)),
                        Err(e) => return Err(e),
                    }
                }
            }};
        }

        push_copy!(self.real_set, set_real_variables, "real");
        push_copy!(self.integer_set, set_integer_variables, "integer");
        push_copy!(self.boolean_set, set_boolean_variables, "boolean");

        {
            let cache = &mut self.string_set;
            let mut refs = Vec::new();
            let mut vals = Vec::new();
            for (i, &vr) in cache.references.iter().enumerate() {
                let has_modifier = cache.modifiers.contains_key(&vr);
                if cache.pending[i] || has_modifier {
                    let mut v = cache.values[i].clone();
                    if let Some(m) = cache.modifiers.get_mut(&vr) {
                        v = m(&v, delta_t);
                    }
                    refs.push(vr);
                    vals.push(v);
                    cache.pending[i] = false;
                }
            }
            if !refs.is_empty() {
                match self.slave.set_string_variables(&refs, &vals) {
                    Ok(()) => {}
                    Err(Error::BadValue(m)) => bad_values.push(format!("string: {m}")),
                    Err(e) => return Err(e),
                }
            }
        }

        if !bad_values.is_empty() {
            warn!(
                simulator = %self.name,
                "some input values were only partially accepted: {}",
                bad_values.join("; ")
            );
        }
        Ok(())
    }

    /// Reads all exposed outputs back from the slave, one bulk get per
    /// type, then applies output modifiers in place.
    fn pull_outputs(&mut self, delta_t: Duration) -> Result<()> {
        if !self.real_get.references.is_empty() {
            self.slave
                .get_real_variables(&self.real_get.references, &mut self.real_get.values)?;
            for (vr, m) in self.real_get.modifiers.iter_mut() {
                let i = self.real_get.index_of[vr];
                self.real_get.values[i] = m(self.real_get.values[i], delta_t);
            }
        }
        if !self.integer_get.references.is_empty() {
            self.slave.get_integer_variables(
                &self.integer_get.references,
                &mut self.integer_get.values,
            )?;
            for (vr, m) in self.integer_get.modifiers.iter_mut() {
                let i = self.integer_get.index_of[vr];
                self.integer_get.values[i] = m(self.integer_get.values[i], delta_t);
            }
        }
        if !self.boolean_get.references.is_empty() {
            self.slave.get_boolean_variables(
                &self.boolean_get.references,
                &mut self.boolean_get.values,
            )?;
            for (vr, m) in self.boolean_get.modifiers.iter_mut() {
                let i = self.boolean_get.index_of[vr];
                self.boolean_get.values[i] = m(self.boolean_get.values[i], delta_t);
            }
        }
        if !self.string_get.references.is_empty() {
            self.slave.get_string_variables(
                &self.string_get.references,
                &mut self.string_get.values,
            )?;
            for (vr, m) in self.string_get.modifiers.iter_mut() {
                let i = self.string_get.index_of[vr];
                self.string_get.values[i] = m(&self.string_get.values[i], delta_t);
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            real_out: self.real_get.values.clone(),
            integer_out: self.integer_get.values.clone(),
            boolean_out: self.boolean_get.values.clone(),
            string_out: self.string_get.values.clone(),
            real_in: (self.real_set.values.clone(), self.real_set.pending.clone()),
            integer_in: (
                self.integer_set.values.clone(),
                self.integer_set.pending.clone(),
            ),
            boolean_in: (
                self.boolean_set.values.clone(),
                self.boolean_set.pending.clone(),
            ),
            string_in: (
                self.string_set.values.clone(),
                self.string_set.pending.clone(),
            ),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &CacheSnapshot) {
        // Exposure sets only ever grow, so a snapshot can be shorter than
        // the current caches; the extra slots keep their current values.
        fn copy_prefix<T: Clone>(target: &mut [T], source: &[T]) {
            let n = source.len().min(target.len());
            target[..n].clone_from_slice(&source[..n]);
        }
        copy_prefix(&mut self.real_get.values, &snapshot.real_out);
        copy_prefix(&mut self.integer_get.values, &snapshot.integer_out);
        copy_prefix(&mut self.boolean_get.values, &snapshot.boolean_out);
        copy_prefix(&mut self.string_get.values, &snapshot.string_out);
        copy_prefix(&mut self.real_set.values, &snapshot.real_in.0);
        copy_prefix(&mut self.real_set.pending, &snapshot.real_in.1);
        copy_prefix(&mut self.integer_set.values, &snapshot.integer_in.0);
        copy_prefix(&mut self.integer_set.pending, &snapshot.integer_in.1);
        copy_prefix(&mut self.boolean_set.values, &snapshot.boolean_in.0);
        copy_prefix(&mut self.boolean_set.pending, &snapshot.boolean_in.1);
        copy_prefix(&mut self.string_set.values, &snapshot.string_in.0);
        copy_prefix(&mut self.string_set.pending, &snapshot.string_in.1);
    }

    fn entry(&self, index: StateIndex) -> Result<&SavedEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.saved_states.get(i))
            .and_then(Option::as_ref)
            .ok_or(Error::StateIndexInvalid(index))
    }
}

macro_rules! input_modifier_setter {
    ($fn_name:ident, $cache:ident, $modified:ident, $modifier_ty:ty, $other_side:ident, $vt:expr) => {
        fn $fn_name(
            &mut self,
            reference: ValueReference,
            modifier: Option<$modifier_ty>,
        ) -> Result<()> {
            self.expose_for_setting($vt, reference)?;
            match modifier {
                Some(m) => {
                    self.$cache.modifiers.insert(reference, m);
                    self.$modified.insert(reference);
                }
                None => {
                    if self.$cache.modifiers.remove(&reference).is_some() {
                        // Re-drive the unmodified cached value once so the
                        // original trajectory resumes.
                        self.$cache.touch(reference);
                    }
                    if !self.$other_side.modifiers.contains_key(&reference) {
                        self.$modified.remove(&reference);
                    }
                }
            }
            Ok(())
        }
    };
}

macro_rules! output_modifier_setter {
    ($fn_name:ident, $cache:ident, $modified:ident, $modifier_ty:ty, $other_side:ident, $vt:expr) => {
        fn $fn_name(
            &mut self,
            reference: ValueReference,
            modifier: Option<$modifier_ty>,
        ) -> Result<()> {
            self.expose_for_getting($vt, reference)?;
            match modifier {
                Some(m) => {
                    self.$cache.modifiers.insert(reference, m);
                    self.$modified.insert(reference);
                }
                None => {
                    self.$cache.modifiers.remove(&reference);
                    if !self.$other_side.modifiers.contains_key(&reference) {
                        self.$modified.remove(&reference);
                    }
                }
            }
            Ok(())
        }
    };
}

impl Observable for SlaveSimulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_description(&self) -> &ModelDescription {
        &self.description
    }

    fn expose_for_getting(
        &mut self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Result<()> {
        self.check_variable(variable_type, reference)?;
        match variable_type {
            VariableType::Real => self.real_get.expose(reference),
            VariableType::Integer => self.integer_get.expose(reference),
            VariableType::Boolean => self.boolean_get.expose(reference),
            VariableType::String => self.string_get.expose(reference),
        }
        Ok(())
    }

    fn get_real(&self, reference: ValueReference) -> Result<f64> {
        self.real_get.get(reference).copied()
    }

    fn get_integer(&self, reference: ValueReference) -> Result<i32> {
        self.integer_get.get(reference).copied()
    }

    fn get_boolean(&self, reference: ValueReference) -> Result<bool> {
        self.boolean_get.get(reference).copied()
    }

    fn get_string(&self, reference: ValueReference) -> Result<&str> {
        self.string_get.get(reference).map(String::as_str)
    }
}

impl Manipulable for SlaveSimulator {
    fn expose_for_setting(
        &mut self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Result<()> {
        self.check_variable(variable_type, reference)?;
        match variable_type {
            VariableType::Real => self.real_set.expose(reference),
            VariableType::Integer => self.integer_set.expose(reference),
            VariableType::Boolean => self.boolean_set.expose(reference),
            VariableType::String => self.string_set.expose(reference),
        }
        Ok(())
    }

    fn set_real(&mut self, reference: ValueReference, value: f64) -> Result<()> {
        self.real_set.set(reference, value)
    }

    fn set_integer(&mut self, reference: ValueReference, value: i32) -> Result<()> {
        self.integer_set.set(reference, value)
    }

    fn set_boolean(&mut self, reference: ValueReference, value: bool) -> Result<()> {
        self.boolean_set.set(reference, value)
    }

    fn set_string(&mut self, reference: ValueReference, value: &str) -> Result<()> {
        self.string_set.set(reference, value.to_string())
    }

    input_modifier_setter!(
        set_real_input_modifier,
        real_set,
        modified_real,
        RealModifier,
        real_get,
        VariableType::Real
    );
    input_modifier_setter!(
        set_integer_input_modifier,
        integer_set,
        modified_integer,
        IntegerModifier,
        integer_get,
        VariableType::Integer
    );
    input_modifier_setter!(
        set_boolean_input_modifier,
        boolean_set,
        modified_boolean,
        BooleanModifier,
        boolean_get,
        VariableType::Boolean
    );
    input_modifier_setter!(
        set_string_input_modifier,
        string_set,
        modified_string,
        StringModifier,
        string_get,
        VariableType::String
    );

    output_modifier_setter!(
        set_real_output_modifier,
        real_get,
        modified_real,
        RealModifier,
        real_set,
        VariableType::Real
    );
    output_modifier_setter!(
        set_integer_output_modifier,
        integer_get,
        modified_integer,
        IntegerModifier,
        integer_set,
        VariableType::Integer
    );
    output_modifier_setter!(
        set_boolean_output_modifier,
        boolean_get,
        modified_boolean,
        BooleanModifier,
        boolean_set,
        VariableType::Boolean
    );
    output_modifier_setter!(
        set_string_output_modifier,
        string_get,
        modified_string,
        StringModifier,
        string_set,
        VariableType::String
    );

    fn modified_real_variables(&self) -> &HashSet<ValueReference> {
        &self.modified_real
    }

    fn modified_integer_variables(&self) -> &HashSet<ValueReference> {
        &self.modified_integer
    }

    fn modified_boolean_variables(&self) -> &HashSet<ValueReference> {
        &self.modified_boolean
    }

    fn modified_string_variables(&self) -> &HashSet<ValueReference> {
        &self.modified_string
    }
}

impl Simulator for SlaveSimulator {
    fn setup(
        &mut self,
        start_time: TimePoint,
        stop_time: Option<TimePoint>,
        relative_tolerance: Option<f64>,
    ) -> Result<()> {
        self.slave.setup(start_time, stop_time, relative_tolerance)
    }

    fn do_iteration(&mut self) -> Result<()> {
        // Initialization mode: no time passes, so modifiers see a zero step.
        self.push_inputs(Duration::ZERO)?;
        self.pull_outputs(Duration::ZERO)
    }

    fn start_simulation(&mut self) -> Result<()> {
        self.slave.start_simulation()?;
        self.started = true;
        Ok(())
    }

    fn do_step(&mut self, current_t: TimePoint, delta_t: Duration) -> Result<StepResult> {
        self.push_inputs(delta_t)?;
        let result = self.slave.do_step(current_t, delta_t)?;
        if result == StepResult::Complete {
            self.pull_outputs(delta_t)?;
        }
        Ok(result)
    }

    fn save_state(&mut self) -> Result<StateIndex> {
        self.check_can_save_state()?;
        let slave_state = self.slave.save_state()?;
        let entry = SavedEntry {
            slave_state,
            snapshot: Some(self.snapshot()),
        };
        let slot = self.saved_states.iter().position(Option::is_none);
        match slot {
            Some(i) => {
                self.saved_states[i] = Some(entry);
                Ok(i as StateIndex)
            }
            None => {
                self.saved_states.push(Some(entry));
                Ok((self.saved_states.len() - 1) as StateIndex)
            }
        }
    }

    fn save_state_to(&mut self, index: StateIndex) -> Result<()> {
        self.check_can_save_state()?;
        let slave_state = self.entry(index)?.slave_state;
        self.slave.save_state_to(slave_state)?;
        let snapshot = self.snapshot();
        if let Some(entry) = self.saved_states[index as usize].as_mut() {
            entry.snapshot = Some(snapshot);
        }
        Ok(())
    }

    fn restore_state(&mut self, index: StateIndex) -> Result<()> {
        self.check_can_save_state()?;
        let slave_state = self.entry(index)?.slave_state;
        self.slave.restore_state(slave_state)?;
        let snapshot = self.saved_states[index as usize]
            .as_ref()
            .and_then(|e| e.snapshot.clone());
        match snapshot {
            Some(s) => self.apply_snapshot(&s),
            // Imported states carry no cache snapshot; refresh outputs from
            // the restored slave instead.
            None => self.pull_outputs(Duration::ZERO)?,
        }
        Ok(())
    }

    fn release_state(&mut self, index: StateIndex) -> Result<()> {
        self.check_can_save_state()?;
        let slave_state = self.entry(index)?.slave_state;
        self.slave.release_state(slave_state)?;
        self.saved_states[index as usize] = None;
        Ok(())
    }

    fn export_state(&mut self, index: StateIndex) -> Result<Node> {
        self.check_can_save_state()?;
        let slave_state = self.entry(index)?.slave_state;
        self.slave.export_state(slave_state)
    }

    fn import_state(&mut self, state: &Node) -> Result<StateIndex> {
        self.check_can_save_state()?;
        let slave_state = self.slave.import_state(state)?;
        let entry = SavedEntry {
            slave_state,
            snapshot: None,
        };
        let slot = self.saved_states.iter().position(Option::is_none);
        match slot {
            Some(i) => {
                self.saved_states[i] = Some(entry);
                Ok(i as StateIndex)
            }
            None => {
                self.saved_states.push(Some(entry));
                Ok((self.saved_states.len() - 1) as StateIndex)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::{Causality, ScalarValue, Variability, VariableDescription};

    /// One real input (reference 0) copied to one real output (reference 1)
    /// on every step.
    struct EchoSlave {
        input: f64,
        output: f64,
    }

    impl EchoSlave {
        fn new() -> Self {
            EchoSlave {
                input: 0.0,
                output: 0.0,
            }
        }
    }

    impl Slave for EchoSlave {
        fn model_description(&self) -> ModelDescription {
            ModelDescription {
                name: "echo".to_string(),
                uuid: String::new(),
                description: String::new(),
                author: String::new(),
                version: String::new(),
                variables: vec![
                    VariableDescription {
                        name: "u".to_string(),
                        reference: 0,
                        variable_type: VariableType::Real,
                        causality: Causality::Input,
                        variability: lockstep_types::Variability::Continuous,
                        start: Some(ScalarValue::Real(0.0)),
                    },
                    VariableDescription {
                        name: "y".to_string(),
                        reference: 1,
                        variable_type: VariableType::Real,
                        causality: Causality::Output,
                        variability: Variability::Continuous,
                        start: None,
                    },
                ],
                capabilities: Default::default(),
            }
        }

        fn setup(
            &mut self,
            _start: TimePoint,
            _stop: Option<TimePoint>,
            _tolerance: Option<f64>,
        ) -> Result<()> {
            Ok(())
        }

        fn start_simulation(&mut self) -> Result<()> {
            Ok(())
        }

        fn end_simulation(&mut self) -> Result<()> {
            Ok(())
        }

        fn do_step(&mut self, _t: TimePoint, _dt: Duration) -> Result<StepResult> {
            self.output = self.input;
            Ok(StepResult::Complete)
        }

        fn get_real_variables(
            &mut self,
            variables: &[ValueReference],
            values: &mut [f64],
        ) -> Result<()> {
            for (slot, &vr) in values.iter_mut().zip(variables) {
                *slot = match vr {
                    0 => self.input,
                    1 => self.output,
                    _ => return Err(Error::invalid_structure("unknown real variable")),
                };
            }
            Ok(())
        }

        fn get_integer_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &mut [i32],
        ) -> Result<()> {
            Ok(())
        }

        fn get_boolean_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &mut [bool],
        ) -> Result<()> {
            Ok(())
        }

        fn get_string_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &mut [String],
        ) -> Result<()> {
            Ok(())
        }

        fn set_real_variables(
            &mut self,
            variables: &[ValueReference],
            values: &[f64],
        ) -> Result<()> {
            for (&vr, &value) in variables.iter().zip(values) {
                if vr != 0 {
                    return Err(Error::bad_value("only the input can be driven"));
                }
                self.input = value;
            }
            Ok(())
        }

        fn set_integer_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &[i32],
        ) -> Result<()> {
            Ok(())
        }

        fn set_boolean_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &[bool],
        ) -> Result<()> {
            Ok(())
        }

        fn set_string_variables(
            &mut self,
            _variables: &[ValueReference],
            _values: &[String],
        ) -> Result<()> {
            Ok(())
        }
    }

    fn wrapper() -> SlaveSimulator {
        let mut sim = SlaveSimulator::new(Box::new(EchoSlave::new()), "echo");
        sim.expose_for_getting(VariableType::Real, 1).unwrap();
        sim.expose_for_setting(VariableType::Real, 0).unwrap();
        sim
    }

    fn step(sim: &mut SlaveSimulator, n: i64) -> f64 {
        let h = Duration::from_seconds(0.1);
        sim.do_step(TimePoint::ZERO + h * n, h).unwrap();
        sim.get_real(1).unwrap()
    }

    #[test]
    fn test_set_requires_exposure() {
        let mut sim = wrapper();
        assert!(matches!(sim.set_real(1, 1.0), Err(Error::Logic(_))));
        sim.set_real(0, 2.5).unwrap();
        assert_eq!(step(&mut sim, 0), 2.5);
    }

    #[test]
    fn test_unknown_variables_cannot_be_exposed() {
        let mut sim = wrapper();
        assert!(sim.expose_for_getting(VariableType::Real, 7).is_err());
        assert!(sim
            .expose_for_setting(VariableType::Integer, 0)
            .is_err());
    }

    #[test]
    fn test_values_are_driven_once_unless_modified() {
        let mut sim = wrapper();
        sim.set_real(0, 4.0).unwrap();
        assert_eq!(step(&mut sim, 0), 4.0);
        // The cached value is not re-sent, but the slave keeps it.
        assert_eq!(step(&mut sim, 1), 4.0);

        sim.set_real_input_modifier(0, Some(Box::new(|_, _| 7.0)))
            .unwrap();
        assert_eq!(step(&mut sim, 2), 7.0);
        assert_eq!(sim.modified_real_variables().len(), 1);

        // Clearing restores the original trajectory by re-driving the
        // unmodified cached value.
        sim.set_real_input_modifier(0, None).unwrap();
        assert_eq!(step(&mut sim, 3), 4.0);
        assert!(sim.modified_real_variables().is_empty());
    }

    #[test]
    fn test_output_modifier_exposes_and_intercepts() {
        let mut sim = SlaveSimulator::new(Box::new(EchoSlave::new()), "echo");
        sim.expose_for_setting(VariableType::Real, 0).unwrap();
        sim.set_real_output_modifier(1, Some(Box::new(|value, _| value + 100.0)))
            .unwrap();
        sim.set_real(0, 1.0).unwrap();
        assert_eq!(step(&mut sim, 0), 101.0);

        sim.set_real_output_modifier(1, None).unwrap();
        assert_eq!(step(&mut sim, 1), 1.0);
    }

    #[test]
    fn test_do_iteration_moves_values_without_stepping() {
        let mut sim = wrapper();
        sim.expose_for_getting(VariableType::Real, 0).unwrap();
        sim.set_real(0, 9.0).unwrap();
        sim.do_iteration().unwrap();
        // The output still holds its pre-step value, the input is visible.
        assert_eq!(sim.get_real(0).unwrap(), 9.0);
        assert_eq!(sim.get_real(1).unwrap(), 0.0);
    }

    #[test]
    fn test_bad_values_do_not_abort_the_step() {
        let mut sim = wrapper();
        sim.expose_for_setting(VariableType::Real, 1).unwrap();
        sim.set_real(1, 5.0).unwrap();
        sim.set_real(0, 2.0).unwrap();
        // Driving the output makes the slave report a bad value; the step
        // still completes with the accepted input.
        assert_eq!(step(&mut sim, 0), 2.0);
    }

    #[test]
    fn test_state_support_is_checked() {
        let mut sim = wrapper();
        assert!(matches!(
            sim.save_state(),
            Err(Error::UnsupportedFeature(_))
        ));
    }
}
