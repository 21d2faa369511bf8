//! Test support for the lockstep workspace: a configurable in-memory
//! slave and small helpers shared by the integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use lockstep_core::slave::{Slave, StepResult};
use lockstep_types::{
    Causality, Duration, Error, ModelCapabilities, ModelDescription, Node, Result, ScalarValue,
    StateIndex, TimePoint, ValueReference, Variability, VariableDescription, VariableType,
};

/// Initializes test logging once; safe to call from every test.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The variable values of a [`MockSlave`], exposed to update hooks.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MockValues {
    pub reals: HashMap<ValueReference, f64>,
    pub integers: HashMap<ValueReference, i32>,
    pub booleans: HashMap<ValueReference, bool>,
    pub strings: HashMap<ValueReference, String>,
}

/// Counters recorded by a [`MockSlave`], shared with the test through an
/// [`Arc`] so they stay readable after the slave moves into an execution.
#[derive(Debug, Default)]
pub struct MockTelemetry {
    pub setup_calls: u32,
    pub started: bool,
    pub ended: bool,
    pub step_count: u64,
    pub step_sizes: Vec<Duration>,
    pub step_times: Vec<TimePoint>,
}

type UpdateFn = Box<dyn FnMut(&mut MockValues) + Send>;

/// A scriptable in-memory slave.
///
/// The model is memoryless: the update hook recomputes outputs from
/// inputs both when stepping and when values are read during the
/// initialization phase.
pub struct MockSlave {
    description: ModelDescription,
    values: MockValues,
    update: Option<UpdateFn>,
    telemetry: Arc<Mutex<MockTelemetry>>,
    saved: Vec<Option<MockValues>>,
    fail_on_invocation: Option<u64>,
    real_clamp_limit: Option<f64>,
}

impl MockSlave {
    /// Creates a slave with no variables; chain `with_*` calls to shape it.
    pub fn new(name: impl Into<String>) -> Self {
        MockSlave {
            description: ModelDescription {
                name: name.into(),
                uuid: String::new(),
                description: String::new(),
                author: String::new(),
                version: String::new(),
                variables: Vec::new(),
                capabilities: ModelCapabilities {
                    can_save_state: true,
                },
            },
            values: MockValues::default(),
            update: None,
            telemetry: Arc::new(Mutex::new(MockTelemetry::default())),
            saved: Vec::new(),
            fail_on_invocation: None,
            real_clamp_limit: None,
        }
    }

    /// A model with real input `in` (reference 0) and real output `out`
    /// (reference 1) computing `out = in`.
    pub fn identity_real(name: impl Into<String>) -> Self {
        MockSlave::new(name)
            .with_real_variable("in", IDENTITY_IN, Causality::Input, 0.0)
            .with_real_variable("out", IDENTITY_OUT, Causality::Output, 0.0)
            .with_update(|values| {
                let input = values.reals.get(&IDENTITY_IN).copied().unwrap_or(0.0);
                values.reals.insert(IDENTITY_OUT, input);
            })
    }

    pub fn with_real_variable(
        mut self,
        name: &str,
        reference: ValueReference,
        causality: Causality,
        start: f64,
    ) -> Self {
        self.description.variables.push(VariableDescription {
            name: name.to_string(),
            reference,
            variable_type: VariableType::Real,
            causality,
            variability: Variability::Continuous,
            start: Some(ScalarValue::Real(start)),
        });
        self.values.reals.insert(reference, start);
        self
    }

    pub fn with_integer_variable(
        mut self,
        name: &str,
        reference: ValueReference,
        causality: Causality,
        start: i32,
    ) -> Self {
        self.description.variables.push(VariableDescription {
            name: name.to_string(),
            reference,
            variable_type: VariableType::Integer,
            causality,
            variability: Variability::Discrete,
            start: Some(ScalarValue::Integer(start)),
        });
        self.values.integers.insert(reference, start);
        self
    }

    pub fn with_boolean_variable(
        mut self,
        name: &str,
        reference: ValueReference,
        causality: Causality,
        start: bool,
    ) -> Self {
        self.description.variables.push(VariableDescription {
            name: name.to_string(),
            reference,
            variable_type: VariableType::Boolean,
            causality,
            variability: Variability::Discrete,
            start: Some(ScalarValue::Boolean(start)),
        });
        self.values.booleans.insert(reference, start);
        self
    }

    pub fn with_string_variable(
        mut self,
        name: &str,
        reference: ValueReference,
        causality: Causality,
        start: &str,
    ) -> Self {
        self.description.variables.push(VariableDescription {
            name: name.to_string(),
            reference,
            variable_type: VariableType::String,
            causality,
            variability: Variability::Discrete,
            start: Some(ScalarValue::String(start.to_string())),
        });
        self.values.strings.insert(reference, start.to_string());
        self
    }

    /// Installs the hook that recomputes outputs from inputs.
    pub fn with_update(mut self, update: impl FnMut(&mut MockValues) + Send + 'static) -> Self {
        self.update = Some(Box::new(update));
        self
    }

    /// Declares whether the slave supports state save/restore.
    pub fn with_state_support(mut self, can_save_state: bool) -> Self {
        self.description.capabilities.can_save_state = can_save_state;
        self
    }

    /// Makes the `n`-th `do_step` invocation (1-based) report failure.
    pub fn with_failure_on_step(mut self, invocation: u64) -> Self {
        self.fail_on_invocation = Some(invocation);
        self
    }

    /// Makes real set-calls clamp values above `limit` and report a
    /// non-fatal bad value.
    pub fn with_real_clamp_limit(mut self, limit: f64) -> Self {
        self.real_clamp_limit = Some(limit);
        self
    }

    /// Returns the shared telemetry handle.
    pub fn telemetry(&self) -> Arc<Mutex<MockTelemetry>> {
        Arc::clone(&self.telemetry)
    }

    fn run_update(&mut self) {
        if let Some(update) = &mut self.update {
            update(&mut self.values);
        }
    }
}

/// Value reference of the `in` variable of [`MockSlave::identity_real`].
pub const IDENTITY_IN: ValueReference = 0;
/// Value reference of the `out` variable of [`MockSlave::identity_real`].
pub const IDENTITY_OUT: ValueReference = 1;

fn missing(kind: &str, reference: ValueReference) -> Error {
    Error::invalid_structure(format!("mock slave has no {kind} variable {reference}"))
}

impl Slave for MockSlave {
    fn model_description(&self) -> ModelDescription {
        self.description.clone()
    }

    fn setup(
        &mut self,
        _start_time: TimePoint,
        _stop_time: Option<TimePoint>,
        _relative_tolerance: Option<f64>,
    ) -> Result<()> {
        self.telemetry.lock().setup_calls += 1;
        Ok(())
    }

    fn start_simulation(&mut self) -> Result<()> {
        self.telemetry.lock().started = true;
        Ok(())
    }

    fn end_simulation(&mut self) -> Result<()> {
        self.telemetry.lock().ended = true;
        Ok(())
    }

    fn do_step(&mut self, current_t: TimePoint, delta_t: Duration) -> Result<StepResult> {
        let invocation = {
            let mut telemetry = self.telemetry.lock();
            telemetry.step_count += 1;
            telemetry.step_sizes.push(delta_t);
            telemetry.step_times.push(current_t);
            telemetry.step_count
        };
        if self.fail_on_invocation == Some(invocation) {
            return Ok(StepResult::Failed);
        }
        self.run_update();
        Ok(StepResult::Complete)
    }

    fn get_real_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [f64],
    ) -> Result<()> {
        self.run_update();
        for (slot, &reference) in values.iter_mut().zip(variables) {
            *slot = *self
                .values
                .reals
                .get(&reference)
                .ok_or_else(|| missing("real", reference))?;
        }
        Ok(())
    }

    fn get_integer_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [i32],
    ) -> Result<()> {
        self.run_update();
        for (slot, &reference) in values.iter_mut().zip(variables) {
            *slot = *self
                .values
                .integers
                .get(&reference)
                .ok_or_else(|| missing("integer", reference))?;
        }
        Ok(())
    }

    fn get_boolean_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [bool],
    ) -> Result<()> {
        self.run_update();
        for (slot, &reference) in values.iter_mut().zip(variables) {
            *slot = *self
                .values
                .booleans
                .get(&reference)
                .ok_or_else(|| missing("boolean", reference))?;
        }
        Ok(())
    }

    fn get_string_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [String],
    ) -> Result<()> {
        self.run_update();
        for (slot, &reference) in values.iter_mut().zip(variables) {
            slot.clone_from(
                self.values
                    .strings
                    .get(&reference)
                    .ok_or_else(|| missing("string", reference))?,
            );
        }
        Ok(())
    }

    fn set_real_variables(&mut self, variables: &[ValueReference], values: &[f64]) -> Result<()> {
        let mut clamped = Vec::new();
        for (&reference, &value) in variables.iter().zip(values) {
            if !self.values.reals.contains_key(&reference) {
                return Err(missing("real", reference));
            }
            let accepted = match self.real_clamp_limit {
                Some(limit) if value > limit => {
                    clamped.push(reference);
                    limit
                }
                _ => value,
            };
            self.values.reals.insert(reference, accepted);
        }
        if clamped.is_empty() {
            Ok(())
        } else {
            Err(Error::bad_value(format!(
                "clamped {} real value(s) to the configured limit",
                clamped.len()
            )))
        }
    }

    fn set_integer_variables(
        &mut self,
        variables: &[ValueReference],
        values: &[i32],
    ) -> Result<()> {
        for (&reference, &value) in variables.iter().zip(values) {
            if !self.values.integers.contains_key(&reference) {
                return Err(missing("integer", reference));
            }
            self.values.integers.insert(reference, value);
        }
        Ok(())
    }

    fn set_boolean_variables(
        &mut self,
        variables: &[ValueReference],
        values: &[bool],
    ) -> Result<()> {
        for (&reference, &value) in variables.iter().zip(values) {
            if !self.values.booleans.contains_key(&reference) {
                return Err(missing("boolean", reference));
            }
            self.values.booleans.insert(reference, value);
        }
        Ok(())
    }

    fn set_string_variables(
        &mut self,
        variables: &[ValueReference],
        values: &[String],
    ) -> Result<()> {
        for (reference, value) in variables.iter().zip(values) {
            if !self.values.strings.contains_key(reference) {
                return Err(missing("string", *reference));
            }
            self.values.strings.insert(*reference, value.clone());
        }
        Ok(())
    }

    fn save_state(&mut self) -> Result<StateIndex> {
        let snapshot = self.values.clone();
        match self.saved.iter().position(Option::is_none) {
            Some(slot) => {
                self.saved[slot] = Some(snapshot);
                Ok(slot as StateIndex)
            }
            None => {
                self.saved.push(Some(snapshot));
                Ok((self.saved.len() - 1) as StateIndex)
            }
        }
    }

    fn save_state_to(&mut self, index: StateIndex) -> Result<()> {
        let slot = self
            .saved
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .ok_or(Error::StateIndexInvalid(index))?;
        *slot = self.values.clone();
        Ok(())
    }

    fn restore_state(&mut self, index: StateIndex) -> Result<()> {
        let snapshot = self
            .saved
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::StateIndexInvalid(index))?;
        self.values = snapshot.clone();
        Ok(())
    }

    fn release_state(&mut self, index: StateIndex) -> Result<()> {
        let slot = self
            .saved
            .get_mut(index as usize)
            .ok_or(Error::StateIndexInvalid(index))?;
        if slot.take().is_none() {
            return Err(Error::StateIndexInvalid(index));
        }
        Ok(())
    }

    fn export_state(&mut self, index: StateIndex) -> Result<Node> {
        let snapshot = self
            .saved
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::StateIndexInvalid(index))?;
        let mut reals = BTreeMap::new();
        for (&reference, &value) in &snapshot.reals {
            reals.insert(reference.to_string(), Node::F64(value));
        }
        let mut integers = BTreeMap::new();
        for (&reference, &value) in &snapshot.integers {
            integers.insert(reference.to_string(), Node::I32(value));
        }
        let mut booleans = BTreeMap::new();
        for (&reference, &value) in &snapshot.booleans {
            booleans.insert(reference.to_string(), Node::Bool(value));
        }
        let mut strings = BTreeMap::new();
        for (&reference, value) in &snapshot.strings {
            strings.insert(reference.to_string(), Node::String(value.clone()));
        }
        let mut tree = BTreeMap::new();
        tree.insert("reals".to_string(), Node::Map(reals));
        tree.insert("integers".to_string(), Node::Map(integers));
        tree.insert("booleans".to_string(), Node::Map(booleans));
        tree.insert("strings".to_string(), Node::Map(strings));
        Ok(Node::Map(tree))
    }

    fn import_state(&mut self, state: &Node) -> Result<StateIndex> {
        let malformed = || Error::logic("malformed mock slave state");
        let mut snapshot = MockValues::default();
        for (key, node) in state.get("reals").and_then(Node::as_map).ok_or_else(malformed)? {
            let reference = key.parse().map_err(|_| malformed())?;
            snapshot
                .reals
                .insert(reference, node.as_f64().ok_or_else(malformed)?);
        }
        for (key, node) in state
            .get("integers")
            .and_then(Node::as_map)
            .ok_or_else(malformed)?
        {
            let reference = key.parse().map_err(|_| malformed())?;
            snapshot
                .integers
                .insert(reference, node.as_i64().ok_or_else(malformed)? as i32);
        }
        for (key, node) in state
            .get("booleans")
            .and_then(Node::as_map)
            .ok_or_else(malformed)?
        {
            let reference = key.parse().map_err(|_| malformed())?;
            snapshot
                .booleans
                .insert(reference, node.as_bool().ok_or_else(malformed)?);
        }
        for (key, node) in state
            .get("strings")
            .and_then(Node::as_map)
            .ok_or_else(malformed)?
        {
            let reference = key.parse().map_err(|_| malformed())?;
            snapshot
                .strings
                .insert(reference, node.as_str().ok_or_else(malformed)?.to_string());
        }
        match self.saved.iter().position(Option::is_none) {
            Some(slot) => {
                self.saved[slot] = Some(snapshot);
                Ok(slot as StateIndex)
            }
            None => {
                self.saved.push(Some(snapshot));
                Ok((self.saved.len() - 1) as StateIndex)
            }
        }
    }
}

/// A tiny deterministic generator for randomized structure tests.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        // Constants from Knuth's MMIX generator.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    /// A value in `0..bound`.
    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound.max(1)
    }
}
