//! The slave capability: the contract the runtime consumes from each
//! model backend.
//!
//! The call sequence is:
//!
//! 1. `setup()`: configure the slave and enter initialization mode.
//! 2. `set_*_variables()` / `get_*_variables()`: variable initialization,
//!    any number of times in any order.
//! 3. `start_simulation()`: end initialization, begin stepping.
//! 4. `do_step()`, `get_*_variables()`, `set_*_variables()`: simulation.
//! 5. `end_simulation()`.
//!
//! Any method may fail with a fatal error, after which the slave is
//! considered broken and receives no further calls. The one exception is
//! that `set_*_variables` may fail with [`Error::BadValue`] to signal that
//! one or more values were clamped or ignored while the slave remains
//! usable.
//!
//! [`Error::BadValue`]: lockstep_types::Error::BadValue

use lockstep_types::{
    Duration, ModelDescription, Node, Result, StateIndex, TimePoint, ValueReference,
};

/// The outcome of a time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The step completed successfully.
    Complete,
    /// The step could not be completed. Retrying with a shorter step is
    /// not supported; the macro step is reported as failed.
    Failed,
}

fn no_state_support() -> lockstep_types::Error {
    lockstep_types::Error::unsupported("slave does not support state save/restore")
}

/// An opaque sub-simulator advancing in logical time with typed variables.
pub trait Slave: Send {
    /// Returns a description of the slave's model.
    fn model_description(&self) -> ModelDescription;

    /// Performs pre-simulation setup and enters initialization mode.
    ///
    /// `start_time` and `stop_time` bound the interval within which the
    /// model equations must be valid; `do_step` is never called outside it.
    /// `relative_tolerance`, when given, may be used for error control in
    /// the slave's internal integrator.
    fn setup(
        &mut self,
        start_time: TimePoint,
        stop_time: Option<TimePoint>,
        relative_tolerance: Option<f64>,
    ) -> Result<()>;

    /// Ends the initialization stage and begins the simulation.
    fn start_simulation(&mut self) -> Result<()>;

    /// Informs the slave that the simulation run has ended.
    fn end_simulation(&mut self) -> Result<()>;

    /// Performs model calculations for the interval from `current_t` of
    /// length `delta_t`. `delta_t` is always positive.
    fn do_step(&mut self, current_t: TimePoint, delta_t: Duration) -> Result<StepResult>;

    /// Reads the values of real variables into `values`, in the order given
    /// by `variables`. Both slices have the same length.
    fn get_real_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [f64],
    ) -> Result<()>;

    /// Reads the values of integer variables. See [`Slave::get_real_variables`].
    fn get_integer_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [i32],
    ) -> Result<()>;

    /// Reads the values of boolean variables. See [`Slave::get_real_variables`].
    fn get_boolean_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [bool],
    ) -> Result<()>;

    /// Reads the values of string variables. See [`Slave::get_real_variables`].
    fn get_string_variables(
        &mut self,
        variables: &[ValueReference],
        values: &mut [String],
    ) -> Result<()>;

    /// Writes the values of real variables.
    ///
    /// May fail with `BadValue` when some values were out of range but have
    /// been accepted or ignored, in which case the simulation can proceed.
    fn set_real_variables(&mut self, variables: &[ValueReference], values: &[f64]) -> Result<()>;

    /// Writes the values of integer variables. See [`Slave::set_real_variables`].
    fn set_integer_variables(&mut self, variables: &[ValueReference], values: &[i32])
        -> Result<()>;

    /// Writes the values of boolean variables. See [`Slave::set_real_variables`].
    fn set_boolean_variables(&mut self, variables: &[ValueReference], values: &[bool])
        -> Result<()>;

    /// Writes the values of string variables. See [`Slave::set_real_variables`].
    fn set_string_variables(&mut self, variables: &[ValueReference], values: &[String])
        -> Result<()>;

    /// Saves the slave's complete internal state and returns a reference to
    /// it. Only available when the model description declares
    /// `can_save_state`.
    fn save_state(&mut self) -> Result<StateIndex> {
        Err(no_state_support())
    }

    /// Saves the current state, overwriting a previously saved one.
    fn save_state_to(&mut self, _index: StateIndex) -> Result<()> {
        Err(no_state_support())
    }

    /// Restores a previously saved state. The state is the complete and
    /// exact state at the moment it was saved, including which lifecycle
    /// phase the slave was in.
    fn restore_state(&mut self, _index: StateIndex) -> Result<()> {
        Err(no_state_support())
    }

    /// Frees the resources associated with a saved state. The index may be
    /// reused by a later `save_state` call.
    fn release_state(&mut self, _index: StateIndex) -> Result<()> {
        Err(no_state_support())
    }

    /// Exports a saved state as a serializable tree.
    fn export_state(&mut self, _index: StateIndex) -> Result<Node> {
        Err(no_state_support())
    }

    /// Imports a previously exported state into the slave's internal list
    /// of saved states. The state must come from a slave of a compatible
    /// type.
    fn import_state(&mut self, _state: &Node) -> Result<StateIndex> {
        Err(no_state_support())
    }
}
