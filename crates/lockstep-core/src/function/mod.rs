//! The function layer: stateless computations between co-simulation steps.
//!
//! A function is an operation performed on variables at synchronization
//! points, after the due simulators have completed a macro step. Its input
//! and output variables take part in the connection graph just like
//! simulator variables, but no logical time passes during its evaluation,
//! and it keeps no state between steps.
//!
//! Functions come in two flavors: a [`FunctionType`] describes a function
//! in the abstract, with run-time parameters that may determine the number
//! of variable groups, the number of variables and their types; a
//! [`Function`] is a concrete instance created from a type and a set of
//! parameter values, and is what gets added to an execution.

pub mod description;
pub mod vector_sum;

use lockstep_types::{FunctionIoReference, Result};

pub use description::{
    FunctionDescription, FunctionIoDescription, FunctionIoGroupDescription,
    FunctionParameterDescription, FunctionParameterType, FunctionParameterValue,
    FunctionParameterValueMap, FunctionTypeDescription, ParameterOr,
};
pub use vector_sum::{VectorSumFunction, VectorSumFunctionType};

/// A function instance.
///
/// Output values are only defined after [`Function::calculate`] has been
/// called, and until the next setter call.
pub trait Function: Send {
    /// Returns a description of the instance. The description contains no
    /// placeholders: every cardinality and variable type is concrete.
    fn description(&self) -> &FunctionDescription;

    /// Sets the value of a real input variable.
    fn set_real(&mut self, reference: FunctionIoReference, value: f64) -> Result<()>;

    /// Sets the value of an integer input variable.
    fn set_integer(&mut self, reference: FunctionIoReference, value: i32) -> Result<()>;

    /// Sets the value of a boolean input variable.
    fn set_boolean(&mut self, reference: FunctionIoReference, value: bool) -> Result<()>;

    /// Sets the value of a string input variable.
    fn set_string(&mut self, reference: FunctionIoReference, value: &str) -> Result<()>;

    /// Retrieves the value of a real variable.
    fn get_real(&self, reference: FunctionIoReference) -> Result<f64>;

    /// Retrieves the value of an integer variable.
    fn get_integer(&self, reference: FunctionIoReference) -> Result<i32>;

    /// Retrieves the value of a boolean variable.
    fn get_boolean(&self, reference: FunctionIoReference) -> Result<bool>;

    /// Retrieves the value of a string variable.
    fn get_string(&self, reference: FunctionIoReference) -> Result<&str>;

    /// Performs the function calculation.
    fn calculate(&mut self) -> Result<()>;
}

/// A function type, acting as a factory for [`Function`] instances.
pub trait FunctionType {
    /// Returns a description of the type. Fields that depend on parameter
    /// values are placeholders until instantiation.
    fn description(&self) -> FunctionTypeDescription;

    /// Instantiates a function with the given parameter values, keyed by
    /// parameter position.
    fn instantiate(&self, parameters: &FunctionParameterValueMap) -> Result<Box<dyn Function>>;
}
