//! Identifier types for entities and variables in an execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::variable::VariableType;

/// A dense index which identifies a sub-simulator in an execution.
pub type SimulatorIndex = i32;

/// A dense index which identifies a function in an execution.
pub type FunctionIndex = i32;

/// The opaque integer key a slave assigns to each of its variables.
pub type ValueReference = u32;

/// A reference to a saved slave state.
pub type StateIndex = i32;

/// Uniquely identifies a simulator variable in an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableId {
    /// The simulator that owns the variable.
    pub simulator: SimulatorIndex,
    /// The variable data type.
    pub variable_type: VariableType,
    /// The variable value reference.
    pub reference: ValueReference,
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(simulator {}, type {}, variable {})",
            self.simulator, self.variable_type, self.reference
        )
    }
}

/// Identifies one variable of a function, after parameterization.
///
/// Function variables are organized in groups, and both groups and
/// variables may have multiple instances; the four indices pick one
/// concrete variable instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionIoReference {
    /// The variable group index.
    pub group: usize,
    /// The instance of the variable group.
    pub group_instance: usize,
    /// The variable index within the group.
    pub io: usize,
    /// The instance of the variable.
    pub io_instance: usize,
}

/// Uniquely identifies a function variable in an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionIoId {
    /// The function that owns the variable.
    pub function: FunctionIndex,
    /// The variable data type.
    pub variable_type: VariableType,
    /// The variable reference.
    pub reference: FunctionIoReference,
}

impl fmt::Display for FunctionIoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(function {}, type {}, group {}[{}], io {}[{}])",
            self.function,
            self.variable_type,
            self.reference.group,
            self.reference.group_instance,
            self.reference.io,
            self.reference.io_instance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_id_display() {
        let id = VariableId {
            simulator: 2,
            variable_type: VariableType::Real,
            reference: 7,
        };
        assert_eq!(id.to_string(), "(simulator 2, type real, variable 7)");
    }

    #[test]
    fn test_variable_id_equality() {
        let a = VariableId {
            simulator: 0,
            variable_type: VariableType::Integer,
            reference: 1,
        };
        let b = VariableId {
            variable_type: VariableType::Real,
            ..a
        };
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
