//! Model metadata: variable descriptions and model descriptions.
//!
//! A model description is immutable input to the runtime. It lists the
//! model's variables with their value references, data types, causalities
//! and optional start values, plus the model's capability flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ValueReference;

/// The data type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
    String,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VariableType::Real => "real",
            VariableType::Integer => "integer",
            VariableType::Boolean => "boolean",
            VariableType::String => "string",
        };
        f.write_str(text)
    }
}

/// The causality of a variable, i.e. its role in the model's data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Causality {
    Input,
    Output,
    Parameter,
    CalculatedParameter,
    Local,
    Independent,
}

impl Causality {
    /// Whether the runtime may read the variable's value.
    pub fn is_readable(self) -> bool {
        // Every causality exposes a readable value.
        true
    }

    /// Whether the runtime may drive the variable's value.
    pub fn is_writable(self) -> bool {
        matches!(self, Causality::Input | Causality::Parameter)
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Causality::Input => "input",
            Causality::Output => "output",
            Causality::Parameter => "parameter",
            Causality::CalculatedParameter => "calculated_parameter",
            Causality::Local => "local",
            Causality::Independent => "independent",
        };
        f.write_str(text)
    }
}

/// The variability of a variable, i.e. when its value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Continuous,
}

impl fmt::Display for Variability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Variability::Constant => "constant",
            Variability::Fixed => "fixed",
            Variability::Tunable => "tunable",
            Variability::Discrete => "discrete",
            Variability::Continuous => "continuous",
        };
        f.write_str(text)
    }
}

/// A typed scalar value, used for variable start values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    String(String),
}

impl ScalarValue {
    /// Returns the variable type that this value belongs to.
    pub fn variable_type(&self) -> VariableType {
        match self {
            ScalarValue::Real(_) => VariableType::Real,
            ScalarValue::Integer(_) => VariableType::Integer,
            ScalarValue::Boolean(_) => VariableType::Boolean,
            ScalarValue::String(_) => VariableType::String,
        }
    }
}

/// Metadata for one variable of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescription {
    /// The variable name, unique within the model.
    pub name: String,
    /// The value reference the model assigned to the variable. Unique per
    /// (model, type).
    pub reference: ValueReference,
    /// The variable data type.
    pub variable_type: VariableType,
    /// The variable causality.
    pub causality: Causality,
    /// The variable variability.
    pub variability: Variability,
    /// An optional start value. When present, its type matches
    /// `variable_type`.
    #[serde(default)]
    pub start: Option<ScalarValue>,
}

/// Optional capabilities a model may declare.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Whether the model supports saving and restoring its internal state.
    #[serde(default)]
    pub can_save_state: bool,
}

/// An immutable description of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    /// The model name.
    pub name: String,
    /// A universally unique identifier for this particular model.
    #[serde(default)]
    pub uuid: String,
    /// A human-readable description.
    #[serde(default)]
    pub description: String,
    /// The model author.
    #[serde(default)]
    pub author: String,
    /// The model version.
    #[serde(default)]
    pub version: String,
    /// The model's variables.
    pub variables: Vec<VariableDescription>,
    /// The model's capability flags.
    #[serde(default)]
    pub capabilities: ModelCapabilities,
}

impl ModelDescription {
    /// Looks up a variable by name.
    pub fn find_variable(&self, name: &str) -> Option<&VariableDescription> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Looks up a variable by type and value reference.
    pub fn find_variable_by_ref(
        &self,
        variable_type: VariableType,
        reference: ValueReference,
    ) -> Option<&VariableDescription> {
        self.variables
            .iter()
            .find(|v| v.variable_type == variable_type && v.reference == reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description() -> ModelDescription {
        ModelDescription {
            name: "adder".to_string(),
            uuid: String::new(),
            description: String::new(),
            author: String::new(),
            version: String::new(),
            variables: vec![
                VariableDescription {
                    name: "in".to_string(),
                    reference: 0,
                    variable_type: VariableType::Real,
                    causality: Causality::Input,
                    variability: Variability::Continuous,
                    start: Some(ScalarValue::Real(0.0)),
                },
                VariableDescription {
                    name: "out".to_string(),
                    reference: 1,
                    variable_type: VariableType::Real,
                    causality: Causality::Output,
                    variability: Variability::Continuous,
                    start: None,
                },
            ],
            capabilities: ModelCapabilities::default(),
        }
    }

    #[test]
    fn test_find_variable() {
        let md = description();
        assert_eq!(md.find_variable("out").unwrap().reference, 1);
        assert!(md.find_variable("missing").is_none());
        let v = md.find_variable_by_ref(VariableType::Real, 0).unwrap();
        assert_eq!(v.name, "in");
        assert!(md.find_variable_by_ref(VariableType::Integer, 0).is_none());
    }

    #[test]
    fn test_causality_predicates() {
        assert!(Causality::Input.is_writable());
        assert!(Causality::Parameter.is_writable());
        assert!(!Causality::Output.is_writable());
        assert!(Causality::Output.is_readable());
        assert!(Causality::Local.is_readable());
    }

    #[test]
    fn test_scalar_value_type() {
        assert_eq!(ScalarValue::Real(1.0).variable_type(), VariableType::Real);
        assert_eq!(
            ScalarValue::String("x".to_string()).variable_type(),
            VariableType::String
        );
    }
}
