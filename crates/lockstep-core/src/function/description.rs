//! Descriptions of function types and instances.
//!
//! A function *type* describes its parameters and its variable groups in
//! the abstract; group cardinalities, variable cardinalities and variable
//! types may be placeholders referring to parameters. Instantiating the
//! type with a concrete parameter-value map resolves every placeholder,
//! yielding the description of a function *instance*.

use std::collections::HashMap;

use lockstep_types::{Causality, Error, Result, VariableType};

/// The data type of a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionParameterType {
    Integer,
    Real,
    /// A variable-type-valued parameter (e.g. "real or integer").
    VariableType,
}

/// A concrete function parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionParameterValue {
    Integer(i32),
    Real(f64),
    VariableType(VariableType),
}

/// Parameter values keyed by the parameter's position in
/// [`FunctionTypeDescription::parameters`].
pub type FunctionParameterValueMap = HashMap<usize, FunctionParameterValue>;

/// A value that is either specified directly or deferred to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterOr<T> {
    /// A concrete value.
    Specified(T),
    /// A placeholder referring to the parameter at the given position.
    Parameter(usize),
}

impl<T: Copy> ParameterOr<T> {
    /// Returns the concrete value, if there is one.
    pub fn specified(self) -> Option<T> {
        match self {
            ParameterOr::Specified(v) => Some(v),
            ParameterOr::Parameter(_) => None,
        }
    }
}

/// Describes one function parameter.
#[derive(Debug, Clone)]
pub struct FunctionParameterDescription {
    /// The parameter name.
    pub name: String,
    /// The parameter data type.
    pub parameter_type: FunctionParameterType,
    /// The value used when the instantiation map omits the parameter.
    pub default_value: FunctionParameterValue,
    /// Optional lower bound for integer parameters.
    pub min_value: Option<i32>,
    /// Optional upper bound for integer parameters.
    pub max_value: Option<i32>,
}

/// Describes one variable in a function variable group.
#[derive(Debug, Clone)]
pub struct FunctionIoDescription<C, V> {
    /// The variable name; empty for unnamed variables.
    pub name: String,
    /// The number of instances of this variable.
    pub count: C,
    /// The variable data type.
    pub io_type: V,
    /// Whether the variable is an input or an output of the function.
    pub causality: Causality,
}

/// Describes one variable group of a function.
#[derive(Debug, Clone)]
pub struct FunctionIoGroupDescription<C, V> {
    /// The group name.
    pub name: String,
    /// The number of instances of this group.
    pub count: C,
    /// The variables of the group.
    pub ios: Vec<FunctionIoDescription<C, V>>,
}

/// Description of a function type; cardinalities and variable types may be
/// placeholders.
#[derive(Debug, Clone)]
pub struct FunctionTypeDescription {
    /// The function type name.
    pub name: String,
    /// The function parameters.
    pub parameters: Vec<FunctionParameterDescription>,
    /// The variable groups.
    pub io_groups: Vec<FunctionIoGroupDescription<ParameterOr<usize>, ParameterOr<VariableType>>>,
}

/// Description of a function instance; everything is concrete.
#[derive(Debug, Clone)]
pub struct FunctionDescription {
    /// The function type name.
    pub name: String,
    /// The resolved variable groups.
    pub io_groups: Vec<FunctionIoGroupDescription<usize, VariableType>>,
}

impl FunctionTypeDescription {
    /// Returns the effective value of the parameter at `position`, taking
    /// the default when the map does not bind it, and checking type and
    /// bounds.
    pub fn parameter_value(
        &self,
        parameters: &FunctionParameterValueMap,
        position: usize,
    ) -> Result<FunctionParameterValue> {
        let description = self.parameters.get(position).ok_or_else(|| {
            Error::invalid_structure(format!(
                "function type '{}' has no parameter at position {position}",
                self.name
            ))
        })?;
        let value = parameters
            .get(&position)
            .copied()
            .unwrap_or(description.default_value);
        let type_matches = matches!(
            (description.parameter_type, value),
            (FunctionParameterType::Integer, FunctionParameterValue::Integer(_))
                | (FunctionParameterType::Real, FunctionParameterValue::Real(_))
                | (
                    FunctionParameterType::VariableType,
                    FunctionParameterValue::VariableType(_)
                )
        );
        if !type_matches {
            return Err(Error::invalid_structure(format!(
                "wrong type for parameter '{}' of function type '{}'",
                description.name, self.name
            )));
        }
        if let FunctionParameterValue::Integer(v) = value {
            if description.min_value.is_some_and(|min| v < min)
                || description.max_value.is_some_and(|max| v > max)
            {
                return Err(Error::invalid_structure(format!(
                    "value {v} for parameter '{}' of function type '{}' is out of range",
                    description.name, self.name
                )));
            }
        }
        Ok(value)
    }

    /// Resolves every placeholder against `parameters`, producing the
    /// description of an instance.
    pub fn resolve(
        &self,
        parameters: &FunctionParameterValueMap,
    ) -> Result<FunctionDescription> {
        let count = |c: &ParameterOr<usize>| -> Result<usize> {
            match *c {
                ParameterOr::Specified(n) => Ok(n),
                ParameterOr::Parameter(p) => match self.parameter_value(parameters, p)? {
                    FunctionParameterValue::Integer(n) if n >= 0 => Ok(n as usize),
                    _ => Err(Error::invalid_structure(format!(
                        "parameter '{}' of function type '{}' cannot express a cardinality",
                        self.parameters[p].name, self.name
                    ))),
                },
            }
        };
        let io_type = |t: &ParameterOr<VariableType>| -> Result<VariableType> {
            match *t {
                ParameterOr::Specified(vt) => Ok(vt),
                ParameterOr::Parameter(p) => match self.parameter_value(parameters, p)? {
                    FunctionParameterValue::VariableType(vt) => Ok(vt),
                    _ => Err(Error::invalid_structure(format!(
                        "parameter '{}' of function type '{}' is not a variable type",
                        self.parameters[p].name, self.name
                    ))),
                },
            }
        };

        let mut groups = Vec::with_capacity(self.io_groups.len());
        for group in &self.io_groups {
            let mut ios = Vec::with_capacity(group.ios.len());
            for io in &group.ios {
                ios.push(FunctionIoDescription {
                    name: io.name.clone(),
                    count: count(&io.count)?,
                    io_type: io_type(&io.io_type)?,
                    causality: io.causality,
                });
            }
            groups.push(FunctionIoGroupDescription {
                name: group.name.clone(),
                count: count(&group.count)?,
                ios,
            });
        }
        Ok(FunctionDescription {
            name: self.name.clone(),
            io_groups: groups,
        })
    }
}

impl FunctionDescription {
    /// Looks up the description of the variable addressed by a reference,
    /// validating all four indices.
    pub fn find_io(
        &self,
        reference: lockstep_types::FunctionIoReference,
    ) -> Option<&FunctionIoDescription<usize, VariableType>> {
        let group = self.io_groups.get(reference.group)?;
        if reference.group_instance >= group.count {
            return None;
        }
        let io = group.ios.get(reference.io)?;
        if reference.io_instance >= io.count {
            return None;
        }
        Some(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_types::FunctionIoReference;

    fn sum_type_description() -> FunctionTypeDescription {
        FunctionTypeDescription {
            name: "vector_sum".to_string(),
            parameters: vec![
                FunctionParameterDescription {
                    name: "input_count".to_string(),
                    parameter_type: FunctionParameterType::Integer,
                    default_value: FunctionParameterValue::Integer(1),
                    min_value: Some(1),
                    max_value: None,
                },
                FunctionParameterDescription {
                    name: "numeric_type".to_string(),
                    parameter_type: FunctionParameterType::VariableType,
                    default_value: FunctionParameterValue::VariableType(VariableType::Real),
                    min_value: None,
                    max_value: None,
                },
            ],
            io_groups: vec![FunctionIoGroupDescription {
                name: "in".to_string(),
                count: ParameterOr::Parameter(0),
                ios: vec![FunctionIoDescription {
                    name: String::new(),
                    count: ParameterOr::Specified(1),
                    io_type: ParameterOr::Parameter(1),
                    causality: Causality::Input,
                }],
            }],
        }
    }

    #[test]
    fn test_resolve_with_defaults() {
        let td = sum_type_description();
        let resolved = td.resolve(&HashMap::new()).unwrap();
        assert_eq!(resolved.io_groups[0].count, 1);
        assert_eq!(resolved.io_groups[0].ios[0].io_type, VariableType::Real);
    }

    #[test]
    fn test_resolve_with_values() {
        let td = sum_type_description();
        let mut params = HashMap::new();
        params.insert(0, FunctionParameterValue::Integer(3));
        params.insert(1, FunctionParameterValue::VariableType(VariableType::Integer));
        let resolved = td.resolve(&params).unwrap();
        assert_eq!(resolved.io_groups[0].count, 3);
        assert_eq!(resolved.io_groups[0].ios[0].io_type, VariableType::Integer);
    }

    #[test]
    fn test_out_of_range_parameter() {
        let td = sum_type_description();
        let mut params = HashMap::new();
        params.insert(0, FunctionParameterValue::Integer(0));
        assert!(td.resolve(&params).is_err());
    }

    #[test]
    fn test_wrongly_typed_parameter() {
        let td = sum_type_description();
        let mut params = HashMap::new();
        params.insert(0, FunctionParameterValue::Real(2.0));
        assert!(td.resolve(&params).is_err());
    }

    #[test]
    fn test_find_io_bounds() {
        let td = sum_type_description();
        let mut params = HashMap::new();
        params.insert(0, FunctionParameterValue::Integer(2));
        let resolved = td.resolve(&params).unwrap();
        let ok = FunctionIoReference {
            group: 0,
            group_instance: 1,
            io: 0,
            io_instance: 0,
        };
        assert!(resolved.find_io(ok).is_some());
        let bad_instance = FunctionIoReference {
            group_instance: 2,
            ..ok
        };
        assert!(resolved.find_io(bad_instance).is_none());
    }
}
