//! An element-wise vector sum function.
//!
//! Operation: `out = in[0] + in[1] + ... + in[input_count - 1]`.
//!
//! Parameters:
//!
//! | Parameter      | Type          | Default | Description                           |
//! |----------------|---------------|---------|---------------------------------------|
//! | `input_count`  | integer       | 1       | Number of input vectors               |
//! | `numeric_type` | variable type | real    | Vector element type (real or integer) |
//! | `dimension`    | integer       | 1       | Dimension of input and output vectors |
//!
//! Variable groups: `in` (`input_count` instances of a `dimension`-element
//! input vector) and `out` (one `dimension`-element output vector).

use std::ops::AddAssign;

use lockstep_types::{Causality, Error, FunctionIoReference, Result, VariableType};

use super::description::{
    FunctionDescription, FunctionIoDescription, FunctionIoGroupDescription,
    FunctionParameterDescription, FunctionParameterType, FunctionParameterValue,
    FunctionParameterValueMap, FunctionTypeDescription, ParameterOr,
};
use super::{Function, FunctionType};

/// Parameter positions, for use with [`FunctionParameterValueMap`].
pub const INPUT_COUNT_PARAMETER: usize = 0;
/// See [`INPUT_COUNT_PARAMETER`].
pub const NUMERIC_TYPE_PARAMETER: usize = 1;
/// See [`INPUT_COUNT_PARAMETER`].
pub const DIMENSION_PARAMETER: usize = 2;

const IN_GROUP: usize = 0;
const OUT_GROUP: usize = 1;

/// The numeric element types a vector sum can operate on.
pub trait SumElement: Copy + Default + AddAssign + Send + 'static {
    #[doc(hidden)]
    const VARIABLE_TYPE: VariableType;
    #[doc(hidden)]
    fn from_real(value: f64) -> Option<Self>;
    #[doc(hidden)]
    fn from_integer(value: i32) -> Option<Self>;
    #[doc(hidden)]
    fn to_real(self) -> Option<f64>;
    #[doc(hidden)]
    fn to_integer(self) -> Option<i32>;
}

impl SumElement for f64 {
    const VARIABLE_TYPE: VariableType = VariableType::Real;
    fn from_real(value: f64) -> Option<Self> {
        Some(value)
    }
    fn from_integer(_: i32) -> Option<Self> {
        None
    }
    fn to_real(self) -> Option<f64> {
        Some(self)
    }
    fn to_integer(self) -> Option<i32> {
        None
    }
}

impl SumElement for i32 {
    const VARIABLE_TYPE: VariableType = VariableType::Integer;
    fn from_real(_: f64) -> Option<Self> {
        None
    }
    fn from_integer(value: i32) -> Option<Self> {
        Some(value)
    }
    fn to_real(self) -> Option<f64> {
        None
    }
    fn to_integer(self) -> Option<i32> {
        Some(self)
    }
}

fn resolved_description(
    input_count: usize,
    numeric_type: VariableType,
    dimension: usize,
) -> FunctionDescription {
    FunctionDescription {
        name: "vector_sum".to_string(),
        io_groups: vec![
            FunctionIoGroupDescription {
                name: "in".to_string(),
                count: input_count,
                ios: vec![FunctionIoDescription {
                    name: String::new(),
                    count: dimension,
                    io_type: numeric_type,
                    causality: Causality::Input,
                }],
            },
            FunctionIoGroupDescription {
                name: "out".to_string(),
                count: 1,
                ios: vec![FunctionIoDescription {
                    name: String::new(),
                    count: dimension,
                    io_type: numeric_type,
                    causality: Causality::Output,
                }],
            },
        ],
    }
}

fn bad_io_reference(reference: FunctionIoReference) -> Error {
    Error::invalid_structure(format!(
        "invalid vector_sum variable reference \
         (group {}[{}], io {}[{}])",
        reference.group, reference.group_instance, reference.io, reference.io_instance
    ))
}

/// A vector sum function instance over elements of type `T`.
pub struct VectorSumFunction<T> {
    inputs: Vec<Vec<T>>,
    output: Vec<T>,
    description: FunctionDescription,
}

impl<T: SumElement> VectorSumFunction<T> {
    /// Creates an instance with `input_count` input vectors of the given
    /// dimension.
    pub fn new(input_count: usize, dimension: usize) -> Result<Self> {
        if input_count < 1 {
            return Err(Error::invalid_structure("vector_sum needs at least one input"));
        }
        if dimension < 1 {
            return Err(Error::invalid_structure(
                "vector_sum needs a dimension of at least one",
            ));
        }
        Ok(VectorSumFunction {
            inputs: vec![vec![T::default(); dimension]; input_count],
            output: vec![T::default(); dimension],
            description: resolved_description(input_count, T::VARIABLE_TYPE, dimension),
        })
    }

    /// Reference to a component of an input vector, for convenience.
    pub fn in_reference(input_vector: usize, component: usize) -> FunctionIoReference {
        FunctionIoReference {
            group: IN_GROUP,
            group_instance: input_vector,
            io: 0,
            io_instance: component,
        }
    }

    /// Reference to a component of the output vector, for convenience.
    pub fn out_reference(component: usize) -> FunctionIoReference {
        FunctionIoReference {
            group: OUT_GROUP,
            group_instance: 0,
            io: 0,
            io_instance: component,
        }
    }

    fn input_slot(&mut self, reference: FunctionIoReference) -> Result<&mut T> {
        if reference.group == IN_GROUP && reference.io == 0 {
            if let Some(slot) = self
                .inputs
                .get_mut(reference.group_instance)
                .and_then(|v| v.get_mut(reference.io_instance))
            {
                return Ok(slot);
            }
        }
        Err(bad_io_reference(reference))
    }

    fn value(&self, reference: FunctionIoReference) -> Result<T> {
        if reference.io == 0 {
            if reference.group == IN_GROUP {
                if let Some(v) = self
                    .inputs
                    .get(reference.group_instance)
                    .and_then(|v| v.get(reference.io_instance))
                {
                    return Ok(*v);
                }
            } else if reference.group == OUT_GROUP && reference.group_instance == 0 {
                if let Some(v) = self.output.get(reference.io_instance) {
                    return Ok(*v);
                }
            }
        }
        Err(bad_io_reference(reference))
    }
}

impl<T: SumElement> Function for VectorSumFunction<T> {
    fn description(&self) -> &FunctionDescription {
        &self.description
    }

    fn set_real(&mut self, reference: FunctionIoReference, value: f64) -> Result<()> {
        match T::from_real(value) {
            Some(v) => {
                *self.input_slot(reference)? = v;
                Ok(())
            }
            None => Err(bad_io_reference(reference)),
        }
    }

    fn set_integer(&mut self, reference: FunctionIoReference, value: i32) -> Result<()> {
        match T::from_integer(value) {
            Some(v) => {
                *self.input_slot(reference)? = v;
                Ok(())
            }
            None => Err(bad_io_reference(reference)),
        }
    }

    fn set_boolean(&mut self, reference: FunctionIoReference, _value: bool) -> Result<()> {
        Err(bad_io_reference(reference))
    }

    fn set_string(&mut self, reference: FunctionIoReference, _value: &str) -> Result<()> {
        Err(bad_io_reference(reference))
    }

    fn get_real(&self, reference: FunctionIoReference) -> Result<f64> {
        self.value(reference)?
            .to_real()
            .ok_or_else(|| bad_io_reference(reference))
    }

    fn get_integer(&self, reference: FunctionIoReference) -> Result<i32> {
        self.value(reference)?
            .to_integer()
            .ok_or_else(|| bad_io_reference(reference))
    }

    fn get_boolean(&self, reference: FunctionIoReference) -> Result<bool> {
        Err(bad_io_reference(reference))
    }

    fn get_string(&self, reference: FunctionIoReference) -> Result<&str> {
        Err(bad_io_reference(reference))
    }

    fn calculate(&mut self) -> Result<()> {
        self.output.copy_from_slice(&self.inputs[0]);
        for input in &self.inputs[1..] {
            for (acc, v) in self.output.iter_mut().zip(input) {
                *acc += *v;
            }
        }
        Ok(())
    }
}

/// The vector sum function type.
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorSumFunctionType;

impl FunctionType for VectorSumFunctionType {
    fn description(&self) -> FunctionTypeDescription {
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
                FunctionParameterDescription {
                    name: "dimension".to_string(),
                    parameter_type: FunctionParameterType::Integer,
                    default_value: FunctionParameterValue::Integer(1),
                    min_value: Some(1),
                    max_value: None,
                },
            ],
            io_groups: vec![
                FunctionIoGroupDescription {
                    name: "in".to_string(),
                    count: ParameterOr::Parameter(INPUT_COUNT_PARAMETER),
                    ios: vec![FunctionIoDescription {
                        name: String::new(),
                        count: ParameterOr::Parameter(DIMENSION_PARAMETER),
                        io_type: ParameterOr::Parameter(NUMERIC_TYPE_PARAMETER),
                        causality: Causality::Input,
                    }],
                },
                FunctionIoGroupDescription {
                    name: "out".to_string(),
                    count: ParameterOr::Specified(1),
                    ios: vec![FunctionIoDescription {
                        name: String::new(),
                        count: ParameterOr::Parameter(DIMENSION_PARAMETER),
                        io_type: ParameterOr::Parameter(NUMERIC_TYPE_PARAMETER),
                        causality: Causality::Output,
                    }],
                },
            ],
        }
    }

    fn instantiate(&self, parameters: &FunctionParameterValueMap) -> Result<Box<dyn Function>> {
        let type_description = self.description();
        let resolved = type_description.resolve(parameters)?;
        let input_count = resolved.io_groups[IN_GROUP].count;
        let dimension = resolved.io_groups[IN_GROUP].ios[0].count;
        match resolved.io_groups[IN_GROUP].ios[0].io_type {
            VariableType::Real => Ok(Box::new(VectorSumFunction::<f64>::new(
                input_count,
                dimension,
            )?)),
            VariableType::Integer => Ok(Box::new(VectorSumFunction::<i32>::new(
                input_count,
                dimension,
            )?)),
            other => Err(Error::invalid_structure(format!(
                "vector_sum does not support element type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_real_sum() {
        let mut f = VectorSumFunction::<f64>::new(2, 3).unwrap();
        for (vector, component, value) in [
            (0, 0, 1.0),
            (0, 1, 2.0),
            (0, 2, 3.0),
            (1, 0, 10.0),
            (1, 1, 20.0),
            (1, 2, 30.0),
        ] {
            f.set_real(VectorSumFunction::<f64>::in_reference(vector, component), value)
                .unwrap();
        }
        f.calculate().unwrap();
        let out: Vec<f64> = (0..3)
            .map(|c| f.get_real(VectorSumFunction::<f64>::out_reference(c)).unwrap())
            .collect();
        assert_eq!(out, vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_integer_sum_via_type() {
        let mut params = HashMap::new();
        params.insert(INPUT_COUNT_PARAMETER, FunctionParameterValue::Integer(3));
        params.insert(
            NUMERIC_TYPE_PARAMETER,
            FunctionParameterValue::VariableType(VariableType::Integer),
        );
        let mut f = VectorSumFunctionType.instantiate(&params).unwrap();
        for vector in 0..3 {
            f.set_integer(
                VectorSumFunction::<i32>::in_reference(vector, 0),
                (vector as i32) + 1,
            )
            .unwrap();
        }
        f.calculate().unwrap();
        assert_eq!(
            f.get_integer(VectorSumFunction::<i32>::out_reference(0)).unwrap(),
            6
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut f = VectorSumFunction::<i32>::new(1, 1).unwrap();
        assert!(f
            .set_real(VectorSumFunction::<i32>::in_reference(0, 0), 1.0)
            .is_err());
        assert!(f
            .get_real(VectorSumFunction::<i32>::out_reference(0))
            .is_err());
    }

    #[test]
    fn test_bad_reference_is_rejected() {
        let mut f = VectorSumFunction::<f64>::new(1, 2).unwrap();
        assert!(f
            .set_real(VectorSumFunction::<f64>::in_reference(1, 0), 1.0)
            .is_err());
        assert!(f
            .set_real(VectorSumFunction::<f64>::in_reference(0, 2), 1.0)
            .is_err());
        let description_resolved = f.description();
        assert!(description_resolved.io_groups.iter().all(|g| g.count >= 1));
    }
}
