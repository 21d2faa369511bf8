//! The function layer evaluated between macro steps.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use lockstep_core::function::description::FunctionParameterValue;
use lockstep_core::function::vector_sum::INPUT_COUNT_PARAMETER;
use lockstep_core::{
    Execution, ExecutionConfig, FunctionType, LastValueObserver, VectorSumFunction,
    VectorSumFunctionType,
};
use lockstep_integration_tests::{init_test_logging, MockSlave, IDENTITY_IN, IDENTITY_OUT};
use lockstep_types::{Duration, FunctionIoId, VariableId, VariableType};

fn real_variable(simulator: i32, reference: u32) -> VariableId {
    VariableId {
        simulator,
        variable_type: VariableType::Real,
        reference,
    }
}

#[test]
fn test_vector_sum_between_slaves() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();

    let a = execution
        .add_slave(Box::new(MockSlave::identity_real("a")), "a", Duration::ZERO)
        .unwrap();
    let b = execution
        .add_slave(Box::new(MockSlave::identity_real("b")), "b", Duration::ZERO)
        .unwrap();
    let c = execution
        .add_slave(Box::new(MockSlave::identity_real("c")), "c", Duration::ZERO)
        .unwrap();

    let mut parameters = HashMap::new();
    parameters.insert(INPUT_COUNT_PARAMETER, FunctionParameterValue::Integer(2));
    let sum = execution
        .add_function(VectorSumFunctionType.instantiate(&parameters).unwrap())
        .unwrap();

    let sum_in = |vector: usize| FunctionIoId {
        function: sum,
        variable_type: VariableType::Real,
        reference: VectorSumFunction::<f64>::in_reference(vector, 0),
    };
    let sum_out = FunctionIoId {
        function: sum,
        variable_type: VariableType::Real,
        reference: VectorSumFunction::<f64>::out_reference(0),
    };

    execution
        .connect_variable_to_function(real_variable(a, IDENTITY_OUT), sum_in(0))
        .unwrap();
    execution
        .connect_variable_to_function(real_variable(b, IDENTITY_OUT), sum_in(1))
        .unwrap();
    execution
        .connect_function_to_variable(sum_out, real_variable(c, IDENTITY_IN), None)
        .unwrap();

    execution.set_real_initial_value(a, IDENTITY_IN, 2.0).unwrap();
    execution.set_real_initial_value(b, IDENTITY_IN, 3.0).unwrap();

    // The function is evaluated after the parallel phase; its output lands
    // on c's input cache and is applied on the following step.
    execution.step().unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(c, IDENTITY_OUT), Some(5.0));
}

#[test]
fn test_function_output_transform() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();

    let source = execution
        .add_slave(Box::new(MockSlave::identity_real("source")), "source", Duration::ZERO)
        .unwrap();
    let sink = execution
        .add_slave(Box::new(MockSlave::identity_real("sink")), "sink", Duration::ZERO)
        .unwrap();
    let sum = execution
        .add_function(VectorSumFunctionType.instantiate(&HashMap::new()).unwrap())
        .unwrap();

    execution
        .connect_variable_to_function(
            real_variable(source, IDENTITY_OUT),
            FunctionIoId {
                function: sum,
                variable_type: VariableType::Real,
                reference: VectorSumFunction::<f64>::in_reference(0, 0),
            },
        )
        .unwrap();
    execution
        .connect_function_to_variable(
            FunctionIoId {
                function: sum,
                variable_type: VariableType::Real,
                reference: VectorSumFunction::<f64>::out_reference(0),
            },
            real_variable(sink, IDENTITY_IN),
            Some(lockstep_core::LinearTransform {
                factor: 2.0,
                offset: 1.0,
            }),
        )
        .unwrap();
    execution
        .set_real_initial_value(source, IDENTITY_IN, 4.0)
        .unwrap();

    execution.step().unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sink, IDENTITY_OUT), Some(2.0 * 4.0 + 1.0));
}

#[test]
fn test_function_io_validation() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let a = execution
        .add_slave(Box::new(MockSlave::identity_real("a")), "a", Duration::ZERO)
        .unwrap();
    let sum = execution
        .add_function(VectorSumFunctionType.instantiate(&HashMap::new()).unwrap())
        .unwrap();

    // Out-of-range group instance.
    assert!(execution
        .connect_variable_to_function(
            real_variable(a, IDENTITY_OUT),
            FunctionIoId {
                function: sum,
                variable_type: VariableType::Real,
                reference: VectorSumFunction::<f64>::in_reference(1, 0),
            },
        )
        .is_err());

    // Wrong direction: the output group cannot be used as a target.
    assert!(execution
        .connect_variable_to_function(
            real_variable(a, IDENTITY_OUT),
            FunctionIoId {
                function: sum,
                variable_type: VariableType::Real,
                reference: VectorSumFunction::<f64>::out_reference(0),
            },
        )
        .is_err());

    // Wrong type.
    assert!(execution
        .connect_variable_to_function(
            real_variable(a, IDENTITY_OUT),
            FunctionIoId {
                function: sum,
                variable_type: VariableType::Integer,
                reference: VectorSumFunction::<f64>::in_reference(0, 0),
            },
        )
        .is_err());
}
