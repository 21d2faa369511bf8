//! Saving and restoring complete simulation states.

use std::sync::Arc;

use parking_lot::Mutex;

use lockstep_core::{
    Execution, ExecutionConfig, LastValueObserver, LinearTransform, TimeSeriesObserver,
};
use lockstep_integration_tests::{init_test_logging, MockSlave, IDENTITY_IN, IDENTITY_OUT};
use lockstep_types::{Duration, Error, TimePoint, VariableId, VariableType};

fn real_variable(simulator: i32, reference: u32) -> VariableId {
    VariableId {
        simulator,
        variable_type: VariableType::Real,
        reference,
    }
}

/// An identity slave whose input is fed back from its own output plus one,
/// so the output counts the completed steps.
fn counting_execution() -> (Execution, Arc<Mutex<LastValueObserver>>, i32) {
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();
    let sim = execution
        .add_slave(Box::new(MockSlave::identity_real("counter")), "counter", Duration::ZERO)
        .unwrap();
    execution
        .connect_variables_with_transform(
            real_variable(sim, IDENTITY_OUT),
            real_variable(sim, IDENTITY_IN),
            LinearTransform {
                factor: 1.0,
                offset: 1.0,
            },
        )
        .unwrap();
    (execution, observer, sim)
}

#[test]
fn test_save_restore_round_trip() {
    init_test_logging();
    let (execution, observer, sim) = counting_execution();

    for _ in 0..3 {
        execution.step().unwrap();
    }
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(3.0));
    let saved = execution.save_state().unwrap();
    let saved_time = execution.current_time();

    for _ in 0..3 {
        execution.step().unwrap();
    }
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(6.0));

    execution.restore_state(saved).unwrap();
    assert_eq!(execution.current_time(), saved_time);
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(3.0));

    // The restored trajectory continues exactly where the saved one was.
    execution.step().unwrap();
    assert_eq!(execution.current_time(), TimePoint::from_seconds(0.4));
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(4.0));

    execution.release_state(saved).unwrap();
    assert!(matches!(
        execution.restore_state(saved),
        Err(Error::StateIndexInvalid(_))
    ));
}

#[test]
fn test_restore_can_be_repeated() {
    init_test_logging();
    let (execution, observer, sim) = counting_execution();

    execution.step().unwrap();
    let saved = execution.save_state().unwrap();

    for _ in 0..2 {
        for _ in 0..4 {
            execution.step().unwrap();
        }
        execution.restore_state(saved).unwrap();
        assert_eq!(execution.current_time(), TimePoint::from_seconds(0.1));
        assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(1.0));
    }
}

#[test]
fn test_invalid_handles_are_rejected() {
    init_test_logging();
    let (execution, _observer, _sim) = counting_execution();
    execution.step().unwrap();
    assert!(matches!(
        execution.restore_state(3),
        Err(Error::StateIndexInvalid(3))
    ));
    assert!(matches!(
        execution.release_state(-1),
        Err(Error::StateIndexInvalid(-1))
    ));
}

#[test]
fn test_save_before_initialization_is_a_logic_error() {
    init_test_logging();
    let (execution, _observer, _sim) = counting_execution();
    assert!(matches!(execution.save_state(), Err(Error::Logic(_))));
}

#[test]
fn test_slave_without_state_support_fails_save() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    execution
        .add_slave(
            Box::new(MockSlave::identity_real("volatile").with_state_support(false)),
            "volatile",
            Duration::ZERO,
        )
        .unwrap();
    execution.step().unwrap();
    assert!(matches!(
        execution.save_state(),
        Err(Error::UnsupportedFeature(_))
    ));
}

#[test]
fn test_restore_fails_with_history_observer() {
    init_test_logging();
    let (execution, _observer, sim) = counting_execution();
    let series = Arc::new(Mutex::new(TimeSeriesObserver::new()));
    execution.add_observer(series.clone()).unwrap();
    series
        .lock()
        .start_observing(real_variable(sim, IDENTITY_OUT))
        .unwrap();

    execution.step().unwrap();
    let saved = execution.save_state().unwrap();
    execution.step().unwrap();

    // The time-series observer cannot rebuild its sample history, so the
    // restore is refused.
    assert!(matches!(
        execution.restore_state(saved),
        Err(Error::UnsupportedFeature(_))
    ));
}
