//! Override and scenario manipulators driving variable modifiers.

use std::sync::Arc;

use parking_lot::Mutex;

use lockstep_core::manipulator::scenario::{Event, Scenario, VariableAction, VariableModifier};
use lockstep_core::{
    Execution, ExecutionConfig, LastValueObserver, OverrideManipulator, ScenarioManager,
    TimeSeriesObserver,
};
use lockstep_integration_tests::{init_test_logging, MockSlave, IDENTITY_IN, IDENTITY_OUT};
use lockstep_types::{Duration, TimePoint, VariableId, VariableType};

fn real_variable(simulator: i32, reference: u32) -> VariableId {
    VariableId {
        simulator,
        variable_type: VariableType::Real,
        reference,
    }
}

#[test]
fn test_override_install_and_clear() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();
    let manipulator = Arc::new(Mutex::new(OverrideManipulator::new()));
    execution.add_manipulator(manipulator.clone()).unwrap();

    let sim = execution
        .add_slave(Box::new(MockSlave::identity_real("plant")), "plant", Duration::ZERO)
        .unwrap();

    // Step 1: no override yet.
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(0.0));

    // Queue the override; it takes effect on the imminent step.
    manipulator
        .lock()
        .override_real_variable(sim, IDENTITY_IN, 7.0)
        .unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(7.0));
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(7.0));
    execution.step().unwrap();

    // The override shows up as a modified variable.
    let modified = execution.modified_variables();
    assert_eq!(modified, vec![real_variable(sim, IDENTITY_IN)]);

    // Clearing returns the variable to its original trajectory.
    manipulator
        .lock()
        .reset_variable(sim, VariableType::Real, IDENTITY_IN)
        .unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(0.0));
    assert!(execution.modified_variables().is_empty());
}

#[test]
fn test_override_output_side() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();
    let manipulator = Arc::new(Mutex::new(OverrideManipulator::new()));
    execution.add_manipulator(manipulator.clone()).unwrap();

    let sim = execution
        .add_slave(Box::new(MockSlave::identity_real("plant")), "plant", Duration::ZERO)
        .unwrap();
    execution.set_real_initial_value(sim, IDENTITY_IN, 1.0).unwrap();

    // `out` has output causality, so the override intercepts the reading
    // without touching the slave.
    manipulator
        .lock()
        .override_real_variable(sim, IDENTITY_OUT, -4.5)
        .unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(-4.5));

    manipulator
        .lock()
        .reset_variable(sim, VariableType::Real, IDENTITY_OUT)
        .unwrap();
    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(1.0));
}

#[test]
fn test_scenario_event_fires_at_trigger_time() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let series = Arc::new(Mutex::new(TimeSeriesObserver::new()));
    execution.add_observer(series.clone()).unwrap();
    let manager = Arc::new(Mutex::new(ScenarioManager::new()));
    execution.add_manipulator(manager.clone()).unwrap();

    let sim = execution
        .add_slave(Box::new(MockSlave::identity_real("plant")), "plant", Duration::ZERO)
        .unwrap();
    let observed = real_variable(sim, IDENTITY_OUT);
    series.lock().start_observing(observed).unwrap();

    manager.lock().load_scenario(
        Scenario {
            events: vec![Event {
                time: Duration::from_seconds(0.3),
                action: VariableAction {
                    simulator: sim,
                    variable: IDENTITY_OUT,
                    modifier: VariableModifier::real_override(42.0),
                    is_input: false,
                },
            }],
            end: Some(Duration::from_seconds(0.8)),
        },
        TimePoint::ZERO,
    );

    for _ in 0..5 {
        execution.step().unwrap();
    }

    let samples = series.lock().real_samples(observed, 0);
    let value_at = |step: i64| {
        samples
            .iter()
            .find(|s| s.step == step)
            .map(|s| s.value)
            .expect("sample recorded for step")
    };
    assert_eq!(value_at(2), 0.0);
    assert_eq!(value_at(3), 42.0);
    assert_eq!(value_at(4), 42.0);
    assert!(manager.lock().is_scenario_running());
}

#[test]
fn test_scenario_cleanup_reverts_modifiers() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let observer = Arc::new(Mutex::new(LastValueObserver::new()));
    execution.add_observer(observer.clone()).unwrap();
    let manager = Arc::new(Mutex::new(ScenarioManager::new()));
    execution.add_manipulator(manager.clone()).unwrap();

    let sim = execution
        .add_slave(Box::new(MockSlave::identity_real("plant")), "plant", Duration::ZERO)
        .unwrap();

    manager.lock().load_scenario(
        Scenario {
            events: vec![Event {
                time: Duration::ZERO,
                action: VariableAction {
                    simulator: sim,
                    variable: IDENTITY_IN,
                    modifier: VariableModifier::real_override(9.0),
                    is_input: true,
                },
            }],
            end: Some(Duration::from_seconds(0.15)),
        },
        TimePoint::ZERO,
    );

    execution.step().unwrap();
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(9.0));
    assert!(!execution.modified_variables().is_empty());

    // Past the end time the scenario finishes and reverts its modifier.
    execution.step().unwrap();
    execution.step().unwrap();
    assert!(!manager.lock().is_scenario_running());
    assert!(execution.modified_variables().is_empty());
    assert_eq!(observer.lock().real_value(sim, IDENTITY_OUT), Some(0.0));
}
