//! Decimation: simulators stepping at multiples of the base step.

use lockstep_core::{Execution, ExecutionConfig, FixedStepAlgorithm};
use lockstep_integration_tests::{init_test_logging, Lcg, MockSlave};
use lockstep_types::Duration;

#[test]
fn test_fast_and_slow_slaves() {
    init_test_logging();
    let h = Duration::from_seconds(0.1);
    let execution = Execution::with_config(ExecutionConfig::new(h)).unwrap();

    let fast = MockSlave::identity_real("fast");
    let fast_telemetry = fast.telemetry();
    let slow = MockSlave::identity_real("slow");
    let slow_telemetry = slow.telemetry();

    let _fast_index = execution
        .add_slave(Box::new(fast), "fast", Duration::ZERO)
        .unwrap();
    let slow_index = execution
        .add_slave(Box::new(slow), "slow", Duration::ZERO)
        .unwrap();
    execution
        .with_algorithm::<FixedStepAlgorithm, _>(|algorithm| {
            algorithm.set_stepsize_decimation_factor(slow_index, 3)
        })
        .unwrap()
        .unwrap();

    for _ in 0..9 {
        execution.step().unwrap();
    }

    let fast_telemetry = fast_telemetry.lock();
    let slow_telemetry = slow_telemetry.lock();
    assert_eq!(fast_telemetry.step_count, 9);
    assert_eq!(slow_telemetry.step_count, 3);
    assert!(fast_telemetry.step_sizes.iter().all(|&d| d == h));
    assert!(slow_telemetry.step_sizes.iter().all(|&d| d == h * 3));
}

#[test]
fn test_decimation_factor_preconditions() {
    init_test_logging();
    let execution =
        Execution::with_config(ExecutionConfig::new(Duration::from_seconds(0.1))).unwrap();
    let index = execution
        .add_slave(Box::new(MockSlave::identity_real("id")), "id", Duration::ZERO)
        .unwrap();

    execution
        .with_algorithm::<FixedStepAlgorithm, _>(|algorithm| {
            assert!(algorithm.set_stepsize_decimation_factor(index, 0).is_err());
            assert!(algorithm.set_stepsize_decimation_factor(index + 1, 2).is_err());
            algorithm.set_stepsize_decimation_factor(index, 2)
        })
        .unwrap()
        .unwrap();

    // After initialization the factor is frozen.
    execution.step().unwrap();
    execution
        .with_algorithm::<FixedStepAlgorithm, _>(|algorithm| {
            assert!(algorithm.set_stepsize_decimation_factor(index, 4).is_err());
        })
        .unwrap();
}

#[test]
fn test_random_decimation_factors_hold_schedule() {
    init_test_logging();
    let h = Duration::from_seconds(0.05);
    let macro_steps: u64 = 12;
    let mut lcg = Lcg::new(0x5eed);

    for _round in 0..5 {
        let execution = Execution::with_config(ExecutionConfig::new(h)).unwrap();
        let mut slaves = Vec::new();
        for i in 0..4 {
            let factor = lcg.below(4) as i64 + 1;
            let slave = MockSlave::identity_real("s");
            let telemetry = slave.telemetry();
            let name = format!("s{i}");
            let index = execution
                .add_slave(Box::new(slave), &name, Duration::ZERO)
                .unwrap();
            execution
                .with_algorithm::<FixedStepAlgorithm, _>(|algorithm| {
                    algorithm.set_stepsize_decimation_factor(index, factor)
                })
                .unwrap()
                .unwrap();
            slaves.push((factor, telemetry));
        }

        for _ in 0..macro_steps {
            execution.step().unwrap();
        }

        for (factor, telemetry) in slaves {
            let telemetry = telemetry.lock();
            let expected = macro_steps.div_ceil(factor as u64);
            assert_eq!(telemetry.step_count, expected);
            assert!(telemetry.step_sizes.iter().all(|&d| d == h * factor));
            // Every invocation lands on a communication point of its own
            // grid.
            for (n, &t) in telemetry.step_times.iter().enumerate() {
                assert_eq!(t.nanos(), (n as i64) * factor * h.nanos());
            }
        }
    }
}
