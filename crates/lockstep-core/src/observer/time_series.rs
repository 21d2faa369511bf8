//! An observer that buffers time series for explicitly observed variables.

use std::collections::{HashMap, VecDeque};

use lockstep_types::{
    Duration, Error, Result, SimulatorIndex, StepNumber, TimePoint, VariableId, VariableType,
};

use crate::registry::SimulatorRegistry;
use crate::simulator::Observable;

use super::Observer;

const DEFAULT_SAMPLE_CAPACITY: usize = 10_000;

/// One buffered sample of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    /// The step number at which the value was committed.
    pub step: StepNumber,
    /// The logical time of the communication point.
    pub time: TimePoint,
    /// The observed value.
    pub value: T,
}

enum SampleBuffer {
    Real(VecDeque<Sample<f64>>),
    Integer(VecDeque<Sample<i32>>),
    Boolean(VecDeque<Sample<bool>>),
}

impl SampleBuffer {
    fn new(variable_type: VariableType) -> Option<SampleBuffer> {
        match variable_type {
            VariableType::Real => Some(SampleBuffer::Real(VecDeque::new())),
            VariableType::Integer => Some(SampleBuffer::Integer(VecDeque::new())),
            VariableType::Boolean => Some(SampleBuffer::Boolean(VecDeque::new())),
            // String series are unbounded in size; not supported.
            VariableType::String => None,
        }
    }

    fn trim(&mut self, capacity: usize) {
        match self {
            SampleBuffer::Real(b) => {
                while b.len() > capacity {
                    b.pop_front();
                }
            }
            SampleBuffer::Integer(b) => {
                while b.len() > capacity {
                    b.pop_front();
                }
            }
            SampleBuffer::Boolean(b) => {
                while b.len() > capacity {
                    b.pop_front();
                }
            }
        }
    }
}

/// Buffers sampled values for a chosen set of variables, keyed by step
/// number. The buffer for each variable is bounded; old samples fall out
/// as new ones arrive.
///
/// The sample history cannot be reconstructed from a restored state, so
/// this observer refuses [`Observer::state_restored`].
pub struct TimeSeriesObserver {
    capacity: usize,
    series: HashMap<VariableId, SampleBuffer>,
}

impl Default for TimeSeriesObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeriesObserver {
    /// Creates an observer with the default per-variable buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }

    /// Creates an observer that keeps at most `capacity` samples per
    /// variable.
    pub fn with_capacity(capacity: usize) -> Self {
        TimeSeriesObserver {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Starts buffering samples of `variable`. Sampling begins at the next
    /// communication point of the owning simulator.
    pub fn start_observing(&mut self, variable: VariableId) -> Result<()> {
        let buffer = SampleBuffer::new(variable.variable_type).ok_or_else(|| {
            Error::unsupported(format!(
                "time series observation of {} variables",
                variable.variable_type
            ))
        })?;
        self.series.entry(variable).or_insert(buffer);
        Ok(())
    }

    /// Stops buffering samples of `variable` and discards its series.
    pub fn stop_observing(&mut self, variable: VariableId) {
        self.series.remove(&variable);
    }

    /// Returns the buffered real samples of `variable` with step numbers at
    /// or after `from_step`.
    pub fn real_samples(&self, variable: VariableId, from_step: StepNumber) -> Vec<Sample<f64>> {
        match self.series.get(&variable) {
            Some(SampleBuffer::Real(b)) => {
                b.iter().filter(|s| s.step >= from_step).copied().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Returns the buffered integer samples of `variable` with step numbers
    /// at or after `from_step`.
    pub fn integer_samples(
        &self,
        variable: VariableId,
        from_step: StepNumber,
    ) -> Vec<Sample<i32>> {
        match self.series.get(&variable) {
            Some(SampleBuffer::Integer(b)) => {
                b.iter().filter(|s| s.step >= from_step).copied().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Returns the buffered boolean samples of `variable` with step numbers
    /// at or after `from_step`.
    pub fn boolean_samples(
        &self,
        variable: VariableId,
        from_step: StepNumber,
    ) -> Vec<Sample<bool>> {
        match self.series.get(&variable) {
            Some(SampleBuffer::Boolean(b)) => {
                b.iter().filter(|s| s.step >= from_step).copied().collect()
            }
            _ => Vec::new(),
        }
    }
}

impl Observer for TimeSeriesObserver {
    fn simulator_added(
        &mut self,
        _index: SimulatorIndex,
        simulator: &mut dyn Observable,
        _current_time: TimePoint,
    ) -> Result<()> {
        // Expose everything up front so observation can start at any time.
        let variables: Vec<_> = simulator
            .model_description()
            .variables
            .iter()
            .map(|v| (v.variable_type, v.reference))
            .collect();
        for (variable_type, reference) in variables {
            simulator.expose_for_getting(variable_type, reference)?;
        }
        Ok(())
    }

    fn simulator_removed(&mut self, index: SimulatorIndex, _current_time: TimePoint) {
        self.series.retain(|variable, _| variable.simulator != index);
    }

    fn simulator_step_complete(
        &mut self,
        index: SimulatorIndex,
        last_step: StepNumber,
        _last_step_size: Duration,
        current_time: TimePoint,
        simulator: &dyn Observable,
    ) {
        for (variable, buffer) in self.series.iter_mut() {
            if variable.simulator != index {
                continue;
            }
            match buffer {
                SampleBuffer::Real(b) => {
                    if let Ok(value) = simulator.get_real(variable.reference) {
                        b.push_back(Sample {
                            step: last_step,
                            time: current_time,
                            value,
                        });
                    }
                }
                SampleBuffer::Integer(b) => {
                    if let Ok(value) = simulator.get_integer(variable.reference) {
                        b.push_back(Sample {
                            step: last_step,
                            time: current_time,
                            value,
                        });
                    }
                }
                SampleBuffer::Boolean(b) => {
                    if let Ok(value) = simulator.get_boolean(variable.reference) {
                        b.push_back(Sample {
                            step: last_step,
                            time: current_time,
                            value,
                        });
                    }
                }
            }
            buffer.trim(self.capacity);
        }
    }

    fn state_restored(
        &mut self,
        _current_step: StepNumber,
        _current_time: TimePoint,
        _simulators: &dyn SimulatorRegistry,
    ) -> Result<()> {
        Err(Error::unsupported(
            "the time series observer cannot rebuild its sample history after a state restore",
        ))
    }
}
