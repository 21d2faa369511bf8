//! Entity tables owned by the execution and borrowed by the algorithm.

use std::collections::BTreeMap;

use lockstep_types::{FunctionIndex, SimulatorIndex};

use crate::function::Function;
use crate::simulator::Simulator;

/// Lookup access to the simulators of an execution, passed into observer
/// and manipulator callbacks. Callbacks use it for the duration of the call
/// only; no references are retained across calls.
pub trait SimulatorRegistry {
    /// Returns the simulator with the given index.
    fn simulator(&self, index: SimulatorIndex) -> Option<&dyn Simulator>;

    /// Returns mutable access to the simulator with the given index.
    fn simulator_mut(&mut self, index: SimulatorIndex) -> Option<&mut dyn Simulator>;
}

/// The simulators of an execution, keyed by index.
#[derive(Default)]
pub struct SimulatorTable {
    entries: BTreeMap<SimulatorIndex, Box<dyn Simulator>>,
    next_index: SimulatorIndex,
}

impl SimulatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a simulator and returns its index. Indices are dense and
    /// never reused.
    pub fn insert(&mut self, simulator: Box<dyn Simulator>) -> SimulatorIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(index, simulator);
        index
    }

    pub fn remove(&mut self, index: SimulatorIndex) -> Option<Box<dyn Simulator>> {
        self.entries.remove(&index)
    }

    pub fn contains(&self, index: SimulatorIndex) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn get(&self, index: SimulatorIndex) -> Option<&dyn Simulator> {
        self.entries.get(&index).map(|s| s.as_ref() as &dyn Simulator)
    }

    pub fn get_mut(&mut self, index: SimulatorIndex) -> Option<&mut Box<dyn Simulator>> {
        self.entries.get_mut(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SimulatorIndex, &dyn Simulator)> {
        self.entries
            .iter()
            .map(|(&i, s)| (i, s.as_ref() as &dyn Simulator))
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (SimulatorIndex, &mut Box<dyn Simulator>)> {
        self.entries.iter_mut().map(|(&i, s)| (i, s))
    }

    pub fn indices(&self) -> impl Iterator<Item = SimulatorIndex> + '_ {
        self.entries.keys().copied()
    }
}

impl SimulatorRegistry for SimulatorTable {
    fn simulator(&self, index: SimulatorIndex) -> Option<&dyn Simulator> {
        self.get(index)
    }

    fn simulator_mut(&mut self, index: SimulatorIndex) -> Option<&mut dyn Simulator> {
        self.entries.get_mut(&index).map(|s| s.as_mut() as &mut dyn Simulator)
    }
}

/// The functions of an execution, keyed by index.
#[derive(Default)]
pub struct FunctionTable {
    entries: BTreeMap<FunctionIndex, Box<dyn Function>>,
    next_index: FunctionIndex,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a function and returns its index.
    pub fn insert(&mut self, function: Box<dyn Function>) -> FunctionIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(index, function);
        index
    }

    pub fn remove(&mut self, index: FunctionIndex) -> Option<Box<dyn Function>> {
        self.entries.remove(&index)
    }

    pub fn contains(&self, index: FunctionIndex) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn get(&self, index: FunctionIndex) -> Option<&dyn Function> {
        self.entries.get(&index).map(|f| f.as_ref() as &dyn Function)
    }

    pub fn get_mut(&mut self, index: FunctionIndex) -> Option<&mut Box<dyn Function>> {
        self.entries.get_mut(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = FunctionIndex> + '_ {
        self.entries.keys().copied()
    }
}
