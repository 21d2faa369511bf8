//! Co-simulation runtime core.
//!
//! This crate orchestrates a set of black-box sub-simulators ("slaves")
//! that advance in logical time in lock-step, exchanging variable values at
//! discrete synchronization points. It neither integrates equations nor
//! inspects model internals; each slave encapsulates an opaque model with
//! typed variables and its own solver.
//!
//! The main pieces:
//!
//! - [`slave`]: the capability contract consumed from each model backend
//! - [`simulator`]: the wrapper that gives the scheduler a batched,
//!   modifier-aware view of one slave
//! - [`function`]: stateless computations evaluated between steps
//! - [`algorithm`]: the stepping scheduler ([`FixedStepAlgorithm`] with
//!   per-simulator decimation and a worker pool)
//! - [`execution`]: the facade composing everything, with background
//!   simulation runs, save/restore and real-time pacing
//! - [`observer`] / [`manipulator`]: passive and active participants
//! - [`utility`]: the path-keyed file lock used by file-backed slaves

pub mod algorithm;
pub mod config;
pub mod execution;
pub mod function;
pub mod manipulator;
pub mod observer;
pub mod registry;
pub mod simulator;
pub mod slave;
pub mod timer;
pub mod utility;

pub use algorithm::{Algorithm, FixedStepAlgorithm, LinearTransform};
pub use config::{ExecutionConfig, RealTimeSettings};
pub use execution::{Execution, SimulationHandle};
pub use function::{Function, FunctionType, VectorSumFunction, VectorSumFunctionType};
pub use manipulator::{Manipulator, OverrideManipulator, ScenarioManager};
pub use observer::{LastValueObserver, Observer, TimeSeriesObserver};
pub use registry::{FunctionTable, SimulatorRegistry, SimulatorTable};
pub use simulator::{
    BooleanModifier, IntegerModifier, Manipulable, Observable, RealModifier, Simulator,
    SlaveSimulator, StringModifier,
};
pub use slave::{Slave, StepResult};
pub use timer::{RealTimeConfig, RealTimeTimer};
pub use utility::FileLock;
