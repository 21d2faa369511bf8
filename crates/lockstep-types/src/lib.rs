//! Shared types for the lockstep co-simulation workspace.
//!
//! This crate provides the foundational vocabulary used across the
//! workspace, keeping the heavier runtime crates free of type cycles:
//!
//! - [`time`]: logical time as integer nanosecond ticks
//! - [`variable`]: variable and model metadata
//! - [`ids`]: entity and variable identifier types
//! - [`serialization`]: the tagged tree used for exported simulation state
//! - [`error`]: the workspace-wide error taxonomy

pub mod error;
pub mod ids;
pub mod serialization;
pub mod time;
pub mod variable;

pub use error::{Error, Result};
pub use ids::{
    FunctionIndex, FunctionIoId, FunctionIoReference, SimulatorIndex, StateIndex, ValueReference,
    VariableId,
};
pub use serialization::Node;
pub use time::{Duration, StepNumber, TimePoint};
pub use variable::{
    Causality, ModelCapabilities, ModelDescription, ScalarValue, Variability,
    VariableDescription, VariableType,
};
