//! Scenario data: timed variable actions applied during a simulation.
//!
//! Decoding scenarios from files is a separate concern; this module only
//! defines the in-memory form consumed by the scenario manager.

use lockstep_types::{Duration, SimulatorIndex, ValueReference, VariableType};

use crate::simulator::{BooleanModifier, IntegerModifier, RealModifier, StringModifier};

/// A typed modifier to install, or `None` within a variant to clear the
/// modifier on that side.
pub enum VariableModifier {
    Real(Option<RealModifier>),
    Integer(Option<IntegerModifier>),
    Boolean(Option<BooleanModifier>),
    String(Option<StringModifier>),
}

impl VariableModifier {
    /// Returns the variable type this modifier applies to.
    pub fn variable_type(&self) -> VariableType {
        match self {
            VariableModifier::Real(_) => VariableType::Real,
            VariableModifier::Integer(_) => VariableType::Integer,
            VariableModifier::Boolean(_) => VariableType::Boolean,
            VariableModifier::String(_) => VariableType::String,
        }
    }

    /// Constructs a modifier that overrides a real variable with a constant.
    pub fn real_override(value: f64) -> VariableModifier {
        VariableModifier::Real(Some(Box::new(move |_, _| value)))
    }

    /// Constructs a modifier that overrides an integer variable with a
    /// constant.
    pub fn integer_override(value: i32) -> VariableModifier {
        VariableModifier::Integer(Some(Box::new(move |_, _| value)))
    }

    /// Constructs a modifier that overrides a boolean variable with a
    /// constant.
    pub fn boolean_override(value: bool) -> VariableModifier {
        VariableModifier::Boolean(Some(Box::new(move |_, _| value)))
    }

    /// Constructs a modifier that overrides a string variable with a
    /// constant.
    pub fn string_override(value: impl Into<String>) -> VariableModifier {
        let value = value.into();
        VariableModifier::String(Some(Box::new(move |_, _| value.clone())))
    }
}

/// Installs or clears one modifier on one simulator variable.
pub struct VariableAction {
    /// The simulator that owns the variable.
    pub simulator: SimulatorIndex,
    /// The variable value reference.
    pub variable: ValueReference,
    /// The modifier to install or clear.
    pub modifier: VariableModifier,
    /// Whether the variable is driven on the input side (input/parameter
    /// causality) or intercepted on the output side.
    pub is_input: bool,
}

/// A variable action with a relative trigger time.
pub struct Event {
    /// Trigger time, relative to the moment the scenario was loaded. The
    /// event fires at the first step commencing at or after this time.
    pub time: Duration,
    /// The action to perform.
    pub action: VariableAction,
}

/// A timed list of events, with an optional end time after which the
/// scenario is finished and its modifiers are reverted.
pub struct Scenario {
    pub events: Vec<Event>,
    pub end: Option<Duration>,
}
