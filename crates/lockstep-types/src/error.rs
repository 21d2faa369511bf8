//! Error types shared across the workspace.

use std::fmt;
use std::io;

use crate::ids::StateIndex;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for co-simulation operations.
#[derive(Debug)]
pub enum Error {
    /// A structural mutation was rejected: duplicate names, type mismatch,
    /// multiple drivers on one input, or a missing variable. The system is
    /// left in its previous state.
    InvalidSystemStructure(String),
    /// A set-variables call was only partially accepted. Non-fatal; the
    /// slave remains usable and the simulation continues.
    BadValue(String),
    /// A slave reported failure or raised a fatal error. The execution
    /// transitions to the error state and refuses further stepping.
    Model {
        /// The name of the offending simulator, when known.
        simulator: Option<String>,
        message: String,
    },
    /// A save/restore handle is not known.
    StateIndexInvalid(StateIndex),
    /// An optional capability was not provided by the implementation.
    UnsupportedFeature(String),
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// API misuse, e.g. stepping before initialization or starting a second
    /// simulation run while one is in flight. No state change.
    Logic(String),
}

impl Error {
    /// Constructs an [`Error::InvalidSystemStructure`].
    pub fn invalid_structure(message: impl Into<String>) -> Error {
        Error::InvalidSystemStructure(message.into())
    }

    /// Constructs an [`Error::BadValue`].
    pub fn bad_value(message: impl Into<String>) -> Error {
        Error::BadValue(message.into())
    }

    /// Constructs an [`Error::Model`] without a simulator name.
    pub fn model(message: impl Into<String>) -> Error {
        Error::Model {
            simulator: None,
            message: message.into(),
        }
    }

    /// Constructs an [`Error::Model`] attributed to a named simulator.
    pub fn model_in(simulator: impl Into<String>, message: impl Into<String>) -> Error {
        Error::Model {
            simulator: Some(simulator.into()),
            message: message.into(),
        }
    }

    /// Constructs an [`Error::UnsupportedFeature`].
    pub fn unsupported(message: impl Into<String>) -> Error {
        Error::UnsupportedFeature(message.into())
    }

    /// Constructs an [`Error::Logic`].
    pub fn logic(message: impl Into<String>) -> Error {
        Error::Logic(message.into())
    }

    /// Whether the error leaves the simulation usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Model { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSystemStructure(m) => write!(f, "invalid system structure: {m}"),
            Error::BadValue(m) => write!(f, "bad value: {m}"),
            Error::Model {
                simulator: Some(name),
                message,
            } => write!(f, "model error in '{name}': {message}"),
            Error::Model {
                simulator: None,
                message,
            } => write!(f, "model error: {message}"),
            Error::StateIndexInvalid(idx) => write!(f, "invalid saved-state index {idx}"),
            Error::UnsupportedFeature(m) => write!(f, "unsupported feature: {m}"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::Logic(m) => write!(f, "logic error: {m}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::model_in("engine", "step diverged");
        assert_eq!(e.to_string(), "model error in 'engine': step diverged");
        let e = Error::StateIndexInvalid(3);
        assert_eq!(e.to_string(), "invalid saved-state index 3");
    }

    #[test]
    fn test_fatality() {
        assert!(Error::model("boom").is_fatal());
        assert!(!Error::bad_value("clamped").is_fatal());
        assert!(!Error::logic("misuse").is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let e: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, Error::Io(_)));
    }
}
