//! Error types for the tether engine.

use crate::transport::TransportError;
use thiserror::Error;

/// All possible errors from the tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Operation errors
    #[error("incorrect type: {0}")]
    IncorrectType(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    // Encoding errors
    #[error("cannot create a pointer to an unsaved {class_name}")]
    UnsavedObject { class_name: String },

    #[error("domain objects are not allowed here")]
    ObjectsNotAllowed,

    #[error("invalid wire value: {0}")]
    InvalidWireValue(String),

    // Lifecycle errors
    #[error("{class_name} has no object id")]
    MissingObjectId { class_name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn incorrect_type(message: impl Into<String>) -> Self {
        Error::IncorrectType(message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation(message.into())
    }

    pub(crate) fn invalid_wire(message: impl Into<String>) -> Self {
        Error::InvalidWireValue(message.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::IncorrectType("cannot increment a non-numeric value".into());
        assert_eq!(
            err.to_string(),
            "incorrect type: cannot increment a non-numeric value"
        );

        let err = Error::UnsavedObject {
            class_name: "GameScore".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot create a pointer to an unsaved GameScore"
        );

        let err = Error::Transport(TransportError::new(100, "connection refused"));
        assert_eq!(err.to_string(), "transport error 100: connection refused");
    }
}
