//! Error types for the deploy item controller

use terrace_core::CoreError;
use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors surfaced to the caller of a reconcile
///
/// Timeouts are not errors: they are recorded on the deploy item status.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A timestamp annotation could not be read
    #[error("unable to parse {kind} timestamp annotation: {source}")]
    Timestamp {
        kind: &'static str,
        #[source]
        source: CoreError,
    },

    /// An object expected to exist is gone
    #[error("{0} not found")]
    NotFound(String),

    /// Reading or writing an object failed
    #[error("unable to access {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored object could not be decoded or encoded
    #[error("unable to decode {key}: {message}")]
    Decode { key: String, message: String },

    /// Deleting deployer resources for an environment failed
    #[error("unable to delete deployer {registration} in environment {environment}: {message}")]
    Deletion {
        registration: String,
        environment: String,
        message: String,
    },

    /// A spawned task did not finish
    #[error("task failed: {0}")]
    Task(String),

    /// Several independent operations failed
    #[error("{}", aggregate_message(.0))]
    Aggregate(Vec<ControllerError>),
}

impl ControllerError {
    pub(crate) fn decode(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Collapses a list of errors, returning `None` when it is empty
    pub fn aggregate(mut errors: Vec<ControllerError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }
}

fn aggregate_message(errors: &[ControllerError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", messages.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_collapses() {
        assert!(ControllerError::aggregate(Vec::new()).is_none());

        let single = ControllerError::aggregate(vec![ControllerError::NotFound("a".into())]);
        assert!(matches!(single, Some(ControllerError::NotFound(_))));

        let many = ControllerError::aggregate(vec![
            ControllerError::NotFound("a".into()),
            ControllerError::Task("boom".into()),
        ])
        .unwrap();
        assert_eq!(many.to_string(), "[a not found, task failed: boom]");
    }
}
