//! Error types for core operations

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading blueprints or reading shared metadata
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading a file from a blueprint filesystem failed
    #[error("unable to read file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A document could not be decoded
    #[error("unable to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// A timestamp annotation holds a value that is not RFC 3339
    #[error("unable to parse timestamp annotation {key}={value:?}: {source}")]
    InvalidTimestamp {
        key: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A template executor declares no template or more than one
    #[error("template executor {name:?}: {reason}")]
    InvalidTemplateExecutor { name: String, reason: String },
}

impl CoreError {
    /// Create a decode error for a named document
    pub fn decode(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }
}
