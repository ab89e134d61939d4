//! Error types for template execution

use thiserror::Error;

/// Result type alias for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors raised by template engines
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template source could not be parsed by the engine
    #[error("template {name:?}: unable to parse template: {message}")]
    InvalidTemplate { name: String, message: String },

    /// Rendering failed
    #[error("template {name:?}: unable to execute template: {message}")]
    Render { name: String, message: String },

    /// An `include` nested deeper than the recursion bound
    #[error("rendering template has a nested reference name: {name} (limit {limit})")]
    RecursionExceeded { name: String, limit: usize },

    /// A declarative-merge expression failed to evaluate
    #[error("template {name:?}: unable to evaluate (( {expression} )): {message}")]
    Expression {
        name: String,
        expression: String,
        message: String,
    },

    /// The rendered output is not valid YAML/JSON
    #[error("template {name:?}: error while decoding templated execution: {message}")]
    InvalidOutput { name: String, message: String },

    /// The stored state could not be loaded
    #[error("template {name:?}: unable to load state: {message}")]
    InvalidState { name: String, message: String },

    /// A resource blob could not be fetched
    #[error("unable to fetch blob of resource {resource:?}: {message}")]
    Blob { resource: String, message: String },

    /// A descriptor lookup did not match
    #[error("{0}")]
    Lookup(String),

    /// The execution was cancelled
    #[error("template execution cancelled")]
    Cancelled,

    #[error(transparent)]
    Lua(#[from] mlua::Error),

    #[error(transparent)]
    Core(#[from] terrace_core::CoreError),
}

impl TemplateError {
    pub fn invalid_template(name: &str, message: impl ToString) -> Self {
        Self::InvalidTemplate {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn render(name: &str, message: impl ToString) -> Self {
        Self::Render {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_output(name: &str, message: impl ToString) -> Self {
        Self::InvalidOutput {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_state(name: &str, message: impl ToString) -> Self {
        Self::InvalidState {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}
