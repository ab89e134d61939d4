//! Error types for the installation pipeline

use terrace_core::domain::import::ImportType;
use terrace_template::TemplateError;
use thiserror::Error;

use crate::state::StateError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort an orchestration pass
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required import has no value
    #[error("blueprint defines import {name:?} of type {import_type}, which is not satisfied")]
    ImportNotFound {
        name: String,
        import_type: ImportType,
    },

    /// An import value does not match its schema or target type
    #[error("{path}: {message}")]
    SchemaValidationFailed { path: String, message: String },

    /// An execution names a template type no engine is registered for
    #[error("{kind} execution {name:?}: unknown template type {template_type:?}")]
    UnknownTemplateType {
        kind: String,
        name: String,
        template_type: String,
    },

    /// An import definition has a type outside the known import kinds
    #[error("{path}: unknown import type '{import_type}'")]
    UnknownImportType { path: String, import_type: String },

    /// An `include` nested deeper than allowed
    #[error("{kind} execution {name:?}: template recursion: {source}")]
    TemplateRecursionExceeded {
        kind: String,
        name: String,
        #[source]
        source: TemplateError,
    },

    /// A deploy item specification cannot be turned into a deploy item
    #[error("invalid deployitem specification {name:?}: {message}")]
    InvalidDeployItemSpecification { name: String, message: String },

    /// Reading or writing execution state failed
    #[error("{kind} execution {name:?}: unable to handle state: {source}")]
    State {
        kind: String,
        name: String,
        #[source]
        source: StateError,
    },

    /// The pass was cancelled or ran past its deadline
    #[error("orchestration pass cancelled")]
    Cancelled,

    /// A template engine failed
    #[error("{kind} execution {name:?}: {source}")]
    Template {
        kind: String,
        name: String,
        #[source]
        source: TemplateError,
    },

    /// A template produced output of the wrong shape
    #[error("{kind} execution {name:?}: error while decoding templated execution: {message}")]
    Decode {
        kind: String,
        name: String,
        message: String,
    },

    /// Import executions reported validation errors
    #[error("import validation failed: {0}")]
    ImportValidation(String),

    /// A component or its blobs could not be resolved
    #[error("unable to resolve component {component}: {message}")]
    ComponentResolution { component: String, message: String },

    #[error(transparent)]
    Core(#[from] terrace_core::CoreError),
}

impl PipelineError {
    /// Stable reason string, used as condition reason on installations
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::ImportNotFound { .. } => "ImportNotFound",
            PipelineError::SchemaValidationFailed { .. } => "SchemaValidationFailed",
            PipelineError::UnknownTemplateType { .. } => "UnknownTemplateType",
            PipelineError::UnknownImportType { .. } => "UnknownImportType",
            PipelineError::TemplateRecursionExceeded { .. } => "TemplateRecursionExceeded",
            PipelineError::InvalidDeployItemSpecification { .. } => "InvalidDeployItemSpecification",
            PipelineError::State { .. } => "StateHandlingFailed",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Template { .. } | PipelineError::Decode { .. } => "TemplatingFailed",
            PipelineError::ImportValidation(_) => "ImportValidationFailed",
            PipelineError::ComponentResolution { .. } => "ComponentResolutionFailed",
            PipelineError::Core(_) => "InvalidBlueprint",
        }
    }

    pub(crate) fn schema(path: impl ToString, message: impl Into<String>) -> Self {
        PipelineError::SchemaValidationFailed {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn deploy_item(name: &str, message: impl Into<String>) -> Self {
        PipelineError::InvalidDeployItemSpecification {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
