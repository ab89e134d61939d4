use serde_json::Value;
use std::sync::Arc;

use terrace_core::domain::execution::TemplateType;

use crate::blob::BlobResolver;
use crate::context::TemplateContext;
use crate::error::{Result, TemplateError};
use crate::gotemplate::GoTemplater;
use crate::spiff::SpiffTemplater;

/// Result of one template execution
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOutput {
    /// The rendered document
    pub result: Value,
    /// New opaque state, `None` if the template produced none
    pub state: Option<Vec<u8>>,
}

/// A template engine
///
/// # State handling
/// - `state == None`: no state handling, the template is purely functional
/// - `state == Some(&[])`: first execution, the template sees an empty state object
/// - otherwise the bytes are the state this engine returned last time
pub trait Templater: Send + Sync {
    /// The template type tag this engine handles
    fn template_type(&self) -> TemplateType;

    /// Executes a template
    ///
    /// # Arguments
    /// * `name` - Name of the execution, used in errors
    /// * `template` - Raw template bytes
    /// * `state` - Prior state, see the trait docs
    /// * `ctx` - Values and descriptors visible to the template
    ///
    /// # Errors
    /// Returns a [`TemplateError`] if the template cannot be parsed, rendered or decoded
    fn execute(
        &self,
        name: &str,
        template: &[u8],
        state: Option<&[u8]>,
        ctx: &TemplateContext,
    ) -> Result<TemplateOutput>;
}

/// Decodes a stored state blob, treating empty bytes as an empty object
pub(crate) fn load_state(name: &str, state: Option<&[u8]>) -> Result<Option<Value>> {
    match state {
        None => Ok(None),
        Some([]) => Ok(Some(Value::Object(Default::default()))),
        Some(bytes) => serde_yaml::from_slice(bytes)
            .map(Some)
            .map_err(|e| TemplateError::invalid_state(name, e)),
    }
}

/// Decodes rendered YAML/JSON output; an empty document is an empty object
pub(crate) fn decode_output(name: &str, rendered: &str) -> Result<Value> {
    if rendered.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value =
        serde_yaml::from_str(rendered).map_err(|e| TemplateError::invalid_output(name, e))?;
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

/// Lookup of template engines by their type tag
///
/// Passed to the orchestrator at construction time.
pub struct TemplaterRegistry {
    engines: Vec<Box<dyn Templater>>,
}

impl TemplaterRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    /// Creates a registry with the structured-text and declarative-merge engines
    pub fn with_defaults(blobs: Option<Arc<dyn BlobResolver>>) -> Self {
        let mut registry = Self::new();
        registry.register(GoTemplater::new(blobs.clone()));
        registry.register(SpiffTemplater::new(blobs));
        registry
    }

    /// Registers an engine
    ///
    /// # Panics
    /// Panics if an engine for the same type is already registered
    pub fn register<T: Templater + 'static>(&mut self, engine: T) {
        let template_type = engine.template_type();
        if self.get(&template_type).is_some() {
            panic!("Templater for type '{}' is already registered", template_type);
        }
        self.engines.push(Box::new(engine));
    }

    /// Gets the engine for a type tag
    pub fn get(&self, template_type: &TemplateType) -> Option<&dyn Templater> {
        self.engines
            .iter()
            .find(|e| &e.template_type() == template_type)
            .map(|e| e.as_ref())
    }

    /// Returns the type tags of all registered engines
    pub fn types(&self) -> Vec<TemplateType> {
        self.engines.iter().map(|e| e.template_type()).collect()
    }
}

impl Default for TemplaterRegistry {
    fn default() -> Self {
        Self::with_defaults(None)
    }
}
