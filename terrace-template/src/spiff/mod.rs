//! Declarative-merge template engine (`Spiff`)
//!
//! A template is a YAML document. String leaves of the form `(( expr ))` are
//! replaced by the value of `expr`, a Lua expression evaluated in a sandbox
//! that binds every context value as a global, the whole context as `values`
//! and, with state handling, the prior state as `state`.
//!
//! Markers in front of the expression change how a node is merged:
//! - `&state` keeps the value of the prior state at the same path if there is
//!   one and records the node in the determined state
//! - `&temporary` evaluates the node but drops it from the output
//!
//! A leaf starting with `((!` is an escaped literal and loses the `!`.

mod eval;

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use terrace_core::domain::execution::TemplateType;

use crate::blob::BlobResolver;
use crate::context::TemplateContext;
use crate::error::{Result, TemplateError};
use crate::module::ModuleRegistry;
use crate::modules::{Base64Module, ComponentModule, JsonModule, YamlModule};
use crate::templater::{TemplateOutput, Templater, load_state};
use eval::Evaluator;

/// The declarative-merge engine
#[derive(Debug, Clone, Default)]
pub struct SpiffTemplater {
    blobs: Option<Arc<dyn BlobResolver>>,
}

impl SpiffTemplater {
    pub fn new(blobs: Option<Arc<dyn BlobResolver>>) -> Self {
        Self { blobs }
    }

    /// Helper modules loaded into the expression sandbox
    pub fn modules(&self, ctx: &TemplateContext) -> Result<ModuleRegistry> {
        let mut registry = ModuleRegistry::new();
        registry.register(JsonModule);
        registry.register(YamlModule);
        registry.register(Base64Module);
        registry.register(ComponentModule::new(ctx.generic_cd_list()?, self.blobs.clone()));
        Ok(registry)
    }

    /// Evaluates a template document against a binding without state handling
    pub fn evaluate(&self, name: &str, template: Value, binding: &Map<String, Value>, ctx: &TemplateContext) -> Result<Value> {
        let modules = self.modules(ctx)?;
        let mut evaluator = Evaluator::new(name, binding, None, &modules, &ctx.cancel)?;
        Ok(evaluator.run(template)?.0)
    }
}

/// Parses template bytes as YAML; a YAML string holding a document is unwrapped
pub(crate) fn parse_template(name: &str, data: &[u8]) -> Result<Value> {
    let value: Value =
        serde_yaml::from_slice(data).map_err(|e| TemplateError::invalid_template(name, e))?;
    match value {
        Value::String(source) if !eval::is_expression(&source) => {
            serde_yaml::from_str(&source).map_err(|e| TemplateError::invalid_template(name, e))
        }
        other => Ok(other),
    }
}

impl Templater for SpiffTemplater {
    fn template_type(&self) -> TemplateType {
        TemplateType::Spiff
    }

    fn execute(
        &self,
        name: &str,
        template: &[u8],
        state: Option<&[u8]>,
        ctx: &TemplateContext,
    ) -> Result<TemplateOutput> {
        ctx.check_cancelled()?;
        debug!(execution = name, "executing declarative-merge template");

        let template = parse_template(name, template)?;
        let prior = load_state(name, state)?;

        let mut binding = ctx.values.clone();
        if !binding.contains_key("values") {
            binding.insert("values".to_string(), Value::Object(ctx.values.clone()));
        }

        let modules = self.modules(ctx)?;
        let mut evaluator = Evaluator::new(name, &binding, prior.as_ref(), &modules, &ctx.cancel)?;
        let (result, determined) = evaluator.run(template)?;

        let result = match result {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let state = match (prior.is_some(), determined) {
            (true, Some(determined)) => Some(
                serde_json::to_vec(&determined)
                    .map_err(|e| TemplateError::invalid_output(name, e))?,
            ),
            _ => None,
        };

        Ok(TemplateOutput { result, state })
    }
}
