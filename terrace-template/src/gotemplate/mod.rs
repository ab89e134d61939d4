//! Structured-text template engine (`GoTemplate`)
//!
//! Templates are handlebars documents rendering to YAML. The binding scope is
//! the context values, plus `state` when state handling is active. A template
//! that renders a top-level `state` key hands that value back as new state.

mod helpers;

pub use helpers::RECURSION_MAX_NUMS;

use handlebars::Handlebars;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use terrace_core::domain::execution::TemplateType;

use crate::blob::BlobResolver;
use crate::context::TemplateContext;
use crate::error::{Result, TemplateError};
use crate::templater::{TemplateOutput, Templater, decode_output, load_state};
use helpers::IncludeState;

/// Decodes template bytes
///
/// Inline templates arrive as a JSON string; template files are plain text.
pub(crate) fn template_source(name: &str, data: &[u8]) -> Result<String> {
    if let Ok(source) = serde_json::from_slice::<String>(data) {
        return Ok(source);
    }
    String::from_utf8(data.to_vec()).map_err(|e| TemplateError::invalid_template(name, e))
}

/// The structured-text engine
#[derive(Debug, Clone, Default)]
pub struct GoTemplater {
    blobs: Option<Arc<dyn BlobResolver>>,
}

impl GoTemplater {
    pub fn new(blobs: Option<Arc<dyn BlobResolver>>) -> Self {
        Self { blobs }
    }

    /// Builds a registry with all helpers bound to the given context
    fn registry(&self, ctx: &TemplateContext, includes: &Arc<IncludeState>) -> Result<Handlebars<'static>> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        hb.register_escape_fn(handlebars::no_escape);

        hb.register_helper("upper", Box::new(helpers::upper));
        hb.register_helper("lower", Box::new(helpers::lower));
        hb.register_helper("trim", Box::new(helpers::trim));
        hb.register_helper("indent", Box::new(helpers::indent));
        hb.register_helper("add", Box::new(helpers::ADD));
        hb.register_helper("sub", Box::new(helpers::SUB));
        hb.register_helper("default", Box::new(helpers::default_value));
        hb.register_helper("toJson", Box::new(helpers::to_json));
        hb.register_helper("toYaml", Box::new(helpers::to_yaml));
        hb.register_helper("b64enc", Box::new(helpers::b64enc));
        hb.register_helper("b64dec", Box::new(helpers::B64Dec));
        hb.register_helper("getResource", Box::new(helpers::GetResource));
        hb.register_helper(
            "getComponent",
            Box::new(helpers::GetComponent {
                cd_list: ctx.generic_cd_list()?,
            }),
        );
        hb.register_helper(
            "getResourceContent",
            Box::new(helpers::GetResourceContent {
                blobs: self.blobs.clone(),
            }),
        );
        if let Some(blueprint) = &ctx.blueprint {
            hb.register_helper(
                "include",
                Box::new(helpers::Include {
                    blueprint: blueprint.clone(),
                    state: includes.clone(),
                    cancel: ctx.cancel.clone(),
                }),
            );
        }
        Ok(hb)
    }

    /// Renders a template against a binding without state handling
    pub fn render(&self, name: &str, template: &[u8], ctx: &TemplateContext, binding: &Value) -> Result<String> {
        if template.is_empty() {
            return Ok(String::new());
        }
        let source = template_source(name, template)?;
        let includes = Arc::new(IncludeState::default());
        let hb = self.registry(ctx, &includes)?;
        hb.render_template(&source, binding).map_err(|e| {
            if let Some(included) = includes.exceeded() {
                return TemplateError::RecursionExceeded {
                    name: included,
                    limit: RECURSION_MAX_NUMS,
                };
            }
            if ctx.cancel.is_cancelled() {
                return TemplateError::Cancelled;
            }
            TemplateError::render(name, e)
        })
    }
}

impl Templater for GoTemplater {
    fn template_type(&self) -> TemplateType {
        TemplateType::GoTemplate
    }

    fn execute(
        &self,
        name: &str,
        template: &[u8],
        state: Option<&[u8]>,
        ctx: &TemplateContext,
    ) -> Result<TemplateOutput> {
        ctx.check_cancelled()?;
        debug!(execution = name, "executing structured-text template");

        let mut binding = ctx.values.clone();
        let state_active = match load_state(name, state)? {
            Some(state) => {
                binding.insert("state".to_string(), state);
                true
            }
            None => false,
        };

        let rendered = self.render(name, template, ctx, &Value::Object(binding))?;
        let result = decode_output(name, &rendered)?;

        let new_state = if state_active {
            match result.get("state") {
                Some(Value::Null) | None => None,
                Some(state) => Some(
                    serde_json::to_vec(state).map_err(|e| TemplateError::invalid_output(name, e))?,
                ),
            }
        } else {
            None
        };

        Ok(TemplateOutput {
            result,
            state: new_state,
        })
    }
}
