//! Template execution context

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use terrace_core::domain::blueprint::Blueprint;
use terrace_core::domain::component::{ComponentDescriptor, ComponentDescriptorList};

use crate::error::{Result, TemplateError};

/// Everything a template can see during one execution pass
///
/// Built once per pass. `values` is the binding scope of every template; the
/// orchestrator adds to it as import executions produce bindings.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub blueprint: Option<Arc<Blueprint>>,
    pub cd: Option<Arc<ComponentDescriptor>>,
    pub cd_list: Option<Arc<ComponentDescriptorList>>,
    pub values: Map<String, Value>,
    pub cancel: CancellationToken,
}

impl TemplateContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn with_blueprint(mut self, blueprint: Arc<Blueprint>) -> Self {
        self.blueprint = Some(blueprint);
        self
    }

    pub fn with_component_descriptor(mut self, cd: Option<Arc<ComponentDescriptor>>) -> Self {
        self.cd = cd;
        self
    }

    pub fn with_component_descriptor_list(
        mut self,
        cd_list: Option<Arc<ComponentDescriptorList>>,
    ) -> Self {
        self.cd_list = cd_list;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fails with [`TemplateError::Cancelled`] once the pass was cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TemplateError::Cancelled);
        }
        Ok(())
    }

    /// The component descriptor list as plain JSON, used by descriptor lookups
    pub fn generic_cd_list(&self) -> Result<Option<Value>> {
        match &self.cd_list {
            Some(list) => Ok(Some(list.to_generic()?)),
            None => Ok(None),
        }
    }
}
