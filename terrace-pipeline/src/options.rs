//! Inputs of one orchestration pass and the template values derived from them

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use terrace_core::domain::blueprint::Blueprint;
use terrace_core::domain::component::{ComponentDescriptor, ComponentDescriptorList};
use terrace_core::domain::installation::Installation;
use terrace_core::CoreError;
use terrace_template::TemplateContext;

use crate::error::Result;

fn to_generic<T: Serialize>(what: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CoreError::decode(what, e).into())
}

/// Base options shared by every execution kind
#[derive(Debug, Clone)]
pub struct BlueprintExecutionOptions {
    pub installation: Option<Arc<Installation>>,
    pub blueprint: Arc<Blueprint>,
    pub component_descriptor: Option<Arc<ComponentDescriptor>>,
    pub component_descriptors: Option<Arc<ComponentDescriptorList>>,
    /// Constructed imports, visible as `imports` to import executions
    pub imports: Option<Map<String, Value>>,
}

impl BlueprintExecutionOptions {
    pub fn new(installation: Option<Arc<Installation>>, blueprint: Arc<Blueprint>) -> Self {
        Self {
            installation,
            blueprint,
            component_descriptor: None,
            component_descriptors: None,
            imports: None,
        }
    }

    pub fn with_component_descriptor(mut self, cd: Option<Arc<ComponentDescriptor>>) -> Self {
        self.component_descriptor = cd;
        self
    }

    pub fn with_component_descriptors(mut self, list: Option<Arc<ComponentDescriptorList>>) -> Self {
        self.component_descriptors = list;
        self
    }

    pub fn with_imports(mut self, imports: Map<String, Value>) -> Self {
        self.imports = Some(imports);
        self
    }

    /// Values every template sees
    ///
    /// Descriptors are re-encoded to plain JSON so templates never depend on
    /// the typed representation. `blueprint` and `componentDescriptorDef` are
    /// the references declared on the installation.
    pub fn values(&self) -> Result<Map<String, Value>> {
        let mut values = Map::new();
        let cd = match &self.component_descriptor {
            Some(cd) => cd.to_generic()?,
            None => Value::Null,
        };
        let components = match &self.component_descriptors {
            Some(list) => list.to_generic()?,
            None => Value::Null,
        };
        values.insert("cd".to_string(), cd);
        values.insert("components".to_string(), components);

        if let Some(inst) = &self.installation {
            values.insert(
                "blueprint".to_string(),
                to_generic("blueprint definition", &inst.spec.blueprint)?,
            );
            if let Some(cd_def) = &inst.spec.component_descriptor {
                values.insert(
                    "componentDescriptorDef".to_string(),
                    to_generic("component descriptor definition", cd_def)?,
                );
            }
        }
        if let Some(imports) = &self.imports {
            values.insert("imports".to_string(), Value::Object(imports.clone()));
        }
        Ok(values)
    }

    /// Builds the template context of one pass
    pub fn template_context(&self, values: Map<String, Value>, cancel: CancellationToken) -> TemplateContext {
        TemplateContext::new(values)
            .with_blueprint(self.blueprint.clone())
            .with_component_descriptor(self.component_descriptor.clone())
            .with_component_descriptor_list(self.component_descriptors.clone())
            .with_cancellation(cancel)
    }
}

/// Options of deploy and subinstallation executions
#[derive(Debug, Clone)]
pub struct DeployExecutionOptions {
    pub base: BlueprintExecutionOptions,
    pub imports: Map<String, Value>,
}

impl DeployExecutionOptions {
    pub fn new(base: BlueprintExecutionOptions, imports: Map<String, Value>) -> Self {
        Self { base, imports }
    }

    /// Base values plus the imports, bound both as `imports` and `values`
    pub fn values(&self) -> Result<Map<String, Value>> {
        let mut values = self.base.values()?;
        values.insert("values".to_string(), Value::Object(self.imports.clone()));
        values.insert("imports".to_string(), Value::Object(self.imports.clone()));
        Ok(values)
    }
}

/// Options of export executions
#[derive(Debug, Clone)]
pub struct ExportExecutionOptions {
    pub base: BlueprintExecutionOptions,
    pub exports: Map<String, Value>,
}

impl ExportExecutionOptions {
    pub fn new(base: BlueprintExecutionOptions, exports: Map<String, Value>) -> Self {
        Self { base, exports }
    }

    /// Base values plus the exports as `values`, `exports` and flattened top-level keys
    pub fn values(&self) -> Result<Map<String, Value>> {
        let mut values = self.base.values()?;
        values.insert("values".to_string(), Value::Object(self.exports.clone()));
        values.insert("exports".to_string(), Value::Object(self.exports.clone()));
        for (key, value) in &self.exports {
            values.insert(key.clone(), value.clone());
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use terrace_core::MemoryFs;
    use terrace_core::domain::blueprint::BlueprintDefinition;
    use terrace_core::domain::installation::ComponentDescriptorDefinition;

    fn base() -> BlueprintExecutionOptions {
        let blueprint = Blueprint::new(BlueprintDefinition::default(), Arc::new(MemoryFs::new()));
        let mut inst = Installation::default();
        inst.spec.blueprint.reference = Some("cd://resources/blueprint".to_string());
        inst.spec.component_descriptor = Some(ComponentDescriptorDefinition {
            repository_context: None,
            component_name: "example.com/app".to_string(),
            version: "1.0.0".to_string(),
        });
        BlueprintExecutionOptions::new(Some(Arc::new(inst)), Arc::new(blueprint))
    }

    #[test]
    fn test_base_values() {
        let values = base().values().unwrap();
        assert_eq!(values["cd"], Value::Null);
        assert_eq!(values["blueprint"], json!({"ref": "cd://resources/blueprint"}));
        assert_eq!(values["componentDescriptorDef"]["componentName"], "example.com/app");
        assert!(!values.contains_key("imports"));
    }

    #[test]
    fn test_export_values_are_flattened() {
        let mut exports = Map::new();
        exports.insert("endpoint".to_string(), json!("http://app"));
        let values = ExportExecutionOptions::new(base(), exports).values().unwrap();
        assert_eq!(values["endpoint"], "http://app");
        assert_eq!(values["exports"]["endpoint"], "http://app");
        assert_eq!(values["values"]["endpoint"], "http://app");
    }

    #[test]
    fn test_deploy_values_alias_imports() {
        let mut imports = Map::new();
        imports.insert("replicas".to_string(), json!(3));
        let values = DeployExecutionOptions::new(base(), imports).values().unwrap();
        assert_eq!(values["imports"], values["values"]);
        assert_eq!(values["imports"]["replicas"], 3);
    }
}
