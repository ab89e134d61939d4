//! Installations and installation templates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::execution::TemplateExecutor;
use super::meta::{Condition, ObjectMeta};

/// Condition type reporting the outcome of import validation
pub const VALIDATE_IMPORTS_CONDITION: &str = "ValidateImports";

/// Reason used when import executions report validation errors
pub const IMPORT_VALIDATION_FAILED_REASON: &str = "ImportValidationFailed";

/// Where the blueprint of an installation comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintReference {
    /// Reference into the component descriptor, e.g. `cd://resources/blueprint`
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Inline blueprint filesystem as a map of path to file content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<BTreeMap<String, String>>,
}

/// Reference to the component an installation belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptorDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_context: Option<serde_json::Value>,
    pub component_name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataImport {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetImport {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationImports {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationExports {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataExport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_descriptor: Option<ComponentDescriptorDefinition>,
    #[serde(default)]
    pub blueprint: BlueprintReference,
    #[serde(default)]
    pub imports: InstallationImports,
    /// Declarative-merge templates whose results become data imports
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub import_data_mappings: BTreeMap<String, serde_json::Value>,
    /// Executions producing `{mapping: {...}}` evaluated before import construction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import_data_executions: Vec<TemplateExecutor>,
    #[serde(default)]
    pub exports: InstallationExports,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub export_data_mappings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Opaque template state per execution, base64 encoded
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_state: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InstallationSpec,
    #[serde(default)]
    pub status: InstallationStatus,
}

/// A subinstallation as rendered by a blueprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTemplate {
    pub name: String,
    #[serde(default)]
    pub blueprint: BlueprintReference,
    #[serde(default)]
    pub imports: InstallationImports,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub import_data_mappings: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub exports: InstallationExports,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub export_data_mappings: BTreeMap<String, serde_json::Value>,
}

impl Installation {
    /// Builds the subinstallation object for a template, inheriting the
    /// component of this installation
    pub fn subinstallation(&self, template: &InstallationTemplate) -> Installation {
        Installation {
            metadata: ObjectMeta::named(self.metadata.namespace.clone(), template.name.clone()),
            spec: InstallationSpec {
                component_descriptor: self.spec.component_descriptor.clone(),
                blueprint: template.blueprint.clone(),
                imports: template.imports.clone(),
                import_data_mappings: template.import_data_mappings.clone(),
                import_data_executions: Vec::new(),
                exports: template.exports.clone(),
                export_data_mappings: template.export_data_mappings.clone(),
            },
            status: InstallationStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_installation_wire_shape() {
        let inst: Installation = serde_json::from_value(json!({
            "metadata": {"name": "app", "namespace": "default"},
            "spec": {
                "componentDescriptor": {"componentName": "example.com/app", "version": "1.0.0"},
                "blueprint": {"ref": "cd://resources/blueprint"},
                "imports": {"targets": [{"name": "cluster", "target": "#my-cluster"}]},
                "importDataMappings": {"replicas": "(( imports.size * 2 ))"}
            }
        }))
        .unwrap();
        assert_eq!(inst.metadata.key(), "default/app");
        assert_eq!(inst.spec.blueprint.reference.as_deref(), Some("cd://resources/blueprint"));
        assert_eq!(inst.spec.imports.targets[0].target, "#my-cluster");
        assert!(inst.spec.import_data_mappings.contains_key("replicas"));
    }

    #[test]
    fn test_subinstallation_inherits_component() {
        let mut parent = Installation::default();
        parent.metadata = ObjectMeta::named("ns", "parent");
        parent.spec.component_descriptor = Some(ComponentDescriptorDefinition {
            repository_context: None,
            component_name: "example.com/app".into(),
            version: "1.0.0".into(),
        });
        let template = InstallationTemplate {
            name: "child".into(),
            ..Default::default()
        };
        let child = parent.subinstallation(&template);
        assert_eq!(child.metadata.key(), "ns/child");
        assert_eq!(child.spec.component_descriptor, parent.spec.component_descriptor);
    }
}
