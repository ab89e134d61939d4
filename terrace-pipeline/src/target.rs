//! Target reference resolution
//!
//! Deploy executions reference targets either literally or through a target
//! or target list import. References are resolved into plain object
//! references before a deploy item is built from a specification.

use serde_json::{Map, Value};

use terrace_core::domain::blueprint::BlueprintDefinition;
use terrace_core::domain::deploy_item::{
    DeployItemSpecification, DeployItemTemplate, TargetReference,
};
use terrace_core::domain::import::ImportType;
use terrace_core::domain::meta::ObjectReference;

use crate::error::{PipelineError, Result};

fn object_reference(value: &Value, default_namespace: &str) -> Option<ObjectReference> {
    let metadata = value.get("metadata")?;
    let name = metadata.get("name")?.as_str()?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .unwrap_or(default_namespace);
    Some(ObjectReference::new(namespace, name))
}

/// Resolves the target of one deploy item specification
///
/// # Arguments
/// * `spec` - The specification, used for its target and in errors
/// * `blueprint` - Declares the type of referenced imports
/// * `imports` - Constructed import values
/// * `namespace` - Namespace of the owning installation
///
/// # Errors
/// Returns `InvalidDeployItemSpecification` naming the deploy item if the
/// referenced import is unknown, of the wrong type, without value or
/// malformed, if a list index is out of bounds, or if the target is empty
pub fn resolve_target(
    spec: &DeployItemSpecification,
    blueprint: &BlueprintDefinition,
    imports: &Map<String, Value>,
    namespace: &str,
) -> Result<ObjectReference> {
    let invalid = |message: String| PipelineError::deploy_item(&spec.name, message);

    match &spec.target {
        TargetReference::Literal {
            name,
            namespace: literal_ns,
        } => Ok(ObjectReference::new(
            literal_ns.as_deref().unwrap_or(namespace),
            name.clone(),
        )),
        TargetReference::Import { import } => {
            let def = blueprint
                .get_import_by_name(import)
                .ok_or_else(|| invalid(format!("target import {:?} not found", import)))?;
            if def.import_type != ImportType::Target {
                return Err(invalid(format!("import {:?} is not a target", import)));
            }
            let value = imports
                .get(import)
                .filter(|v| !v.is_null())
                .ok_or_else(|| invalid(format!("no value for import {:?} given", import)))?;
            if !value.is_object() {
                return Err(invalid(format!("invalid target spec for import {:?}", import)));
            }
            object_reference(value, namespace)
                .ok_or_else(|| invalid(format!("invalid target spec for import {:?}", import)))
        }
        TargetReference::ImportList { import, index } => {
            let def = blueprint
                .get_import_by_name(import)
                .ok_or_else(|| invalid(format!("targetlist import {:?} not found", import)))?;
            if def.import_type != ImportType::TargetList {
                return Err(invalid(format!("import {:?} is not a targetlist", import)));
            }
            let value = imports
                .get(import)
                .filter(|v| !v.is_null())
                .ok_or_else(|| invalid(format!("no value for import {:?} given", import)))?;
            let elements = value
                .as_array()
                .ok_or_else(|| invalid(format!("invalid target spec for import {:?}", import)))?;
            let element = usize::try_from(*index)
                .ok()
                .and_then(|i| elements.get(i))
                .ok_or_else(|| invalid(format!("index {} out of bounds", index)))?;
            object_reference(element, namespace)
                .ok_or_else(|| invalid(format!("invalid target spec for import {:?}", import)))
        }
        TargetReference::Empty => Err(invalid("empty target reference".to_string())),
    }
}

/// Resolves the targets of all specifications into deploy item templates
pub fn resolve_deploy_item_templates(
    specs: &[DeployItemSpecification],
    blueprint: &BlueprintDefinition,
    imports: &Map<String, Value>,
    namespace: &str,
) -> Result<Vec<DeployItemTemplate>> {
    specs
        .iter()
        .map(|spec| {
            let target = resolve_target(spec, blueprint, imports, namespace)?;
            Ok(DeployItemTemplate {
                name: spec.name.clone(),
                item_type: spec.item_type.clone(),
                target: Some(target),
                labels: spec.labels.clone(),
                configuration: spec.configuration.clone(),
                depends_on: spec.depends_on.clone(),
            })
        })
        .collect()
}
