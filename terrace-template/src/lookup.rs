//! Component descriptor lookups shared by the template helpers
//!
//! Helpers receive descriptors as plain JSON (that is what templates see), so
//! all lookups work on `serde_json::Value` and accept a flat list of
//! `key, value` selector pairs.

use serde_json::Value;

use terrace_core::domain::component::Resource;

use crate::blob::BlobResolver;
use crate::error::{Result, TemplateError};

/// Builds selector pairs from a flat list of strings
pub fn selector_pairs(args: &[String]) -> Result<Vec<(String, String)>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(TemplateError::Lookup(format!(
            "expected key value pairs as selector but got {} arguments",
            args.len()
        )));
    }
    Ok(args
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// True if every selector pair matches a top-level field or an extra identity entry
fn matches(element: &Value, selector: &[(String, String)]) -> bool {
    selector.iter().all(|(key, expected)| {
        let direct = element.get(key).and_then(Value::as_str);
        let identity = element
            .get("extraIdentity")
            .and_then(|id| id.get(key))
            .and_then(Value::as_str);
        direct.or(identity) == Some(expected.as_str())
    })
}

fn component_list<'a>(cd: &'a Value, field: &str) -> &'a [Value] {
    cd.get("component")
        .and_then(|c| c.get(field))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Selects the first resource of a descriptor matching the selector
pub fn get_resource(cd: &Value, selector: &[(String, String)]) -> Result<Value> {
    component_list(cd, "resources")
        .iter()
        .find(|r| matches(r, selector))
        .cloned()
        .ok_or_else(|| {
            TemplateError::Lookup(format!("no resource matches selector {:?}", selector))
        })
}

/// Selects the descriptor of a referenced component
///
/// The reference is looked up in `cd`, the referenced descriptor in `cd_list`.
pub fn get_component(
    cd: &Value,
    cd_list: Option<&Value>,
    selector: &[(String, String)],
) -> Result<Value> {
    let reference = component_list(cd, "componentReferences")
        .iter()
        .find(|r| matches(r, selector))
        .ok_or_else(|| {
            TemplateError::Lookup(format!(
                "no component reference matches selector {:?}",
                selector
            ))
        })?;
    let component_name = reference.get("componentName").and_then(Value::as_str);
    let version = reference.get("version").and_then(Value::as_str);

    cd_list
        .and_then(|list| list.get("components"))
        .and_then(Value::as_array)
        .and_then(|components| {
            components.iter().find(|c| {
                let spec = c.get("component");
                spec.and_then(|s| s.get("name")).and_then(Value::as_str) == component_name
                    && spec.and_then(|s| s.get("version")).and_then(Value::as_str) == version
            })
        })
        .cloned()
        .ok_or_else(|| {
            TemplateError::Lookup(format!(
                "component {}:{} is not part of the component descriptor list",
                component_name.unwrap_or_default(),
                version.unwrap_or_default()
            ))
        })
}

/// Fetches the content of the resource matching the selector
pub fn get_resource_content(
    cd: &Value,
    selector: &[(String, String)],
    blobs: Option<&dyn BlobResolver>,
) -> Result<Vec<u8>> {
    let raw = get_resource(cd, selector)?;
    let resource: Resource = serde_json::from_value(raw)
        .map_err(|e| TemplateError::Lookup(format!("invalid resource: {}", e)))?;
    let blobs = blobs.ok_or_else(|| TemplateError::Blob {
        resource: resource.name.clone(),
        message: "no blob resolver configured".to_string(),
    })?;
    blobs.fetch(&resource)
}
