use serde_json::{Map, Value};
use std::fmt;

use terrace_core::FieldPath;
use terrace_core::domain::import::{ImportDefinition, ImportType};

use super::schema::validate_schema;

/// A validation failure at a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: &FieldPath, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates a flat map of import values against the import definitions
///
/// Unlike import construction this reports every failure instead of
/// stopping at the first one. Conditional imports are only checked when
/// their parent has a value.
pub fn validate_imports(
    definitions: &[ImportDefinition],
    values: &Map<String, Value>,
    path: &FieldPath,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for def in definitions {
        let def_path = path.child(&def.name);
        let Some(value) = values.get(&def.name) else {
            if matches!(def.import_type, ImportType::Unknown(_)) {
                errors.push(FieldError::new(&def_path, "unknown import type"));
            } else if def.is_required() {
                errors.push(FieldError::new(&def_path, "Import is required"));
            }
            continue;
        };

        match &def.import_type {
            ImportType::Data => {
                if let Some(schema) = &def.schema {
                    if let Err(violations) = validate_schema(schema, value) {
                        errors.extend(violations.into_iter().map(|msg| {
                            FieldError::new(&def_path, format!("invalid imported value: {}", msg))
                        }));
                    }
                }
                if !def.conditional_imports.is_empty() {
                    errors.extend(validate_imports(&def.conditional_imports, values, &def_path));
                }
            }
            ImportType::Target => {
                if let Some(message) = check_target(value, &def.target_type) {
                    errors.push(FieldError::new(&def_path, message));
                }
            }
            ImportType::TargetList => match value.as_array() {
                Some(elements) => {
                    for (i, element) in elements.iter().enumerate() {
                        if let Some(message) = check_target(element, &def.target_type) {
                            errors.push(FieldError::new(&def_path.index(i), message));
                        }
                    }
                }
                None => errors.push(FieldError::new(
                    &def_path,
                    "invalid imported value: targetlist import is not a list",
                )),
            },
            ImportType::ComponentDescriptor => {
                if !value.is_object() {
                    errors.push(FieldError::new(
                        &def_path,
                        "invalid imported value: component descriptor must be an object",
                    ));
                }
            }
            ImportType::ComponentDescriptorList => {
                let valid = value
                    .as_array()
                    .is_some_and(|list| list.iter().all(Value::is_object));
                if !valid {
                    errors.push(FieldError::new(
                        &def_path,
                        "invalid imported value: component descriptor list must be a list of objects",
                    ));
                }
            }
            ImportType::Unknown(_) => errors.push(FieldError::new(&def_path, "unknown import type")),
        }
    }
    errors
}

fn check_target(value: &Value, expected: &str) -> Option<String> {
    match value.get("spec").and_then(|spec| spec.get("type")).and_then(Value::as_str) {
        Some(actual) if actual == expected => None,
        Some(actual) => Some(format!(
            "invalid imported value: target type is {} but expected {}",
            actual, expected
        )),
        None => Some("invalid imported value: target has no spec.type".to_string()),
    }
}
