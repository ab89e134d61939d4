//! Import definitions declared by blueprints

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an imported value
///
/// Unrecognized type strings are kept as [`ImportType::Unknown`] so that the
/// import constructor can report them instead of failing at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImportType {
    Data,
    Target,
    TargetList,
    ComponentDescriptor,
    ComponentDescriptorList,
    Unknown(String),
}

impl ImportType {
    pub fn as_str(&self) -> &str {
        match self {
            ImportType::Data => "data",
            ImportType::Target => "target",
            ImportType::TargetList => "targetlist",
            ImportType::ComponentDescriptor => "cd",
            ImportType::ComponentDescriptorList => "cdlist",
            ImportType::Unknown(other) => other,
        }
    }
}

impl From<String> for ImportType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "data" => ImportType::Data,
            "target" => ImportType::Target,
            "targetlist" => ImportType::TargetList,
            "cd" => ImportType::ComponentDescriptor,
            "cdlist" => ImportType::ComponentDescriptorList,
            _ => ImportType::Unknown(value),
        }
    }
}

impl From<ImportType> for String {
    fn from(value: ImportType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single import of a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub import_type: ImportType,
    /// Imports are required unless explicitly set to false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// JSON schema of a data import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    /// Expected `spec.type` of target and target list imports
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_type: String,
    /// Imports that are only evaluated if this import is satisfied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_imports: Vec<ImportDefinition>,
}

impl ImportDefinition {
    pub fn new(name: impl Into<String>, import_type: ImportType) -> Self {
        Self {
            name: name.into(),
            import_type,
            required: None,
            schema: None,
            target_type: String::new(),
            conditional_imports: Vec::new(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }

    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = target_type.into();
        self
    }

    pub fn with_conditional_imports(mut self, imports: Vec<ImportDefinition>) -> Self {
        self.conditional_imports = imports;
        self
    }
}

/// Finds an import by name anywhere in the tree of conditional imports
pub fn find_import<'a>(imports: &'a [ImportDefinition], name: &str) -> Option<&'a ImportDefinition> {
    for def in imports {
        if def.name == name {
            return Some(def);
        }
        if let Some(found) = find_import(&def.conditional_imports, name) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_type_wire_names() {
        for (raw, expected) in [
            ("data", ImportType::Data),
            ("target", ImportType::Target),
            ("targetlist", ImportType::TargetList),
            ("cd", ImportType::ComponentDescriptor),
            ("cdlist", ImportType::ComponentDescriptorList),
        ] {
            let parsed: ImportType = serde_json::from_value(json!(raw)).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), json!(raw));
        }
    }

    #[test]
    fn test_unknown_import_type_is_preserved() {
        let parsed: ImportType = serde_json::from_value(json!("secret")).unwrap();
        assert_eq!(parsed, ImportType::Unknown("secret".to_string()));
        assert_eq!(parsed.to_string(), "secret");
    }

    #[test]
    fn test_import_definition_defaults() {
        let def: ImportDefinition = serde_json::from_value(json!({
            "name": "cluster",
            "type": "target",
            "targetType": "kubernetes-cluster"
        }))
        .unwrap();
        assert!(def.is_required());
        assert_eq!(def.target_type, "kubernetes-cluster");
        assert!(def.conditional_imports.is_empty());
    }

    #[test]
    fn test_find_nested_import() {
        let imports = vec![ImportDefinition::new("a", ImportType::Data).with_conditional_imports(
            vec![ImportDefinition::new("b", ImportType::Data).with_conditional_imports(vec![
                ImportDefinition::new("c", ImportType::Target),
            ])],
        )];
        assert_eq!(find_import(&imports, "c").unwrap().import_type, ImportType::Target);
        assert!(find_import(&imports, "d").is_none());
    }
}
