use serde_json::{Map, Value};
use tracing::debug;

use terrace_core::FieldPath;
use terrace_core::domain::import::{ImportDefinition, ImportType};

use crate::error::{PipelineError, Result};
use crate::options::BlueprintExecutionOptions;
use crate::orchestrator::ExecutionOrchestrator;

use super::mappings::template_data_mappings;
use super::schema::validate_schema;
use super::values::ImportedValues;

/// Imports of an installation after construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructedImports {
    /// Final `imports` map seen by the templates
    pub imports: Map<String, Value>,
    /// All fetched values by import name
    pub inst_imports: Map<String, Value>,
    /// Templated data mappings
    pub mappings: Map<String, Value>,
}

/// Builds the imports of an installation from fetched values
#[derive(Debug, Clone)]
pub struct ImportConstructor {
    orchestrator: ExecutionOrchestrator,
}

impl ImportConstructor {
    pub fn new(orchestrator: ExecutionOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Templates the data mappings and constructs the typed imports
    ///
    /// # Errors
    /// Fails with `ImportNotFound`, `SchemaValidationFailed` or
    /// `UnknownImportType` as described on [`construct_imports`], or with the
    /// error of a failing data mapping
    pub async fn construct(
        &self,
        opts: &BlueprintExecutionOptions,
        imported: &ImportedValues,
    ) -> Result<ConstructedImports> {
        let root = FieldPath::new(
            opts.installation
                .as_ref()
                .map(|inst| inst.metadata.name.clone())
                .unwrap_or_default(),
        );
        let mappings = template_data_mappings(&self.orchestrator, opts, imported, &root).await?;
        let imports = construct_imports(
            &opts.blueprint.info.imports,
            imported,
            &mappings.values,
            &root,
        )?;
        debug!(imports = imports.len(), mappings = mappings.values.len(), "constructed imports");
        Ok(ConstructedImports {
            imports,
            inst_imports: mappings.imports,
            mappings: mappings.values,
        })
    }
}

fn not_satisfied(def: &ImportDefinition) -> PipelineError {
    PipelineError::ImportNotFound {
        name: def.name.clone(),
        import_type: def.import_type.clone(),
    }
}

fn target_type(value: &Value) -> Option<&str> {
    value.get("spec")?.get("type")?.as_str()
}

/// Constructs the imports for a list of definitions
///
/// Definitions are processed in order. Data imports prefer a templated
/// mapping over the fetched value, and only a satisfied data import has its
/// conditional imports constructed. Optional imports without a value are
/// skipped.
///
/// # Arguments
/// * `definitions` - Import definitions of one level
/// * `imported` - Fetched values by kind
/// * `mappings` - Templated data mappings
/// * `path` - Field path of this level, used in errors
///
/// # Errors
/// - `ImportNotFound` for a required import without a value
/// - `SchemaValidationFailed` for a data value violating its schema or a
///   target whose type differs from the declared one
/// - `UnknownImportType` for an unknown import type, required or not
pub fn construct_imports(
    definitions: &[ImportDefinition],
    imported: &ImportedValues,
    mappings: &Map<String, Value>,
    path: &FieldPath,
) -> Result<Map<String, Value>> {
    let mut imports = Map::new();
    for def in definitions {
        let def_path = path.child(&def.name);
        let value = match &def.import_type {
            ImportType::Data => mappings
                .get(&def.name)
                .or_else(|| imported.data.get(&def.name)),
            ImportType::Unknown(other) => {
                return Err(PipelineError::UnknownImportType {
                    path: def_path.to_string(),
                    import_type: other.clone(),
                });
            }
            known => imported.of_kind(known).and_then(|values| values.get(&def.name)),
        };
        let Some(value) = value else {
            if !def.is_required() {
                continue;
            }
            return Err(not_satisfied(def));
        };

        match &def.import_type {
            ImportType::Data => {
                if let Some(schema) = &def.schema {
                    validate_schema(schema, value).map_err(|errors| {
                        PipelineError::schema(
                            &def_path,
                            format!(
                                "imported datatype does not have the expected schema: {}",
                                errors.join(", ")
                            ),
                        )
                    })?;
                }
                imports.insert(def.name.clone(), value.clone());
                if !def.conditional_imports.is_empty() {
                    let conditional =
                        construct_imports(&def.conditional_imports, imported, mappings, &def_path)?;
                    imports.extend(conditional);
                }
            }
            ImportType::Target => {
                let actual = target_type(value).ok_or_else(|| {
                    PipelineError::schema(
                        &def_path,
                        "imported target does not match the expected target template schema",
                    )
                })?;
                if actual != def.target_type {
                    return Err(PipelineError::schema(
                        &def_path,
                        format!(
                            "imported target type is {} but expected {}",
                            actual, def.target_type
                        ),
                    ));
                }
                imports.insert(def.name.clone(), value.clone());
            }
            ImportType::TargetList => {
                let Some(elements) = value.as_array() else {
                    return Err(PipelineError::schema(&def_path, "targetlist import is not a list"));
                };
                for (i, element) in elements.iter().enumerate() {
                    let actual = target_type(element).ok_or_else(|| {
                        PipelineError::schema(
                            &def_path,
                            format!(
                                "element at position {} of the imported targetlist does not match the expected target template schema",
                                i
                            ),
                        )
                    })?;
                    if actual != def.target_type {
                        return Err(PipelineError::schema(
                            &def_path,
                            format!(
                                "type of the element at position {} of the imported targetlist is {} but expected {}",
                                i, actual, def.target_type
                            ),
                        ));
                    }
                }
                imports.insert(def.name.clone(), value.clone());
            }
            ImportType::ComponentDescriptor => {
                if !value.is_object() {
                    return Err(PipelineError::schema(
                        &def_path,
                        "imported component descriptor is not an object",
                    ));
                }
                imports.insert(def.name.clone(), value.clone());
            }
            ImportType::ComponentDescriptorList => {
                let valid = value
                    .as_array()
                    .is_some_and(|list| list.iter().all(Value::is_object));
                if !valid {
                    return Err(PipelineError::schema(
                        &def_path,
                        "imported component descriptor list is not a list of objects",
                    ));
                }
                imports.insert(def.name.clone(), value.clone());
            }
            ImportType::Unknown(_) => {}
        }
    }
    Ok(imports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(target_type: &str) -> Value {
        json!({"metadata": {"name": "cluster-a", "namespace": "ns"}, "spec": {"type": target_type}})
    }

    fn construct(defs: &[ImportDefinition], imported: &ImportedValues) -> Result<Map<String, Value>> {
        construct_imports(defs, imported, &Map::new(), &FieldPath::new("app"))
    }

    #[test]
    fn test_required_import_missing() {
        let defs = vec![ImportDefinition::new("config", ImportType::Data)];
        let err = construct(&defs, &ImportedValues::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ImportNotFound { ref name, .. } if name == "config"));

        let defs = vec![ImportDefinition::new("config", ImportType::Data).optional()];
        assert!(construct(&defs, &ImportedValues::default()).unwrap().is_empty());
    }

    #[test]
    fn test_every_kind_requires_its_value() {
        for import_type in [
            ImportType::Target,
            ImportType::TargetList,
            ImportType::ComponentDescriptor,
            ImportType::ComponentDescriptorList,
        ] {
            let defs = vec![ImportDefinition::new("x", import_type.clone())];
            let err = construct(&defs, &ImportedValues::default()).unwrap_err();
            assert_eq!(err.reason(), "ImportNotFound", "{}", import_type);
        }
    }

    #[test]
    fn test_mapping_wins_over_fetched_value() {
        let defs = vec![ImportDefinition::new("config", ImportType::Data)];
        let mut imported = ImportedValues::default();
        imported.data.insert("config".to_string(), json!("fetched"));
        let mut mappings = Map::new();
        mappings.insert("config".to_string(), json!("mapped"));
        let imports = construct_imports(&defs, &imported, &mappings, &FieldPath::new("app")).unwrap();
        assert_eq!(imports["config"], "mapped");
    }

    #[test]
    fn test_data_schema_violation() {
        let defs = vec![
            ImportDefinition::new("replicas", ImportType::Data).with_schema(json!({"type": "integer"})),
        ];
        let mut imported = ImportedValues::default();
        imported.data.insert("replicas".to_string(), json!("three"));
        let err = construct(&defs, &imported).unwrap_err();
        assert_eq!(err.reason(), "SchemaValidationFailed");
        assert!(err.to_string().starts_with("app.replicas: imported datatype"));
    }

    #[test]
    fn test_target_type_mismatch() {
        let defs = vec![ImportDefinition::new("cluster", ImportType::Target).with_target_type("kubernetes")];
        let mut imported = ImportedValues::default();
        imported.targets.insert("cluster".to_string(), target("ssh"));
        let err = construct(&defs, &imported).unwrap_err();
        assert_eq!(
            err.to_string(),
            "app.cluster: imported target type is ssh but expected kubernetes"
        );

        imported.targets.insert("cluster".to_string(), target("kubernetes"));
        let imports = construct(&defs, &imported).unwrap();
        assert_eq!(imports["cluster"]["metadata"]["name"], "cluster-a");
    }

    #[test]
    fn test_target_list_checks_every_element() {
        let defs = vec![ImportDefinition::new("clusters", ImportType::TargetList).with_target_type("kubernetes")];
        let mut imported = ImportedValues::default();
        imported
            .target_lists
            .insert("clusters".to_string(), json!([target("kubernetes"), target("ssh")]));
        let err = construct(&defs, &imported).unwrap_err();
        assert!(err.to_string().contains("element at position 1"));

        imported.target_lists.insert("clusters".to_string(), target("kubernetes"));
        let err = construct(&defs, &imported).unwrap_err();
        assert_eq!(err.to_string(), "app.clusters: targetlist import is not a list");
    }

    #[test]
    fn test_unknown_import_type_even_if_optional() {
        let defs = vec![ImportDefinition::new("x", ImportType::Unknown("secret".into())).optional()];
        let err = construct(&defs, &ImportedValues::default()).unwrap_err();
        assert_eq!(err.to_string(), "app.x: unknown import type 'secret'");
    }

    #[test]
    fn test_conditional_imports_three_levels_deep() {
        let defs = vec![
            ImportDefinition::new("a", ImportType::Data).optional().with_conditional_imports(vec![
                ImportDefinition::new("b", ImportType::Data).optional().with_conditional_imports(vec![
                    ImportDefinition::new("c", ImportType::Data),
                ]),
            ]),
        ];
        let mut imported = ImportedValues::default();

        // a missing: the whole subtree is skipped, including required c
        imported.data.insert("c".to_string(), json!(3));
        assert!(construct(&defs, &imported).unwrap().is_empty());

        // a present, b missing: c is skipped
        imported.data.insert("a".to_string(), json!(1));
        let imports = construct(&defs, &imported).unwrap();
        assert_eq!(Value::Object(imports), json!({"a": 1}));

        // whole chain satisfied
        imported.data.insert("b".to_string(), json!(2));
        let imports = construct(&defs, &imported).unwrap();
        assert_eq!(Value::Object(imports), json!({"a": 1, "b": 2, "c": 3}));

        // c is required once its parents are satisfied
        imported.data.remove("c");
        let err = construct(&defs, &imported).unwrap_err();
        assert!(matches!(err, PipelineError::ImportNotFound { ref name, .. } if name == "c"));
    }

    #[test]
    fn test_component_descriptor_shapes() {
        let defs = vec![
            ImportDefinition::new("cd", ImportType::ComponentDescriptor),
            ImportDefinition::new("cds", ImportType::ComponentDescriptorList),
        ];
        let mut imported = ImportedValues::default();
        imported.component_descriptors.insert("cd".to_string(), json!({"component": {}}));
        imported.component_descriptor_lists.insert("cds".to_string(), json!([{"component": {}}]));
        assert_eq!(construct(&defs, &imported).unwrap().len(), 2);

        imported.component_descriptor_lists.insert("cds".to_string(), json!(["nope"]));
        assert_eq!(construct(&defs, &imported).unwrap_err().reason(), "SchemaValidationFailed");
    }
}
