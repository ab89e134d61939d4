use serde_json::{Map, Value};
use tracing::debug;

use terrace_core::FieldPath;
use terrace_template::SpiffTemplater;

use crate::error::{PipelineError, Result};
use crate::options::BlueprintExecutionOptions;
use crate::orchestrator::{DataExecutorOutput, ExecutionKind, ExecutionOrchestrator, decode};

use super::values::ImportedValues;

/// Result of templating the data mappings of an installation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMappings {
    /// All fetched values by import name, before any mapping ran
    pub imports: Map<String, Value>,
    /// Values produced by data-mapping executions and import data mappings
    pub values: Map<String, Value>,
}

/// Templates the import data executions and import data mappings of an installation
///
/// Executions run without state against `{imports: <fetched values>}` and
/// each `mapping` entry becomes visible to the later executions. The data
/// mappings are then evaluated by the declarative-merge engine with the
/// fetched and mapped values bound by name.
///
/// # Errors
/// Fails if an execution or a mapping cannot be templated
pub async fn template_data_mappings(
    orchestrator: &ExecutionOrchestrator,
    opts: &BlueprintExecutionOptions,
    imported: &ImportedValues,
    path: &FieldPath,
) -> Result<DataMappings> {
    let Some(installation) = opts.installation.as_deref() else {
        return Ok(DataMappings::default());
    };

    let mut template_values = Map::new();
    for source in [
        &imported.data,
        &imported.targets,
        &imported.target_lists,
        &imported.component_descriptors,
    ] {
        for (name, value) in source {
            template_values.insert(name.clone(), value.clone());
        }
    }
    let imports = template_values.clone();

    let mut base = opts.values()?;
    base.insert("imports".to_string(), Value::Object(template_values.clone()));
    let mut ctx = opts.template_context(base, orchestrator.cancellation());

    let mut values = Map::new();
    for exec in &installation.spec.import_data_executions {
        let rendered = orchestrator
            .execute(ExecutionKind::ImportMapping, exec, Some(&opts.blueprint), &ctx)
            .await?;
        let output: DataExecutorOutput = decode(ExecutionKind::ImportMapping, &exec.name, rendered)?;
        for (key, value) in output.mapping.unwrap_or_default() {
            template_values.insert(key.clone(), value.clone());
            values.insert(key, value);
        }
        ctx.values
            .insert("imports".to_string(), Value::Object(template_values.clone()));
    }

    let spiff = SpiffTemplater::default();
    for (key, mapping) in &installation.spec.import_data_mappings {
        let mapping_path = path.child(key);
        debug!(mapping = %mapping_path, "templating import data mapping");
        let data = spiff
            .evaluate(key, mapping.clone(), &template_values, &ctx)
            .map_err(|source| PipelineError::Template {
                kind: ExecutionKind::ImportMapping.as_str().to_string(),
                name: mapping_path.to_string(),
                source,
            })?;
        values.insert(key.clone(), data);
    }

    Ok(DataMappings { imports, values })
}
