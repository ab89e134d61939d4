use tracing::{info, warn};

use terrace_core::domain::installation::{
    IMPORT_VALIDATION_FAILED_REASON, Installation, VALIDATE_IMPORTS_CONDITION,
};
use terrace_core::domain::meta::{ConditionStatus, merge_condition};

use crate::error::{PipelineError, Result};
use crate::options::BlueprintExecutionOptions;
use crate::orchestrator::ExecutionOrchestrator;

use super::constructor::{ConstructedImports, ImportConstructor};
use super::values::ImportedValues;

/// Constructs the imports of an installation and runs the blueprint's import executions
#[derive(Debug, Clone)]
pub struct ImportOperation {
    orchestrator: ExecutionOrchestrator,
}

impl ImportOperation {
    pub fn new(orchestrator: ExecutionOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Ensures the imports of an installation are valid
    ///
    /// Bindings of the import executions are merged into the constructed
    /// imports. Execution failures and reported validation errors set the
    /// `ValidateImports` condition of `installation` to false.
    ///
    /// # Errors
    /// - the construction error, as returned by [`ImportConstructor::construct`]
    /// - the execution error if the import executions cannot be templated
    /// - [`PipelineError::ImportValidation`] with all reported errors joined
    pub async fn ensure(
        &self,
        installation: &mut Installation,
        opts: BlueprintExecutionOptions,
        imported: &ImportedValues,
    ) -> Result<ConstructedImports> {
        let constructor = ImportConstructor::new(self.orchestrator.clone());
        let mut constructed = constructor.construct(&opts, imported).await?;

        let opts = opts.with_imports(constructed.imports.clone());
        let result = match self.orchestrator.template_import_executions(&opts).await {
            Ok(result) => result,
            Err(err) => {
                warn!(installation = %installation.metadata.key(), error = %err, "unable to template import executions");
                merge_condition(
                    &mut installation.status.conditions,
                    VALIDATE_IMPORTS_CONDITION,
                    ConditionStatus::False,
                    IMPORT_VALIDATION_FAILED_REASON,
                    "Unable to template executions",
                );
                return Err(err);
            }
        };

        constructed.imports.extend(result.bindings);
        if result.errors.is_empty() {
            return Ok(constructed);
        }

        let message = result.errors.join(", ");
        info!(installation = %installation.metadata.key(), %message, "import validation failed");
        merge_condition(
            &mut installation.status.conditions,
            VALIDATE_IMPORTS_CONDITION,
            ConditionStatus::False,
            IMPORT_VALIDATION_FAILED_REASON,
            message.clone(),
        );
        Err(PipelineError::ImportValidation(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use terrace_core::MemoryFs;
    use terrace_core::domain::blueprint::{Blueprint, BlueprintDefinition};
    use terrace_core::domain::execution::{TemplateExecutor, TemplateType};
    use terrace_core::domain::import::{ImportDefinition, ImportType};
    use terrace_template::TemplaterRegistry;

    fn operation() -> ImportOperation {
        ImportOperation::new(ExecutionOrchestrator::new(Arc::new(TemplaterRegistry::default())))
    }

    fn options(inst: &Installation, executions: Vec<TemplateExecutor>) -> BlueprintExecutionOptions {
        let info = BlueprintDefinition {
            imports: vec![ImportDefinition::new("replicas", ImportType::Data)],
            import_executions: executions,
            ..Default::default()
        };
        let blueprint = Blueprint::new(info, Arc::new(MemoryFs::new()));
        BlueprintExecutionOptions::new(Some(Arc::new(inst.clone())), Arc::new(blueprint))
    }

    fn imported(replicas: i64) -> ImportedValues {
        let mut imported = ImportedValues::default();
        imported.data.insert("replicas".to_string(), json!(replicas));
        imported
    }

    #[tokio::test]
    async fn test_bindings_are_merged() {
        let mut inst = Installation::default();
        let opts = options(&inst, vec![TemplateExecutor::inline(
            "bind",
            TemplateType::Spiff,
            json!({"bindings": {"surge": "(( imports.replicas + 1 ))"}}),
        )]);
        let constructed = operation().ensure(&mut inst, opts, &imported(2)).await.unwrap();
        assert_eq!(Value::Object(constructed.imports), json!({"replicas": 2, "surge": 3}));
        assert!(inst.status.conditions.is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_set_condition() {
        let mut inst = Installation::default();
        let opts = options(&inst, vec![TemplateExecutor::inline(
            "check",
            TemplateType::Spiff,
            json!({"errors": ["replicas must be odd", "replicas too small"]}),
        )]);
        let err = operation().ensure(&mut inst, opts, &imported(2)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "import validation failed: replicas must be odd, replicas too small"
        );
        let cond = &inst.status.conditions[0];
        assert_eq!(cond.condition_type, VALIDATE_IMPORTS_CONDITION);
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, IMPORT_VALIDATION_FAILED_REASON);
        assert_eq!(cond.message, "replicas must be odd, replicas too small");
    }

    #[tokio::test]
    async fn test_execution_failure_sets_condition() {
        let mut inst = Installation::default();
        let opts = options(&inst, vec![TemplateExecutor::inline(
            "broken",
            TemplateType::Unknown("Jinja".into()),
            json!("x"),
        )]);
        let err = operation().ensure(&mut inst, opts, &imported(2)).await.unwrap_err();
        assert_eq!(err.reason(), "UnknownTemplateType");
        assert_eq!(inst.status.conditions[0].message, "Unable to template executions");
    }
}
