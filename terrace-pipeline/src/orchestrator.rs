//! Execution orchestrator
//!
//! Runs the import, subinstallation, deploy and export executions of a
//! blueprint through the template engines, loading and storing the opaque
//! state of every execution between passes.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use terrace_core::domain::blueprint::Blueprint;
use terrace_core::domain::deploy_item::DeployItemSpecification;
use terrace_core::domain::execution::{TemplateExecutor, TemplateSource};
use terrace_core::domain::installation::InstallationTemplate;
use terrace_core::CoreError;
use terrace_template::{TemplateContext, TemplateError, TemplaterRegistry};

use crate::error::{PipelineError, Result};
use crate::options::{BlueprintExecutionOptions, DeployExecutionOptions, ExportExecutionOptions};
use crate::state::{
    DEPLOY_STATE_PREFIX, EXPORT_STATE_PREFIX, IMPORT_STATE_PREFIX, StateError, StateHandler,
};

/// The kinds of executions a pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Import,
    Subinstallation,
    DeployItem,
    Export,
    /// Data-mapping executions of an installation, never stateful
    ImportMapping,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Import => "import",
            ExecutionKind::Subinstallation => "subinstallation",
            ExecutionKind::DeployItem => "deployitem",
            ExecutionKind::Export => "export",
            ExecutionKind::ImportMapping => "import mapping",
        }
    }

    /// Prefix of the state keys of this kind
    pub fn state_prefix(&self) -> Option<&'static str> {
        match self {
            ExecutionKind::Import => Some(IMPORT_STATE_PREFIX),
            ExecutionKind::Subinstallation | ExecutionKind::DeployItem => Some(DEPLOY_STATE_PREFIX),
            ExecutionKind::Export => Some(EXPORT_STATE_PREFIX),
            ExecutionKind::ImportMapping => None,
        }
    }
}

// ============================================================================
// Execution outputs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ImportExecutorOutput {
    #[serde(default)]
    bindings: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SubinstallationExecutorOutput {
    #[serde(default)]
    subinstallations: Option<Vec<InstallationTemplate>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployExecutorOutput {
    #[serde(default)]
    deploy_items: Option<Vec<DeployItemSpecification>>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportExecutorOutput {
    #[serde(default)]
    exports: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DataExecutorOutput {
    #[serde(default)]
    pub mapping: Option<Map<String, Value>>,
}

/// Result of the import executions of a blueprint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportExecutionResult {
    /// Validation errors reported by the first failing execution
    pub errors: Vec<String>,
    /// Bindings of all executions that ran
    pub bindings: Map<String, Value>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Dispatches executions to the registered template engines
#[derive(Clone)]
pub struct ExecutionOrchestrator {
    templaters: Arc<TemplaterRegistry>,
    state: Option<Arc<dyn StateHandler>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for ExecutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOrchestrator")
            .field("types", &self.templaters.types())
            .field("stateful", &self.state.is_some())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl ExecutionOrchestrator {
    /// Creates an orchestrator without state handling
    pub fn new(templaters: Arc<TemplaterRegistry>) -> Self {
        Self {
            templaters,
            state: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_state_handler(mut self, state: Arc<dyn StateHandler>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn check_active(&self) -> Result<()> {
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if expired || self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Runs a state store call unless the pass is cancelled or past its deadline
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        self.check_active()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = deadline => Err(PipelineError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Loads the state of an execution
    ///
    /// `None` disables state handling, a missing entry is an empty initial state.
    async fn get_state(&self, kind: ExecutionKind, name: &str) -> Result<Option<Vec<u8>>> {
        let (Some(state), Some(prefix)) = (&self.state, kind.state_prefix()) else {
            return Ok(None);
        };
        let key = format!("{}{}", prefix, name);
        match self.guarded(state.get(&key)).await? {
            Ok(data) => Ok(Some(data)),
            Err(StateError::NotFound(_)) => Ok(Some(Vec::new())),
            Err(source) => Err(PipelineError::State {
                kind: kind.as_str().to_string(),
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn store_state(&self, kind: ExecutionKind, name: &str, data: &[u8]) -> Result<()> {
        let (Some(state), Some(prefix)) = (&self.state, kind.state_prefix()) else {
            return Ok(());
        };
        if data.is_empty() {
            return Ok(());
        }
        let key = format!("{}{}", prefix, name);
        self.guarded(state.store(&key, data))
            .await?
            .map_err(|source| PipelineError::State {
                kind: kind.as_str().to_string(),
                name: name.to_string(),
                source,
            })
    }

    /// Executes one template and returns its rendered document
    ///
    /// # Arguments
    /// * `kind` - Kind of the execution, selects the state prefix
    /// * `exec` - The executor to run
    /// * `blueprint` - Filesystem for file templates
    /// * `ctx` - Template context of the pass
    ///
    /// # Errors
    /// Fails on unknown template types, engine errors, state store failures and cancellation
    pub(crate) async fn execute(
        &self,
        kind: ExecutionKind,
        exec: &TemplateExecutor,
        blueprint: Option<&Blueprint>,
        ctx: &TemplateContext,
    ) -> Result<Value> {
        self.check_active()?;
        let engine = self.templaters.get(&exec.template_type).ok_or_else(|| {
            PipelineError::UnknownTemplateType {
                kind: kind.as_str().to_string(),
                name: exec.name.clone(),
                template_type: exec.template_type.to_string(),
            }
        })?;

        let template =
            template_bytes(exec, blueprint).map_err(|e| template_error(kind, &exec.name, e.into()))?;

        let state = self.get_state(kind, &exec.name).await?;
        debug!(
            kind = kind.as_str(),
            execution = %exec.name,
            template_type = %exec.template_type,
            stateful = state.is_some(),
            "running execution"
        );
        let output = engine
            .execute(&exec.name, &template, state.as_deref(), ctx)
            .map_err(|e| template_error(kind, &exec.name, e))?;

        if let Some(new_state) = &output.state {
            self.store_state(kind, &exec.name, new_state).await?;
        }
        Ok(output.result)
    }

    /// Runs the import executions of a blueprint
    ///
    /// Bindings of each execution are visible as `imports` to the next one.
    /// The first execution reporting errors stops the batch.
    pub async fn template_import_executions(
        &self,
        opts: &BlueprintExecutionOptions,
    ) -> Result<ImportExecutionResult> {
        let mut ctx = opts.template_context(opts.values()?, self.cancel.clone());
        let mut result = ImportExecutionResult::default();

        for exec in &opts.blueprint.info.import_executions {
            let rendered = self
                .execute(ExecutionKind::Import, exec, Some(&opts.blueprint), &ctx)
                .await?;
            let output: ImportExecutorOutput = decode(ExecutionKind::Import, &exec.name, rendered)?;

            if let Some(bindings) = output.bindings {
                let imports = ctx
                    .values
                    .entry("imports")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !imports.is_object() {
                    *imports = Value::Object(Map::new());
                }
                if let Value::Object(imports) = imports {
                    for (key, value) in bindings {
                        imports.insert(key.clone(), value.clone());
                        result.bindings.insert(key, value);
                    }
                }
            }
            if let Some(errors) = output.errors.filter(|e| !e.is_empty()) {
                info!(execution = %exec.name, errors = errors.len(), "import execution reported errors");
                result.errors.extend(errors);
                break;
            }
        }
        Ok(result)
    }

    /// Runs the subinstallation executions, concatenating their templates in order
    pub async fn template_subinstallation_executions(
        &self,
        opts: &DeployExecutionOptions,
    ) -> Result<Vec<InstallationTemplate>> {
        let ctx = opts.base.template_context(opts.values()?, self.cancel.clone());
        let mut templates = Vec::new();
        for exec in &opts.base.blueprint.info.subinstallation_executions {
            let kind = ExecutionKind::Subinstallation;
            let rendered = self.execute(kind, exec, Some(&opts.base.blueprint), &ctx).await?;
            let output: SubinstallationExecutorOutput = decode(kind, &exec.name, rendered)?;
            templates.extend(output.subinstallations.unwrap_or_default());
        }
        Ok(templates)
    }

    /// Runs the deploy executions, concatenating their specifications in order
    pub async fn template_deploy_executions(
        &self,
        opts: &DeployExecutionOptions,
    ) -> Result<Vec<DeployItemSpecification>> {
        let ctx = opts.base.template_context(opts.values()?, self.cancel.clone());
        let mut specs = Vec::new();
        for exec in &opts.base.blueprint.info.deploy_executions {
            let kind = ExecutionKind::DeployItem;
            let rendered = self.execute(kind, exec, Some(&opts.base.blueprint), &ctx).await?;
            let output: DeployExecutorOutput = decode(kind, &exec.name, rendered)?;
            specs.extend(output.deploy_items.unwrap_or_default());
        }
        Ok(specs)
    }

    /// Runs the export executions; later executions overwrite earlier keys
    pub async fn template_export_executions(
        &self,
        opts: &ExportExecutionOptions,
    ) -> Result<Map<String, Value>> {
        let ctx = opts.base.template_context(opts.values()?, self.cancel.clone());
        let mut exports = Map::new();
        for exec in &opts.base.blueprint.info.export_executions {
            let kind = ExecutionKind::Export;
            let rendered = self.execute(kind, exec, Some(&opts.base.blueprint), &ctx).await?;
            let output: ExportExecutorOutput = decode(kind, &exec.name, rendered)?;
            exports.extend(output.exports.unwrap_or_default());
        }
        Ok(exports)
    }
}

fn template_bytes(exec: &TemplateExecutor, blueprint: Option<&Blueprint>) -> std::result::Result<Vec<u8>, CoreError> {
    match exec.source()? {
        TemplateSource::Inline(value) => {
            serde_json::to_vec(value).map_err(|e| CoreError::decode("inline template", e))
        }
        TemplateSource::File(path) => match blueprint {
            Some(blueprint) => blueprint.read_file(path),
            None => Err(CoreError::InvalidTemplateExecutor {
                name: exec.name.clone(),
                reason: format!("template file {:?} requires a blueprint filesystem", path),
            }),
        },
    }
}

fn template_error(kind: ExecutionKind, name: &str, err: TemplateError) -> PipelineError {
    let kind = kind.as_str().to_string();
    let name = name.to_string();
    match err {
        TemplateError::Cancelled => PipelineError::Cancelled,
        err @ TemplateError::RecursionExceeded { .. } => PipelineError::TemplateRecursionExceeded {
            kind,
            name,
            source: err,
        },
        source => PipelineError::Template { kind, name, source },
    }
}

pub(crate) fn decode<T: DeserializeOwned>(kind: ExecutionKind, name: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| PipelineError::Decode {
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        message: e.to_string(),
    })
}
