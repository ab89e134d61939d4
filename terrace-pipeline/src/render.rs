//! Offline blueprint rendering
//!
//! Renders the deploy items and subinstallations of a blueprint directory
//! from example imports, without any cluster. Template state is kept in
//! memory and returned with the result.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use terrace_core::domain::blueprint::Blueprint;
use terrace_core::domain::component::{ComponentDescriptor, ComponentDescriptorList};
use terrace_core::domain::deploy_item::DeployItem;
use terrace_core::domain::installation::{ComponentDescriptorDefinition, Installation};
use terrace_core::domain::meta::ObjectMeta;
use terrace_core::{CoreError, DirFs, FieldPath};
use terrace_template::{BlobResolver, TemplaterRegistry};

use crate::deploy_items::materialize_deploy_items;
use crate::error::{PipelineError, Result};
use crate::imports::validate_imports;
use crate::options::{BlueprintExecutionOptions, DeployExecutionOptions};
use crate::orchestrator::ExecutionOrchestrator;
use crate::resolver::ComponentResolver;
use crate::state::MemoryStateHandler;
use crate::target::resolve_deploy_item_templates;

const SAMPLE_COMPONENT_NAME: &str = "my-example-component";
const SAMPLE_COMPONENT_VERSION: &str = "v0.0.0";
const SAMPLE_BLUEPRINT_REFERENCE: &str = "cd://resources/example-blueprint";

/// Content of an imports file
#[derive(Debug, Default, Deserialize)]
struct ImportsFile {
    #[serde(default)]
    imports: Map<String, Value>,
}

/// Inputs of [`render_blueprint`]
#[derive(Clone, Default)]
pub struct RenderArgs {
    /// Directory holding `blueprint.yaml`
    pub blueprint_dir: PathBuf,
    /// YAML file of the form `{imports: {...}}`
    pub imports_file: Option<PathBuf>,
    /// Imports merged over the ones read from `imports_file`
    pub imports: Map<String, Value>,
    pub component_descriptor_file: Option<PathBuf>,
    pub component_descriptor: Option<ComponentDescriptor>,
    /// Transitive component references of the component descriptor
    pub component_descriptor_list: Option<ComponentDescriptorList>,
    pub component_resolver: Option<Arc<dyn ComponentResolver>>,
    /// Namespace of the rendered objects, `default` if empty
    pub namespace: String,
}

impl RenderArgs {
    pub fn new(blueprint_dir: impl Into<PathBuf>) -> Self {
        Self {
            blueprint_dir: blueprint_dir.into(),
            ..Default::default()
        }
    }

    /// Defaults the paths from a project directory
    ///
    /// Expects `<root>/blueprint/blueprint.yaml` and optionally
    /// `<root>/example/imports.yaml` and `<root>/example/component-descriptor.yaml`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let example = root.join("example");
        let existing = |path: PathBuf| path.exists().then_some(path);
        Self {
            blueprint_dir: root.join("blueprint"),
            imports_file: existing(example.join("imports.yaml")),
            component_descriptor_file: existing(example.join("component-descriptor.yaml")),
            ..Default::default()
        }
    }
}

/// Output of [`render_blueprint`]
#[derive(Debug, Clone, Default)]
pub struct BlueprintRenderOut {
    pub deploy_items: Vec<DeployItem>,
    pub deploy_item_template_state: BTreeMap<String, Vec<u8>>,
    pub installations: Vec<Installation>,
    pub installation_template_state: BTreeMap<String, Vec<u8>>,
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| {
        PipelineError::Core(CoreError::Io {
            path: path.display().to_string(),
            source,
        })
    })
}

/// Reads the imports of the render args
pub async fn load_imports(args: &RenderArgs) -> Result<Map<String, Value>> {
    let mut imports = match &args.imports_file {
        Some(path) => {
            let data = read_file(path).await?;
            let file: ImportsFile = serde_yaml::from_slice(&data).map_err(|e| {
                CoreError::decode(format!("imports file {}", path.display()), e)
            })?;
            file.imports
        }
        None => Map::new(),
    };
    for (key, value) in &args.imports {
        imports.insert(key.clone(), value.clone());
    }
    Ok(imports)
}

/// The installation a blueprint is rendered for
fn sample_installation(namespace: &str, cd: Option<&ComponentDescriptor>) -> Result<Installation> {
    let mut inst = Installation {
        metadata: ObjectMeta::named(namespace, "example"),
        ..Default::default()
    };
    inst.spec.blueprint.reference = Some(SAMPLE_BLUEPRINT_REFERENCE.to_string());
    let mut cd_def = ComponentDescriptorDefinition {
        repository_context: Some(json!({"type": "ociRegistry", "baseUrl": "example.com/components"})),
        component_name: SAMPLE_COMPONENT_NAME.to_string(),
        version: SAMPLE_COMPONENT_VERSION.to_string(),
    };
    if let Some(cd) = cd {
        cd_def.component_name = cd.name().to_string();
        cd_def.version = cd.version().to_string();
        if let Some(ctx) = cd.effective_repository_context() {
            cd_def.repository_context = Some(
                serde_json::to_value(ctx).map_err(|e| CoreError::decode("repository context", e))?,
            );
        }
    }
    inst.spec.component_descriptor = Some(cd_def);
    Ok(inst)
}

/// Renders the deploy items and subinstallations of a blueprint
///
/// # Errors
/// Fails if an input cannot be read, if the imports do not satisfy the
/// blueprint (all violations are reported at once), or if templating fails
pub async fn render_blueprint(args: RenderArgs) -> Result<BlueprintRenderOut> {
    let imports = load_imports(&args).await?;

    let cd = match (&args.component_descriptor, &args.component_descriptor_file) {
        (Some(cd), _) => Some(cd.clone()),
        (None, Some(path)) => Some(ComponentDescriptor::decode(&read_file(path).await?)?),
        (None, None) => None,
    };

    let fs = Arc::new(DirFs::new(&args.blueprint_dir));
    let blueprint = Arc::new(Blueprint::from_fs(fs)?);

    let errors = validate_imports(&blueprint.info.imports, &imports, &FieldPath::new("imports"));
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(PipelineError::ImportValidation(messages.join(", ")));
    }

    let namespace = if args.namespace.is_empty() {
        "default"
    } else {
        args.namespace.as_str()
    };
    let inst = Arc::new(sample_installation(namespace, cd.as_ref())?);

    let mut blobs: Option<Arc<dyn BlobResolver>> = None;
    if let (Some(cd), Some(resolver)) = (&cd, &args.component_resolver) {
        let repository_context = inst
            .spec
            .component_descriptor
            .as_ref()
            .and_then(|def| def.repository_context.clone());
        let (_, resolved) = resolver
            .resolve_with_blob_resolver(repository_context.as_ref(), cd.name(), cd.version())
            .await?;
        blobs = Some(resolved);
    }

    let base = BlueprintExecutionOptions::new(Some(inst.clone()), blueprint.clone())
        .with_component_descriptor(cd.map(Arc::new))
        .with_component_descriptors(Some(Arc::new(
            args.component_descriptor_list.clone().unwrap_or_default(),
        )))
        .with_imports(imports.clone());
    let opts = DeployExecutionOptions::new(base, imports.clone());

    // deploy items
    let deploy_state = Arc::new(MemoryStateHandler::new());
    let orchestrator = ExecutionOrchestrator::new(Arc::new(TemplaterRegistry::with_defaults(blobs)))
        .with_state_handler(deploy_state.clone());
    let specs = orchestrator.template_deploy_executions(&opts).await?;
    let templates = resolve_deploy_item_templates(&specs, &blueprint.info, &imports, namespace)?;
    let deploy_items = materialize_deploy_items(&templates, namespace, &inst.metadata.name)?;
    debug!(count = deploy_items.len(), "rendered deploy items");

    // subinstallations
    let sub_state = Arc::new(MemoryStateHandler::new());
    let orchestrator = ExecutionOrchestrator::new(Arc::new(TemplaterRegistry::default()))
        .with_state_handler(sub_state.clone());
    let mut sub_templates = blueprint.get_subinstallations()?;
    sub_templates.extend(orchestrator.template_subinstallation_executions(&opts).await?);
    let installations: Vec<Installation> = sub_templates
        .iter()
        .map(|tmpl| inst.subinstallation(tmpl))
        .collect();

    info!(
        blueprint = %args.blueprint_dir.display(),
        deploy_items = deploy_items.len(),
        installations = installations.len(),
        "rendered blueprint"
    );

    Ok(BlueprintRenderOut {
        deploy_items,
        deploy_item_template_state: deploy_state.snapshot().await,
        installations,
        installation_template_state: sub_state.snapshot().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BLUEPRINT: &str = r#"
imports:
  - name: cluster
    type: target
    targetType: kubernetes
  - name: replicas
    type: data
    schema:
      type: integer
deployExecutions:
  - name: main
    type: GoTemplate
    file: deploy.yaml
subinstallations:
  - name: static
    blueprint:
      ref: cd://resources/static
subinstallationExecutions:
  - name: subs
    type: Spiff
    template:
      subinstallations:
        - name: templated
          blueprint:
            ref: (( "cd://resources/" .. cd.component.name ))
"#;

    const DEPLOY: &str = r#"deployItems:
- name: web
  type: helm
  target:
    import: cluster
  config:
    replicas: {{imports.replicas}}
    chart: {{cd.component.name}}
state:
  rendered: true
"#;

    const IMPORTS: &str = r#"
imports:
  cluster:
    metadata:
      name: dev-cluster
      namespace: targets
    spec:
      type: kubernetes
  replicas: 3
"#;

    const CD: &str = r#"
meta:
  schemaVersion: v2
component:
  name: example.com/app
  version: 1.2.3
  repositoryContexts: []
  resources: []
  componentReferences: []
"#;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let bp = tmp.path().join("blueprint");
        let example = tmp.path().join("example");
        std::fs::create_dir_all(&bp).unwrap();
        std::fs::create_dir_all(&example).unwrap();
        std::fs::write(bp.join("blueprint.yaml"), BLUEPRINT).unwrap();
        std::fs::write(bp.join("deploy.yaml"), DEPLOY).unwrap();
        std::fs::write(example.join("imports.yaml"), IMPORTS).unwrap();
        std::fs::write(example.join("component-descriptor.yaml"), CD).unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_render_blueprint() {
        let tmp = project();
        let out = render_blueprint(RenderArgs::from_root(tmp.path())).await.unwrap();

        assert_eq!(out.deploy_items.len(), 1);
        let item = &out.deploy_items[0];
        assert_eq!(item.metadata.key(), "default/web");
        assert_eq!(item.spec.configuration["replicas"], 3);
        assert_eq!(item.spec.configuration["chart"], "example.com/app");
        assert_eq!(item.spec.target.as_ref().unwrap().name, "dev-cluster");
        assert!(out.deploy_item_template_state.contains_key("deploymain"));

        let names: Vec<&str> = out.installations.iter().map(|i| i.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["static", "templated"]);
        assert_eq!(
            out.installations[1].spec.blueprint.reference.as_deref(),
            Some("cd://resources/example.com/app")
        );
        assert_eq!(
            out.installations[0].spec.component_descriptor.as_ref().unwrap().version,
            "1.2.3"
        );
    }

    #[tokio::test]
    async fn test_render_reports_all_import_errors() {
        let tmp = project();
        let mut args = RenderArgs::from_root(tmp.path());
        args.imports.insert("replicas".to_string(), json!("three"));
        args.imports.insert(
            "cluster".to_string(),
            json!({"metadata": {"name": "c"}, "spec": {"type": "ssh"}}),
        );
        let err = render_blueprint(args).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("imports.replicas"));
        assert!(message.contains("imports.cluster"));
    }

    #[tokio::test]
    async fn test_missing_blueprint() {
        let tmp = TempDir::new().unwrap();
        let err = render_blueprint(RenderArgs::new(tmp.path())).await.unwrap_err();
        assert!(err.to_string().contains("blueprint.yaml"));
    }
}
