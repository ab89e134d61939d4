//! Render command
//!
//! Renders a blueprint from local files and prints the resulting deploy items
//! and subinstallations.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use terrace_core::domain::ComponentDescriptor;
use terrace_pipeline::resolver::resolve_component_list;
use terrace_pipeline::{BlueprintRenderOut, LocalComponentResolver, RenderArgs, render_blueprint};

use crate::config::Config;

#[derive(Args)]
pub struct RenderCommand {
    /// Blueprint directory, or a project directory with blueprint/ and example/
    dir: PathBuf,

    /// YAML file of the form {imports: {...}}
    #[arg(short, long)]
    imports: Option<PathBuf>,

    /// Component descriptor of the blueprint's component
    #[arg(short = 'c', long)]
    component_descriptor: Option<PathBuf>,

    /// Directory of components, one subdirectory per component version
    #[arg(long, env = "TERRACE_COMPONENTS_DIR")]
    components_dir: Option<PathBuf>,

    /// Namespace of the rendered objects
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Also print the template state of every execution
    #[arg(long)]
    state: bool,
}

/// Handle the render command
pub async fn handle_render_command(cmd: RenderCommand, config: &Config) -> Result<()> {
    let mut args = if cmd.dir.join("blueprint").is_dir() {
        RenderArgs::from_root(&cmd.dir)
    } else {
        RenderArgs::new(&cmd.dir)
    };
    args.namespace = cmd.namespace;
    if let Some(path) = cmd.imports {
        args.imports_file = Some(path);
    }
    if let Some(path) = cmd.component_descriptor {
        args.component_descriptor_file = Some(path);
    }

    if let Some(dir) = cmd.components_dir {
        let resolver = Arc::new(LocalComponentResolver::new(dir));
        if let Some(path) = &args.component_descriptor_file {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read component descriptor: {}", path.display()))?;
            let cd = ComponentDescriptor::decode(&data)
                .with_context(|| format!("Failed to decode component descriptor: {}", path.display()))?;
            let list = resolve_component_list(resolver.as_ref(), &cd)
                .await
                .context("Failed to resolve referenced components")?;
            args.component_descriptor = Some(cd);
            args.component_descriptor_list = Some(list);
        }
        args.component_resolver = Some(resolver);
    }

    let blueprint_dir = args.blueprint_dir.clone();
    let out = render_blueprint(args)
        .await
        .with_context(|| format!("Failed to render blueprint {}", blueprint_dir.display()))?;

    let document = render_document(&out, cmd.state)?;
    print!("{}", config.encode(&document)?);

    eprintln!(
        "{}",
        format!(
            "✓ Rendered {} deploy item(s) and {} installation(s)",
            out.deploy_items.len(),
            out.installations.len()
        )
        .green()
        .bold()
    );
    Ok(())
}

/// Collects the render output into one printable document
fn render_document(out: &BlueprintRenderOut, with_state: bool) -> Result<Value> {
    let mut doc = json!({
        "deployItems": serde_json::to_value(&out.deploy_items)?,
        "installations": serde_json::to_value(&out.installations)?,
    });
    if with_state {
        doc["state"] = json!({
            "deployItems": state_map(&out.deploy_item_template_state),
            "installations": state_map(&out.installation_template_state),
        });
    }
    Ok(doc)
}

fn state_map(state: &BTreeMap<String, Vec<u8>>) -> Map<String, Value> {
    state
        .iter()
        .map(|(key, data)| {
            let value = serde_json::from_slice(data)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(data).into_owned()));
            (key.clone(), value)
        })
        .collect()
}
