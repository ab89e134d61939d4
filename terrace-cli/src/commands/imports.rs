//! Import validation command

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::Path;
use std::sync::Arc;

use terrace_core::domain::Blueprint;
use terrace_core::{DirFs, FieldPath};
use terrace_pipeline::imports::{FieldError, validate_imports};
use terrace_pipeline::render::load_imports;
use terrace_pipeline::RenderArgs;

/// Validates an imports file against a blueprint and prints every violation
pub async fn validate_imports_file(blueprint_dir: &Path, imports_file: &Path) -> Result<()> {
    let errors = collect_errors(blueprint_dir, imports_file).await?;

    if errors.is_empty() {
        println!("{}", "✓ All imports are valid".green().bold());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} invalid import(s):", errors.len()).red().bold()
    );
    for err in &errors {
        println!("  - {}: {}", err.path.cyan(), err.message);
    }
    bail!("import validation failed")
}

async fn collect_errors(blueprint_dir: &Path, imports_file: &Path) -> Result<Vec<FieldError>> {
    let blueprint = Blueprint::from_fs(Arc::new(DirFs::new(blueprint_dir)))
        .with_context(|| format!("Failed to load blueprint from {}", blueprint_dir.display()))?;

    let mut args = RenderArgs::new(blueprint_dir);
    args.imports_file = Some(imports_file.to_path_buf());
    let imports = load_imports(&args)
        .await
        .with_context(|| format!("Failed to read imports: {}", imports_file.display()))?;

    Ok(validate_imports(
        &blueprint.info.imports,
        &imports,
        &FieldPath::new("imports"),
    ))
}
